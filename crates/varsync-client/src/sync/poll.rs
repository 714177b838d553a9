//! Self-rescheduling poll loop.
//!
//! Every attempt, successful or not, schedules its successor before it
//! returns, so a failing backend never stops synchronization. Attempts are
//! strictly sequential: the next one is only scheduled once the previous one
//! has finished.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::ClientError;
use crate::scheduler::{ScheduledTask, Scheduler};
use crate::source::RemoteSource;
use crate::status::SyncStatus;
use crate::store::ConfigStore;
use crate::validation::{validate_bootstrap_response, validate_snapshot};

/// Which endpoint the poller reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollTarget {
    /// Token-only `GET <base>`, which also carries the server-controlled interval.
    Bootstrap,
    /// `GET <base>/config/<env>`.
    Environment(String),
}

/// How the delay between attempts is derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollCadence {
    /// Wait `interval` after each attempt completes; successful bootstrap
    /// responses replace `interval` with the server's value.
    ServerPaced { initial: Duration },
    /// Attempts are aligned on a fixed grid (`start + k * interval`). An attempt
    /// that overruns its slot skips the missed slots instead of overlapping.
    FixedRate(Duration),
}

/// Smallest delay the loop will ever wait between attempts.
const MIN_TICK: Duration = Duration::from_millis(1);

#[derive(Debug)]
struct PollTimer {
    interval: Duration,
    last_deadline: Option<Instant>,
    pending: Option<ScheduledTask>,
}

/// Periodically fetches a full snapshot and publishes it to the store.
pub struct PollStrategy {
    source: Arc<dyn RemoteSource>,
    store: Arc<ConfigStore>,
    status: Arc<SyncStatus>,
    scheduler: Arc<dyn Scheduler>,
    target: PollTarget,
    cadence: PollCadence,
    min_interval: Duration,
    timer: Mutex<PollTimer>,
    cancelled: AtomicBool,
}

impl std::fmt::Debug for PollStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PollStrategy")
            .field("target", &self.target)
            .field("cadence", &self.cadence)
            .field("interval", &self.current_interval())
            .finish()
    }
}

impl PollStrategy {
    /// Builds an idle poller; call [`PollStrategy::start`] to begin the loop.
    pub fn new(
        source: Arc<dyn RemoteSource>,
        store: Arc<ConfigStore>,
        status: Arc<SyncStatus>,
        scheduler: Arc<dyn Scheduler>,
        target: PollTarget,
        cadence: PollCadence,
        min_interval: Duration,
    ) -> Arc<Self> {
        let requested = match cadence {
            PollCadence::ServerPaced { initial } => initial,
            PollCadence::FixedRate(interval) => interval,
        };
        let min_interval = min_interval.max(MIN_TICK);
        Arc::new(Self {
            source,
            store,
            status,
            scheduler,
            target,
            cadence,
            min_interval,
            timer: Mutex::new(PollTimer {
                interval: requested.max(min_interval),
                last_deadline: None,
                pending: None,
            }),
            cancelled: AtomicBool::new(false),
        })
    }

    /// Performs a single fetch-validate-publish cycle without rescheduling.
    pub async fn poll_once(&self) -> Result<(), ClientError> {
        let result = self.fetch_and_publish().await;
        match &result {
            Ok(()) => self.status.record_success(),
            Err(err) => self.status.record_failure(err),
        }
        result
    }

    async fn fetch_and_publish(&self) -> Result<(), ClientError> {
        match &self.target {
            PollTarget::Bootstrap => {
                let raw = self.source.fetch_bootstrap().await?;
                let response = validate_bootstrap_response(&raw)?;
                self.adopt_interval(response.poll_interval);
                self.store.replace(response.config);
            }
            PollTarget::Environment(environment) => {
                let raw = self.source.fetch_environment(environment).await?;
                let snapshot = validate_snapshot(&raw)?;
                self.store.replace(snapshot);
            }
        }
        Ok(())
    }

    /// Schedules the first attempt `first_delay` from now.
    pub fn start(self: &Arc<Self>, first_delay: Duration) {
        if let PollCadence::FixedRate(_) = self.cadence {
            self.lock_timer().last_deadline = Some(Instant::now() + first_delay);
        }
        self.schedule(first_delay);
    }

    /// Stops the loop: the pending attempt is aborted and nothing is rescheduled.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        if let Some(pending) = self.lock_timer().pending.take() {
            pending.cancel();
        }
    }

    /// Whether [`PollStrategy::cancel`] has been called.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Delay currently applied between attempts.
    pub fn current_interval(&self) -> Duration {
        self.lock_timer().interval
    }

    fn schedule(self: &Arc<Self>, delay: Duration) {
        let mut timer = self.lock_timer();
        if self.is_cancelled() {
            return;
        }
        let this = Arc::clone(self);
        let task = self
            .scheduler
            .schedule_after(delay, Box::pin(async move { this.run_attempt().await }));
        timer.pending = Some(task);
    }

    async fn run_attempt(self: Arc<Self>) {
        match self.poll_once().await {
            Ok(()) => debug!(poll_target = ?self.target, "varsync poll succeeded"),
            Err(err) => warn!(
                poll_target = ?self.target,
                error = %err,
                "varsync failed to fetch config"
            ),
        }
        let delay = self.next_delay();
        self.schedule(delay);
    }

    fn next_delay(&self) -> Duration {
        let mut timer = self.lock_timer();
        match self.cadence {
            PollCadence::ServerPaced { .. } => timer.interval,
            PollCadence::FixedRate(_) => {
                let now = Instant::now();
                let interval = timer.interval;
                let previous = timer.last_deadline.unwrap_or(now);
                let next = next_slot(previous, interval, now);
                timer.last_deadline = Some(next);
                next.saturating_duration_since(now)
            }
        }
    }

    fn adopt_interval(&self, requested: Duration) {
        if !matches!(self.cadence, PollCadence::ServerPaced { .. }) {
            return;
        }
        let interval = if requested < self.min_interval {
            warn!(
                requested = ?requested,
                minimum = ?self.min_interval,
                "varsync poll interval below minimum; clamping"
            );
            self.min_interval
        } else {
            requested
        };
        let mut timer = self.lock_timer();
        if timer.interval != interval {
            debug!(
                previous = ?timer.interval,
                next = ?interval,
                "varsync poll interval updated"
            );
            timer.interval = interval;
        }
    }

    fn lock_timer(&self) -> MutexGuard<'_, PollTimer> {
        self.timer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// First grid point after `now`, starting from `previous`.
fn next_slot(previous: Instant, interval: Duration, now: Instant) -> Instant {
    let next = previous + interval;
    if next > now || interval.is_zero() {
        return next.max(now);
    }
    let behind = now.saturating_duration_since(previous);
    let missed = behind.as_nanos() / interval.as_nanos() + 1;
    u32::try_from(missed)
        .ok()
        .and_then(|slots| interval.checked_mul(slots))
        .map(|offset| previous + offset)
        .unwrap_or(now + interval)
}
