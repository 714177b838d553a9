//! Push-channel synchronization with a one-way fallback to polling.
//!
//! The strategy owns a fixed-rate [`PollStrategy`] that stays idle while the
//! push channel is healthy. The first channel failure closes the subscription
//! and starts the poller; the stream is never reopened afterwards.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::source::{PushEvent, RemoteSource};
use crate::status::{SyncState, SyncStatus};
use crate::store::ConfigStore;
use crate::sync::poll::PollStrategy;
use crate::validation::parse_snapshot_message;

/// Applies pushed snapshots for a streaming plan. The first channel error
/// closes the subscription and hands over to the fixed-rate fallback poller,
/// once; the stream is never reopened.
pub struct StreamStrategy {
    source: Arc<dyn RemoteSource>,
    store: Arc<ConfigStore>,
    status: Arc<SyncStatus>,
    environment: String,
    fallback: Arc<PollStrategy>,
    fell_back: AtomicBool,
    cancelled: AtomicBool,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for StreamStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamStrategy")
            .field("environment", &self.environment)
            .field("fell_back", &self.has_fallen_back())
            .finish()
    }
}

impl StreamStrategy {
    /// Builds an idle strategy. `fallback` must not have been started.
    pub fn new(
        source: Arc<dyn RemoteSource>,
        store: Arc<ConfigStore>,
        status: Arc<SyncStatus>,
        environment: impl Into<String>,
        fallback: Arc<PollStrategy>,
    ) -> Arc<Self> {
        Arc::new(Self {
            source,
            store,
            status,
            environment: environment.into(),
            fallback,
            fell_back: AtomicBool::new(false),
            cancelled: AtomicBool::new(false),
            task: Mutex::new(None),
        })
    }

    /// Opens the push channel on a background task.
    pub fn start(self: &Arc<Self>) {
        let mut task = self.task.lock().unwrap_or_else(|p| p.into_inner());
        if self.cancelled.load(Ordering::SeqCst) || task.is_some() {
            return;
        }
        let this = Arc::clone(self);
        *task = Some(tokio::spawn(async move { this.run().await }));
    }

    /// Aborts the push channel and the fallback poller.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        if let Some(task) = self.task.lock().unwrap_or_else(|p| p.into_inner()).take() {
            task.abort();
        }
        self.fallback.cancel();
    }

    /// Whether the strategy has switched to polling.
    pub fn has_fallen_back(&self) -> bool {
        self.fell_back.load(Ordering::SeqCst)
    }

    async fn run(self: Arc<Self>) {
        let mut subscription = match self.source.subscribe(&self.environment).await {
            Ok(subscription) => subscription,
            Err(err) => {
                warn!(
                    environment = %self.environment,
                    error = %err,
                    "varsync could not open push channel"
                );
                self.status.record_failure(&err);
                self.fall_back();
                return;
            }
        };
        info!(environment = %self.environment, "varsync push channel open");

        let reason = loop {
            match subscription.next().await {
                Some(PushEvent::Message(raw)) => self.apply(&raw),
                Some(PushEvent::Error(reason)) => break reason,
                None => break "push channel closed".to_string(),
            }
        };
        subscription.close();
        warn!(
            environment = %self.environment,
            reason = %reason,
            "varsync push channel error"
        );
        self.status.record_failure(&reason);
        self.fall_back();
    }

    fn apply(&self, raw: &str) {
        match parse_snapshot_message(raw) {
            Ok(snapshot) => {
                debug!(keys = snapshot.len(), "varsync applied pushed snapshot");
                self.store.replace(snapshot);
                self.status.record_success();
            }
            Err(err) => {
                warn!(error = %err, "varsync ignoring invalid pushed snapshot");
                self.status.record_failure(&err);
            }
        }
    }

    fn fall_back(&self) {
        if self.cancelled.load(Ordering::SeqCst) || self.fell_back.swap(true, Ordering::SeqCst) {
            return;
        }
        warn!(
            environment = %self.environment,
            "varsync falling back to polling"
        );
        self.status.transition(SyncState::Streaming, SyncState::Polling);
        self.fallback.start(self.fallback.current_interval());
    }
}
