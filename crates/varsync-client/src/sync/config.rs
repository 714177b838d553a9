//! Static configuration for the synchronization runtime.

use std::time::Duration;

use tracing::warn;

use crate::http::HttpClientOptions;

/// Backend used when no override is supplied.
pub const DEFAULT_API_URL: &str = "https://api.varsync.dev";
/// Poll cadence used until the server paces the loop (and for fixed-rate polling).
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);
/// Floor applied to every poll delay, including server-provided ones.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Configuration values that control a [`VarsyncClient`](crate::VarsyncClient).
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Base URL of the Varsync API.
    pub api_url: String,
    /// Delay between polls in the environment-scoped variant, and the initial
    /// delay in the token-only variant.
    pub poll_interval: Duration,
    /// Lower bound for any poll delay.
    pub min_poll_interval: Duration,
    /// Transport options for the HTTP client.
    pub http: HttpClientOptions,
    /// When false the configuration skips safety clamps (intended for tests only).
    pub enforce_limits: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            min_poll_interval: MIN_POLL_INTERVAL,
            http: HttpClientOptions::default(),
            enforce_limits: true,
        }
    }
}

impl SyncConfig {
    /// Applies the interval floors. Zero intervals are rejected even when
    /// `enforce_limits` is off.
    pub(crate) fn sanitise(mut self) -> Self {
        if self.min_poll_interval.is_zero() {
            warn!("min poll interval is zero; using {:?}", MIN_POLL_INTERVAL);
            self.min_poll_interval = MIN_POLL_INTERVAL;
        }
        if self.poll_interval.is_zero() {
            warn!("poll interval is zero; using {:?}", self.min_poll_interval);
            self.poll_interval = self.min_poll_interval;
        }
        if !self.enforce_limits {
            return self;
        }

        if self.min_poll_interval < MIN_POLL_INTERVAL {
            warn!(
                "min poll interval {:?} is below the minimum {:?}; clamping",
                self.min_poll_interval, MIN_POLL_INTERVAL
            );
            self.min_poll_interval = MIN_POLL_INTERVAL;
        }
        if self.poll_interval < self.min_poll_interval {
            warn!(
                "poll interval {:?} is below the minimum {:?}; clamping",
                self.poll_interval, self.min_poll_interval
            );
            self.poll_interval = self.min_poll_interval;
        }
        self
    }
}
