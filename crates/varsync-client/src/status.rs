//! Lightweight status helpers exposing synchronization health to embedders
//! (current strategy, success/failure counters, and the last error).
//!
use serde_json::{Map, Value};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::time::Instant;

/// Lifecycle of the synchronization state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// `init()` has not run yet, or the last handshake failed.
    Uninitialized,
    /// Waiting for the handshake response.
    Handshaking,
    /// Poll loop is the active writer.
    Polling,
    /// Push subscription is the active writer.
    Streaming,
    /// `shutdown()` cancelled the active strategy.
    Stopped,
}

impl SyncState {
    /// Stable lowercase label used in logs and JSON output.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::Handshaking => "handshaking",
            Self::Polling => "polling",
            Self::Streaming => "streaming",
            Self::Stopped => "stopped",
        }
    }
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tracks the state machine position and the outcome of sync attempts.
#[derive(Debug)]
pub struct SyncStatus {
    state: RwLock<SyncState>,
    successes: AtomicU64,
    failures: AtomicU64,
    last_error: RwLock<Option<String>>,
    last_success: RwLock<Option<Instant>>,
}

impl SyncStatus {
    /// Creates a reference-counted status handle in the `Uninitialized` state.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: RwLock::new(SyncState::Uninitialized),
            successes: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            last_error: RwLock::new(None),
            last_success: RwLock::new(None),
        })
    }

    /// Returns the current state.
    pub fn state(&self) -> SyncState {
        *read(&self.state)
    }

    pub(crate) fn set_state(&self, next: SyncState) {
        *write(&self.state) = next;
    }

    /// Moves to `next` only if the machine is still in `expected`.
    pub(crate) fn transition(&self, expected: SyncState, next: SyncState) -> bool {
        let mut guard = write(&self.state);
        if *guard != expected {
            return false;
        }
        *guard = next;
        true
    }

    /// Records a snapshot that was validated and published.
    pub(crate) fn record_success(&self) {
        self.successes.fetch_add(1, Ordering::Relaxed);
        *write(&self.last_success) = Some(Instant::now());
        *write(&self.last_error) = None;
    }

    /// Records a failed fetch, validation, or channel event.
    pub(crate) fn record_failure(&self, error: impl fmt::Display) {
        self.failures.fetch_add(1, Ordering::Relaxed);
        *write(&self.last_error) = Some(error.to_string());
    }

    /// Returns a status snapshot suitable for logging/exporting.
    pub fn snapshot(&self, initialized: bool) -> StatusSnapshot {
        StatusSnapshot {
            state: self.state(),
            initialized,
            successful_syncs: self.successes.load(Ordering::Relaxed),
            failed_syncs: self.failures.load(Ordering::Relaxed),
            last_error: read(&self.last_error).clone(),
            last_success: *read(&self.last_success),
        }
    }
}

// Writers never leave these values half-updated, so a poisoned lock still
// holds a usable value.
fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Point-in-time view of [`SyncStatus`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusSnapshot {
    pub state: SyncState,
    pub initialized: bool,
    pub successful_syncs: u64,
    pub failed_syncs: u64,
    pub last_error: Option<String>,
    pub last_success: Option<Instant>,
}

impl StatusSnapshot {
    /// Renders the snapshot as a JSON map.
    pub fn to_map(&self) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("state".into(), Value::String(self.state.as_str().into()));
        map.insert("initialized".into(), Value::Bool(self.initialized));
        map.insert("successfulSyncs".into(), Value::from(self.successful_syncs));
        map.insert("failedSyncs".into(), Value::from(self.failed_syncs));
        map.insert(
            "lastError".into(),
            match &self.last_error {
                Some(err) => Value::String(err.clone()),
                None => Value::Null,
            },
        );
        map
    }

    /// Wraps [`StatusSnapshot::to_map`] into a [`serde_json::Value`].
    pub fn to_json(&self) -> Value {
        Value::Object(self.to_map())
    }
}
