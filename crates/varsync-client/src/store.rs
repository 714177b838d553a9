//! In-memory holder for the current configuration snapshot.
//!
//! The current snapshot lives in a `tokio::sync::watch` channel: writers
//! publish a complete [`ConfigSnapshot`] behind an `Arc`, readers clone the
//! `Arc` out, and hosts can [`ConfigStore::subscribe`] to be woken on changes.
//! A reader sees either the previous or the new snapshot, never a
//! partially-applied update.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::watch;
use tracing::debug;

use crate::error::ClientError;
use crate::snapshot::{ConfigSnapshot, ConfigValue};

/// Receiver half handed out by [`ConfigStore::subscribe`]; `None` until the
/// store is initialized.
pub type SnapshotWatch = watch::Receiver<Option<Arc<ConfigSnapshot>>>;

/// Current snapshot plus the initialized gate.
#[derive(Debug)]
pub struct ConfigStore {
    current: watch::Sender<Option<Arc<ConfigSnapshot>>>,
    blocked: AtomicBool,
}

impl Default for ConfigStore {
    fn default() -> Self {
        Self {
            current: watch::Sender::new(None),
            blocked: AtomicBool::new(false),
        }
    }
}

impl ConfigStore {
    /// Creates an uninitialized store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Publishes `snapshot` as the current view and marks the store initialized.
    ///
    /// Subscribers are only notified when the content differs from the
    /// current snapshot. Once [`ConfigStore::block_initialization`] has been
    /// called on a store that never initialized, snapshots are discarded.
    pub fn replace(&self, snapshot: ConfigSnapshot) {
        if self.blocked.load(Ordering::Acquire) {
            debug!(keys = snapshot.len(), "varsync store blocked; snapshot discarded");
            return;
        }
        self.current.send_if_modified(|current| {
            if current.as_deref() == Some(&snapshot) {
                return false;
            }
            *current = Some(Arc::new(snapshot));
            true
        });
    }

    /// Keeps an uninitialized store uninitialized for the rest of its life.
    ///
    /// Returns `false` (and does nothing) when a snapshot was already published.
    pub fn block_initialization(&self) -> bool {
        if self.is_initialized() {
            return false;
        }
        self.blocked.store(true, Ordering::Release);
        true
    }

    /// Returns the value for `key`, `Ok(None)` when the key is absent.
    pub fn get(&self, key: &str) -> Result<Option<ConfigValue>, ClientError> {
        Ok(self.get_all()?.get(key).cloned())
    }

    /// Returns a shared read-only view of the whole snapshot.
    pub fn get_all(&self) -> Result<Arc<ConfigSnapshot>, ClientError> {
        self.current
            .borrow()
            .as_ref()
            .map(Arc::clone)
            .ok_or(ClientError::NotInitialized)
    }

    /// Whether at least one snapshot has been published.
    pub fn is_initialized(&self) -> bool {
        self.current.borrow().is_some()
    }

    /// Watches snapshot changes. The value current at subscription time is
    /// marked as seen.
    pub fn subscribe(&self) -> SnapshotWatch {
        self.current.subscribe()
    }
}
