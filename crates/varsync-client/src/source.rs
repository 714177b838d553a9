//! Seam between the sync strategies and the network.
//!
//! [`RemoteSource`] returns raw JSON so validation stays with the strategies;
//! [`crate::http::HttpClient`] is the production implementation.

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::ClientError;

/// Remote endpoints the synchronization strategies depend on.
#[async_trait]
pub trait RemoteSource: Send + Sync {
    /// Token-only bootstrap payload (`{ config, pollIntervalInMs }`).
    async fn fetch_bootstrap(&self) -> Result<Value, ClientError>;
    /// Handshake payload for `environment`.
    async fn handshake(&self, environment: &str) -> Result<Value, ClientError>;
    /// Full snapshot for `environment`.
    async fn fetch_environment(&self, environment: &str) -> Result<Value, ClientError>;
    /// Opens the push channel for `environment`.
    async fn subscribe(&self, environment: &str) -> Result<PushSubscription, ClientError>;
}

/// Event delivered by the push channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushEvent {
    /// Raw `message` payload (JSON snapshot).
    Message(String),
    /// The channel failed; no further messages should be trusted.
    Error(String),
}

/// Open push channel. Dropping or closing it stops the background pump.
#[derive(Debug)]
pub struct PushSubscription {
    events: mpsc::Receiver<PushEvent>,
    pump: Option<JoinHandle<()>>,
}

impl PushSubscription {
    /// Wraps a receiver and the task feeding it (if any).
    pub fn new(events: mpsc::Receiver<PushEvent>, pump: Option<JoinHandle<()>>) -> Self {
        Self { events, pump }
    }

    /// Waits for the next event; `None` once the sending side is gone.
    pub async fn next(&mut self) -> Option<PushEvent> {
        self.events.recv().await
    }

    /// Tears the channel down.
    pub fn close(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.events.close();
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
    }
}

impl Drop for PushSubscription {
    fn drop(&mut self) {
        self.shutdown();
    }
}
