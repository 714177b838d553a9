//! Scripted [`RemoteSource`] used by the strategy and controller tests.
//!
//! Each endpoint replays a queue of [`Step`]s; once a queue is down to its
//! last step that step repeats forever, which mirrors a backend that settled
//! into a steady state.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::error::ClientError;
use crate::http::HttpError;
use crate::source::{PushEvent, PushSubscription, RemoteSource};

/// One scripted response.
#[derive(Debug, Clone)]
pub(crate) enum Step {
    Ok(Value),
    /// Answers with the value after the given delay.
    Slow(Duration, Value),
    Fail,
}

impl Step {
    pub(crate) fn ok(value: Value) -> Self {
        Step::Ok(value)
    }

    pub(crate) fn delayed(delay: Duration, value: Value) -> Self {
        Step::Slow(delay, value)
    }

    pub(crate) fn fail() -> Self {
        Step::Fail
    }

    async fn resolve(self) -> Result<Value, ClientError> {
        match self {
            Step::Ok(value) => Ok(value),
            Step::Slow(delay, value) => {
                tokio::time::sleep(delay).await;
                Ok(value)
            }
            Step::Fail => Err(ClientError::Transport(HttpError::Retryable(503))),
        }
    }
}

#[derive(Debug, Default)]
struct Script {
    steps: Mutex<VecDeque<Step>>,
    calls: AtomicUsize,
}

impl Script {
    fn load(&self, steps: impl IntoIterator<Item = Step>) {
        let mut guard = self.steps.lock().unwrap();
        *guard = steps.into_iter().collect();
    }

    fn next(&self) -> Step {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut guard = self.steps.lock().unwrap();
        let step = if guard.len() > 1 {
            guard.pop_front()
        } else {
            guard.front().cloned()
        };
        step.unwrap_or(Step::Fail)
    }
}

/// Counts requests that are currently being answered.
struct InFlight<'a> {
    source: &'a ScriptedSource,
}

impl<'a> InFlight<'a> {
    fn enter(source: &'a ScriptedSource) -> Self {
        let now = source.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        source.max_in_flight.fetch_max(now, Ordering::SeqCst);
        Self { source }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.source.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

/// In-memory backend with per-endpoint scripts and a controllable push channel.
#[derive(Debug, Default)]
pub(crate) struct ScriptedSource {
    bootstrap: Script,
    handshake: Script,
    environment: Script,
    subscriptions: Mutex<VecDeque<mpsc::Receiver<PushEvent>>>,
    subscribe_calls: AtomicUsize,
    environments_seen: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedSource {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn script_bootstrap(&self, steps: impl IntoIterator<Item = Step>) {
        self.bootstrap.load(steps);
    }

    pub(crate) fn script_handshake(&self, steps: impl IntoIterator<Item = Step>) {
        self.handshake.load(steps);
    }

    pub(crate) fn script_environment(&self, steps: impl IntoIterator<Item = Step>) {
        self.environment.load(steps);
    }

    /// Queues a push channel for the next `subscribe` call and returns its sender.
    pub(crate) fn push_channel(&self) -> mpsc::Sender<PushEvent> {
        let (tx, rx) = mpsc::channel(16);
        self.subscriptions.lock().unwrap().push_back(rx);
        tx
    }

    pub(crate) fn bootstrap_calls(&self) -> usize {
        self.bootstrap.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn handshake_calls(&self) -> usize {
        self.handshake.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn environment_calls(&self) -> usize {
        self.environment.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn subscribe_calls(&self) -> usize {
        self.subscribe_calls.load(Ordering::SeqCst)
    }

    /// Highest number of fetches that were answered concurrently.
    pub(crate) fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub(crate) fn environments_seen(&self) -> Vec<String> {
        self.environments_seen.lock().unwrap().clone()
    }

    fn note_environment(&self, environment: &str) {
        self.environments_seen
            .lock()
            .unwrap()
            .push(environment.to_string());
    }
}

#[async_trait]
impl RemoteSource for ScriptedSource {
    async fn fetch_bootstrap(&self) -> Result<Value, ClientError> {
        let _guard = InFlight::enter(self);
        self.bootstrap.next().resolve().await
    }

    async fn handshake(&self, environment: &str) -> Result<Value, ClientError> {
        self.note_environment(environment);
        self.handshake.next().resolve().await
    }

    async fn fetch_environment(&self, environment: &str) -> Result<Value, ClientError> {
        let _guard = InFlight::enter(self);
        self.note_environment(environment);
        self.environment.next().resolve().await
    }

    async fn subscribe(&self, environment: &str) -> Result<PushSubscription, ClientError> {
        self.subscribe_calls.fetch_add(1, Ordering::SeqCst);
        self.note_environment(environment);
        match self.subscriptions.lock().unwrap().pop_front() {
            Some(events) => Ok(PushSubscription::new(events, None)),
            None => Err(ClientError::Transport(HttpError::Retryable(502))),
        }
    }
}
