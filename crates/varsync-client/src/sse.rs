//! Minimal `text/event-stream` decoding for the push channel.
//!
//! Only the fields the backend emits are interpreted (`event` and `data`);
//! `id`, `retry` and comment lines are accepted and ignored.

use futures_util::StreamExt;
use tokio::sync::mpsc;
use tracing::debug;

use crate::source::PushEvent;

/// Event type assumed when a frame carries no `event:` field.
const DEFAULT_EVENT: &str = "message";

/// One dispatched server-sent event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    pub event: String,
    pub data: String,
}

/// Incremental decoder; feed arbitrary chunks, collect complete events.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    event: Option<String>,
    data: Vec<String>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `chunk` and returns every event completed by it.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(chunk);
        let mut events = Vec::new();
        while let Some(newline) = self.buffer.iter().position(|byte| *byte == b'\n') {
            let mut line: Vec<u8> = self.buffer.drain(..=newline).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            let line = String::from_utf8_lossy(&line);
            if let Some(event) = self.process_line(&line) {
                events.push(event);
            }
        }
        events
    }

    fn process_line(&mut self, line: &str) -> Option<SseEvent> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "event" => self.event = Some(value.to_string()),
            "data" => self.data.push(value.to_string()),
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseEvent> {
        let event = self.event.take();
        if self.data.is_empty() {
            return None;
        }
        let data = std::mem::take(&mut self.data).join("\n");
        Some(SseEvent {
            event: event
                .filter(|name| !name.is_empty())
                .unwrap_or_else(|| DEFAULT_EVENT.to_string()),
            data,
        })
    }
}

/// Reads the streaming response and forwards `message` events.
///
/// Always finishes with a single [`PushEvent::Error`] once the stream fails or
/// the server closes it, unless the receiver went away first.
pub(crate) async fn pump_events(response: reqwest::Response, sender: mpsc::Sender<PushEvent>) {
    let mut decoder = SseDecoder::new();
    let mut stream = response.bytes_stream();
    let reason = loop {
        match stream.next().await {
            Some(Ok(chunk)) => {
                for event in decoder.feed(&chunk) {
                    if event.event == "error" {
                        let _ = sender.send(PushEvent::Error(event.data)).await;
                        return;
                    }
                    if event.event != DEFAULT_EVENT {
                        debug!(event = %event.event, "varsync ignoring push event");
                        continue;
                    }
                    if sender.send(PushEvent::Message(event.data)).await.is_err() {
                        return;
                    }
                }
            }
            Some(Err(err)) => break format!("push channel failed: {err}"),
            None => break "push channel closed by server".to_string(),
        }
    };
    let _ = sender.send(PushEvent::Error(reason)).await;
}
