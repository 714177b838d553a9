//! Synchronization runtime facade.
//!
//! Wires the poll and stream strategies behind [`VarsyncClient`], which picks
//! one of them from the credentials and the handshake result.

pub(crate) mod config;
mod controller;
pub(crate) mod poll;
pub(crate) mod stream;
#[cfg(test)]
pub(crate) mod test_support;

pub use config::{SyncConfig, DEFAULT_API_URL, DEFAULT_POLL_INTERVAL, MIN_POLL_INTERVAL};
pub use controller::{Credentials, VarsyncClient};
pub use poll::{PollCadence, PollStrategy, PollTarget};
pub use stream::StreamStrategy;
