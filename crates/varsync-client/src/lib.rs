//! Client library that keeps a local snapshot of a remote Varsync
//! configuration in sync.
//!
//! [`VarsyncClient`] is the entry point. The remaining modules are exposed so
//! hosts can plug in their own transport ([`RemoteSource`]) or scheduler, and
//! reuse the response validators.

pub mod config;
pub mod error;
pub mod http;
pub mod scheduler;
pub mod snapshot;
pub mod source;
pub mod sse;
pub mod status;
pub mod store;
pub mod sync;
pub mod validation;

pub use config::{sanitize_token, VarsyncEnv};
pub use error::ClientError;
pub use http::{HttpClient, HttpClientOptions, HttpError};
pub use scheduler::{ScheduledTask, Scheduler, TokioScheduler};
pub use snapshot::{ConfigSnapshot, ConfigValue};
pub use source::{PushEvent, PushSubscription, RemoteSource};
pub use status::{StatusSnapshot, SyncState, SyncStatus};
pub use store::{ConfigStore, SnapshotWatch};
pub use sync::{Credentials, SyncConfig, VarsyncClient};
pub use validation::{Plan, ValidationError};
