use thiserror::Error;

use crate::http::HttpError;
use crate::validation::ValidationError;

/// Errors surfaced by the public client API.
#[derive(Debug, Error)]
pub enum ClientError {
    /// A required identity field was empty at construction time.
    #[error("varsync: missing {0}")]
    MissingCredential(&'static str),

    /// The backend answered with a payload that violates the response contract.
    #[error("varsync: invalid response: {0}")]
    InvalidResponse(#[from] ValidationError),

    /// An accessor was used before the first successful synchronization.
    #[error("varsync: not initialized")]
    NotInitialized,

    /// Network-level failure talking to the backend or the push channel.
    #[error("varsync: transport failure: {0}")]
    Transport(#[from] HttpError),

    /// The handshake rejected the credentials.
    #[error("varsync: {0}")]
    HandshakeRejected(String),

    /// `init()` was called on a client whose sync loop is already running.
    #[error("varsync: already started")]
    AlreadyStarted,
}
