// packages/engine/src/utils/errors.rs
//! Error taxonomy for the engine
//!
//! - **AuthError**: login could not produce a token pair
//! - **TransportError**: the realtime link failed or closed uncleanly
//! - **RemoteCallError**: an HTTP endpoint answered badly or not at all
//! - **WorkerError**: crate-level error wrapping all of the above

use crate::identity::IdentityId;
use thiserror::Error;

/// Authentication failures
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("credential seed is missing")]
    MissingCredential,

    #[error("credential seed is invalid: {0}")]
    InvalidCredential(String),

    #[error("nonce fetch failed: {0}")]
    NonceFetch(#[source] RemoteCallError),

    #[error("signing failed: {0}")]
    Signing(String),

    #[error("verification rejected: {0}")]
    VerificationRejected(#[source] RemoteCallError),

    #[error("unknown identity {0}")]
    UnknownIdentity(IdentityId),
}

/// Realtime link failures
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to open connection: {0}")]
    Connect(String),

    #[error("connection is closed")]
    Closed,

    #[error("connection closed unexpectedly: {0}")]
    UncleanClose(String),
}

/// Failures talking to the platform's HTTP endpoints
#[derive(Debug, Error)]
pub enum RemoteCallError {
    #[error("{endpoint}: request failed: {message}")]
    Network {
        endpoint: &'static str,
        message: String,
    },

    #[error("{endpoint}: status {status}: {body}")]
    Status {
        endpoint: &'static str,
        status: u16,
        body: String,
    },

    #[error("{endpoint}: malformed response: {message}")]
    Malformed {
        endpoint: &'static str,
        message: String,
    },
}

impl RemoteCallError {
    /// HTTP status code, if the remote answered at all
    pub fn status(&self) -> Option<u16> {
        match self {
            RemoteCallError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Crate-level error
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    RemoteCall(#[from] RemoteCallError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid session descriptor: {0}")]
    InvalidSession(String),

    #[error("failed to load identities from {path}: {message}")]
    IdentityFile { path: String, message: String },

    #[error("unknown identity {0}")]
    UnknownIdentity(IdentityId),
}

impl From<config::ConfigError> for WorkerError {
    fn from(err: config::ConfigError) -> Self {
        WorkerError::Config(err.to_string())
    }
}

/// Result type alias for engine operations
pub type Result<T, E = WorkerError> = std::result::Result<T, E>;
