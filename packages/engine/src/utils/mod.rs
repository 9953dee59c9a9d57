// packages/engine/src/utils/mod.rs
//! Shared configuration and error types

pub mod config;
pub mod errors;

pub use config::WorkerConfig;
pub use errors::{AuthError, RemoteCallError, Result, TransportError, WorkerError};
