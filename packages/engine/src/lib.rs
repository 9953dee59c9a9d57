// packages/engine/src/lib.rs
//! Tapfarm Engine Library
//!
//! Runs many platform identities side by side. Each identity logs in with a
//! wallet signature, keeps a realtime connection alive, spends its energy
//! budget on paced action batches and withdraws rewards.
//!
//! # Architecture
//!
//! - **identity**: records, launch-data parsing, the shared store, loading
//! - **auth**: wallet signer and challenge-response login
//! - **platform**: HTTP API contract and client
//! - **connection**: frame codec, transport, connection state machine
//! - **runtime**: worker pool, scheduler, batching, withdrawal
//! - **observability**: tracing and metrics
//! - **utils**: configuration and errors

pub mod auth;
pub mod connection;
pub mod identity;
pub mod observability;
pub mod platform;
pub mod runtime;
pub mod utils;

// Re-export commonly used types
pub use connection::{ConnectionManager, ConnectionState, WebSocketTransport};
pub use identity::{IdentityId, IdentityStore};
pub use platform::HttpPlatformClient;
pub use runtime::{WorkerContext, WorkerPool};
pub use utils::config::WorkerConfig;
pub use utils::errors::{Result, WorkerError};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
