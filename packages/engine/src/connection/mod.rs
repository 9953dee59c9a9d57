// packages/engine/src/connection/mod.rs
//! Realtime connection to the platform
//!
//! - **Frame**: text frame codec (announce, heartbeat, action batches)
//! - **Transport**: link abstraction and the WebSocket implementation
//! - **Manager**: per-identity connection state machine

pub mod frame;
pub mod manager;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use frame::{InboundFrame, OutboundFrame, TapAction, TapBatch};
pub use manager::{ConnectionManager, ConnectionState, DriverExit};
pub use transport::{FrameSender, LinkEvent, Transport, TransportLink, WebSocketTransport};
