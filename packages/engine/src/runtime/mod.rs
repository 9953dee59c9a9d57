// packages/engine/src/runtime/mod.rs
//! Identity execution runtime
//!
//! - **Worker**: shared context and the pool that starts every identity
//! - **Scheduler**: periodic simulation cycles over an active connection
//! - **Tap Batch**: batch sizing and paced action synthesis
//! - **Withdrawal**: end-of-cycle reward withdrawal
//! - **Task**: cancellable periodic background task
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────── WorkerPool ─────────────────────────┐
//! │                                                              │
//! │  identity ──► setup_connection ──► driver ──► link           │
//! │                                      │                       │
//! │                                      ├─► heartbeat (task)    │
//! │                                      └─► scheduler           │
//! │                                            ├─► tap batches   │
//! │                                            └─► withdrawal    │
//! └──────────────────────────────────────────────────────────────┘
//! ```

pub mod scheduler;
pub mod tap_batch;
pub mod task;
pub mod withdrawal;
pub mod worker;

pub use scheduler::{CycleOutcome, SchedulerExit, SimulationScheduler};
pub use tap_batch::{batch_size, TapPacer};
pub use task::RepeatingTask;
pub use withdrawal::{WithdrawalGate, WithdrawalOutcome};
pub use worker::{PoolStats, WorkerContext, WorkerPool};
