// packages/engine/src/identity/mod.rs
//! Identity state
//!
//! - **Record**: per-identity credentials, tokens, balances and clock
//! - **Session**: parsing of the platform launch data
//! - **Store**: shared in-memory table of records
//! - **Loader**: reads identities from the configured JSON file

pub mod loader;
pub mod record;
pub mod session;
pub mod store;

#[cfg(test)]
pub(crate) mod testing;

pub use loader::{load_identities, IdentityEntry};
pub use record::{Balances, IdentityId, IdentityRecord, SecretSeed, TokenPair};
pub use session::{PlatformUser, SessionDescriptor};
pub use store::{CycleGuard, IdentityStore};
