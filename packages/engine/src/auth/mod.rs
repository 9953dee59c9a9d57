// packages/engine/src/auth/mod.rs
//! Identity authentication
//!
//! - **Signer**: wallet derivation and personal-message signing
//! - **Authenticator**: nonce/sign/verify login and token storage

pub mod authenticator;
pub mod signer;

pub use authenticator::Authenticator;
pub use signer::WalletSigner;
