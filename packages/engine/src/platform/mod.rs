// packages/engine/src/platform/mod.rs
//! Remote platform access
//!
//! - **Api**: the [`PlatformApi`] contract and its request/response shapes
//! - **Http Client**: `reqwest` implementation used in production
//!
//! ```text
//! Authenticator ──► fetch_nonce / verify_wallet
//! Scheduler     ──► fetch_balance
//! Withdrawal    ──► fetch_balance / withdraw
//! Setup         ──► bind_referral
//! ```

pub mod api;
pub mod http_client;

#[cfg(test)]
pub(crate) mod testing;

pub use api::{ApiErrorBody, PlatformApi, VerifyRequest, WithdrawalRequest, WithdrawalResponse};
pub use http_client::HttpPlatformClient;
