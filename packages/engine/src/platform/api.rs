// packages/engine/src/platform/api.rs
//! Remote platform contract
//!
//! The platform is an opaque HTTP service. [`PlatformApi`] lists the calls
//! the engine makes and the shapes it expects back; transports and retries
//! are the implementation's business.

use crate::identity::{Balances, TokenPair};
use crate::utils::errors::RemoteCallError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Error type the withdrawal endpoint uses for rejected requests
pub const INVALID_REQUEST_ERROR: &str = "invalid_request_error";

/// Error code for withdrawals above the available balance
pub const LOW_BALANCE_CODE: &str = "low_balance";

/// Body of the wallet verification call
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyRequest {
    pub address: String,
    pub chain_id: String,
    pub signature: String,
    pub telegram_id: u64,
}

/// One token as returned by the verification endpoint
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuedToken {
    pub token: String,

    /// Expiry as epoch milliseconds
    pub expires_in: i64,
}

/// Verification endpoint response
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyResponse {
    pub authorization_token: IssuedToken,
    pub refresh_token: IssuedToken,
}

impl VerifyResponse {
    pub fn into_tokens(self) -> TokenPair {
        TokenPair {
            access_token: self.authorization_token.token,
            access_expiry: DateTime::<Utc>::from_timestamp_millis(
                self.authorization_token.expires_in,
            ),
            refresh_token: self.refresh_token.token,
            refresh_expiry: DateTime::<Utc>::from_timestamp_millis(self.refresh_token.expires_in),
        }
    }
}

/// Body of the withdrawal call
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WithdrawalRequest {
    pub amount: u64,
    pub wallet_address: String,
}

/// Structured error body
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ApiErrorBody {
    #[serde(rename = "type")]
    pub kind: String,

    #[serde(default)]
    pub code: Option<String>,

    #[serde(default)]
    pub message: Option<String>,
}

impl ApiErrorBody {
    /// The platform's "not enough funds" answer
    pub fn is_low_balance(&self) -> bool {
        self.kind == INVALID_REQUEST_ERROR && self.code.as_deref() == Some(LOW_BALANCE_CODE)
    }
}

/// Classified answer of the withdrawal endpoint
#[derive(Debug, Clone, PartialEq)]
pub enum WithdrawalResponse {
    /// Request accepted; body kept for logging
    Accepted(serde_json::Value),

    /// Request refused by the platform
    Rejected {
        status: u16,
        error: Option<ApiErrorBody>,
        body: String,
    },
}

impl WithdrawalResponse {
    /// Classify a raw response. An error body wins over the status code.
    pub fn classify(status: u16, body: &str) -> Self {
        let parsed: Option<serde_json::Value> = serde_json::from_str(body).ok();

        let error = parsed
            .as_ref()
            .filter(|value| {
                value
                    .get("type")
                    .and_then(serde_json::Value::as_str)
                    .map(|kind| kind.ends_with("_error"))
                    .unwrap_or(false)
            })
            .and_then(|value| serde_json::from_value::<ApiErrorBody>(value.clone()).ok());

        let success = (200..300).contains(&status);
        if success && error.is_none() {
            return WithdrawalResponse::Accepted(parsed.unwrap_or(serde_json::Value::Null));
        }

        WithdrawalResponse::Rejected {
            status,
            error,
            body: body.to_string(),
        }
    }
}

/// Calls the engine makes against the platform
#[async_trait]
pub trait PlatformApi: Send + Sync + 'static {
    /// Single-use login challenge for `address` on `chain_id`
    async fn fetch_nonce(&self, address: &str, chain_id: &str) -> Result<String, RemoteCallError>;

    /// Exchange a signed challenge for a token pair
    async fn verify_wallet(
        &self,
        request: &VerifyRequest,
        session_header: &str,
    ) -> Result<TokenPair, RemoteCallError>;

    /// Current virtual wallet counters
    async fn fetch_balance(&self, access_token: &str) -> Result<Balances, RemoteCallError>;

    /// Withdraw rewards to an external wallet
    async fn withdraw(
        &self,
        access_token: &str,
        request: &WithdrawalRequest,
    ) -> Result<WithdrawalResponse, RemoteCallError>;

    /// Bind a referral code to the logged-in user
    async fn bind_referral(&self, access_token: &str, code: &str) -> Result<(), RemoteCallError>;
}
