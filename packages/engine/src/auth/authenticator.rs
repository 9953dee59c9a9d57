// packages/engine/src/auth/authenticator.rs
//! Challenge-response login
//!
//! ```text
//! seed ──► wallet ──► fetch_nonce(address, chain) ──► sign(nonce)
//!                                                        │
//!        store.tokens ◄── verify_wallet(address, chain, signature, session)
//! ```
//!
//! Each call performs a fresh remote handshake and only ever writes the
//! identity's token fields.

use crate::auth::signer::WalletSigner;
use crate::identity::{IdentityId, IdentityStore, TokenPair};
use crate::platform::api::{PlatformApi, VerifyRequest};
use crate::utils::config::AuthConfig;
use crate::utils::errors::AuthError;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Logs identities in and stores their token pairs
pub struct Authenticator {
    store: Arc<IdentityStore>,
    api: Arc<dyn PlatformApi>,
    chain_id: String,
    policy: AuthConfig,
}

impl Authenticator {
    pub fn new(
        store: Arc<IdentityStore>,
        api: Arc<dyn PlatformApi>,
        chain_id: impl Into<String>,
        policy: AuthConfig,
    ) -> Self {
        Self {
            store,
            api,
            chain_id: chain_id.into(),
            policy,
        }
    }

    /// Run one login handshake for `id`
    pub async fn authenticate(&self, id: IdentityId) -> Result<TokenPair, AuthError> {
        let (seed, session) = self
            .store
            .credentials(id)
            .map_err(|_| AuthError::UnknownIdentity(id))?;
        let name = self.store.display_name(id);

        // Derive wallet
        let wallet = WalletSigner::from_seed(&seed)?;
        let address = wallet.address();
        info!("[{}] Wallet address retrieved: {}", name, address);

        // Fetch challenge
        let nonce = self
            .api
            .fetch_nonce(&address, &self.chain_id)
            .await
            .map_err(AuthError::NonceFetch)?;
        debug!("[{}] Nonce fetched: {}", name, nonce);

        // Sign challenge
        let signature = wallet.sign_message(&nonce)?;
        debug!("[{}] Nonce signed", name);

        // Exchange for tokens
        let request = VerifyRequest {
            address,
            chain_id: self.chain_id.clone(),
            signature,
            telegram_id: id.0,
        };
        let tokens = self
            .api
            .verify_wallet(&request, &session.header_value())
            .await
            .map_err(AuthError::VerificationRejected)?;

        self.store
            .set_tokens(id, tokens.clone())
            .map_err(|_| AuthError::UnknownIdentity(id))?;

        info!(
            "[{}] Authenticated, access token valid until {}",
            name,
            tokens
                .access_expiry
                .map(|expiry| expiry.to_rfc3339())
                .unwrap_or_else(|| "unknown".to_string())
        );
        Ok(tokens)
    }

    /// Log in with bounded retries and exponential backoff
    ///
    /// Credential errors are not retried; they cannot succeed on a later
    /// attempt.
    pub async fn authenticate_with_retry(&self, id: IdentityId) -> Result<TokenPair, AuthError> {
        let name = self.store.display_name(id);
        let mut attempt = 1;

        loop {
            match self.authenticate(id).await {
                Ok(tokens) => return Ok(tokens),
                Err(e) => {
                    metrics::counter!("tapfarm_auth_failures_total").increment(1);

                    let permanent = matches!(
                        e,
                        AuthError::MissingCredential
                            | AuthError::InvalidCredential(_)
                            | AuthError::UnknownIdentity(_)
                    );
                    if permanent || attempt >= self.policy.max_attempts {
                        error!(
                            "[{}] Authentication failed after {} attempt(s): {}",
                            name, attempt, e
                        );
                        return Err(e);
                    }

                    let delay = self.policy.backoff(attempt);
                    warn!(
                        "[{}] Authentication attempt {} failed: {}. Retrying in {:?}",
                        name, attempt, e, delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
