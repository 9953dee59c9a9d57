// packages/engine/src/runtime/withdrawal.rs
//! Reward withdrawal
//!
//! Runs at the end of a simulation cycle. One request per call, never
//! retried: a failed withdrawal is simply attempted again next cycle.

use crate::identity::{IdentityId, IdentityStore};
use crate::platform::api::{PlatformApi, WithdrawalRequest, WithdrawalResponse};
use crate::utils::config::WithdrawalConfig;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// What a withdrawal check did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WithdrawalOutcome {
    /// Reward balance was zero
    NothingToWithdraw,

    /// Identity is excluded from withdrawals
    Reserved,

    /// No destination wallet configured
    NoDestination,

    Withdrawn {
        amount: u64,
    },

    /// Platform reported an insufficient balance
    LowBalance,

    Rejected {
        status: u16,
    },

    /// Balance refresh or the request itself failed
    Failed,
}

impl WithdrawalOutcome {
    /// Label for the withdrawal counter
    pub fn label(&self) -> &'static str {
        match self {
            WithdrawalOutcome::NothingToWithdraw => "empty",
            WithdrawalOutcome::Reserved => "reserved",
            WithdrawalOutcome::NoDestination => "no_destination",
            WithdrawalOutcome::Withdrawn { .. } => "withdrawn",
            WithdrawalOutcome::LowBalance => "low_balance",
            WithdrawalOutcome::Rejected { .. } => "rejected",
            WithdrawalOutcome::Failed => "failed",
        }
    }
}

/// Decides whether to withdraw and issues the request
pub struct WithdrawalGate {
    store: Arc<IdentityStore>,
    api: Arc<dyn PlatformApi>,
    config: WithdrawalConfig,
}

impl WithdrawalGate {
    pub fn new(
        store: Arc<IdentityStore>,
        api: Arc<dyn PlatformApi>,
        config: WithdrawalConfig,
    ) -> Self {
        Self { store, api, config }
    }

    pub fn enabled(&self) -> bool {
        self.config.enabled
    }

    /// Refresh balances and withdraw the whole reward balance if allowed
    pub async fn maybe_withdraw(&self, id: IdentityId) -> WithdrawalOutcome {
        let outcome = self.check(id).await;
        metrics::counter!("tapfarm_withdrawals_total", "outcome" => outcome.label()).increment(1);
        outcome
    }

    async fn check(&self, id: IdentityId) -> WithdrawalOutcome {
        let name = self.store.display_name(id);
        let Ok(token) = self.store.access_token(id) else {
            return WithdrawalOutcome::Failed;
        };

        // Refresh balances
        let balances = match self.api.fetch_balance(&token).await {
            Ok(balances) => balances,
            Err(e) => {
                error!(
                    "[{}] Failed to refresh balance before withdrawal: {}",
                    name, e
                );
                return WithdrawalOutcome::Failed;
            }
        };
        if self.store.set_balances(id, balances).is_err() {
            return WithdrawalOutcome::Failed;
        }

        if balances.mpx == 0 {
            debug!("[{}] No rewards to withdraw", name);
            return WithdrawalOutcome::NothingToWithdraw;
        }

        if self.store.is_reserved(id).unwrap_or(true) {
            info!(
                "[{}] Identity is excluded from withdrawals, keeping {} rewards",
                name, balances.mpx
            );
            return WithdrawalOutcome::Reserved;
        }

        let Some(wallet_address) = self
            .config
            .target_wallet_address
            .as_deref()
            .map(str::trim)
            .filter(|address| !address.is_empty())
        else {
            warn!(
                "[{}] No target wallet address configured, skipping withdrawal",
                name
            );
            return WithdrawalOutcome::NoDestination;
        };

        let request = WithdrawalRequest {
            amount: balances.mpx,
            wallet_address: wallet_address.to_string(),
        };

        match self.api.withdraw(&token, &request).await {
            Ok(WithdrawalResponse::Accepted(body)) => {
                info!(
                    "[{}] Withdrawal of {} rewards to {} accepted: {}",
                    name, request.amount, request.wallet_address, body
                );
                WithdrawalOutcome::Withdrawn {
                    amount: request.amount,
                }
            }
            Ok(WithdrawalResponse::Rejected {
                error: Some(error), ..
            }) if error.is_low_balance() => {
                warn!(
                    "[{}] Withdrawal skipped, balance too low: {}",
                    name,
                    error.message.as_deref().unwrap_or("low balance")
                );
                WithdrawalOutcome::LowBalance
            }
            Ok(WithdrawalResponse::Rejected { status, body, .. }) => {
                error!("[{}] Withdrawal rejected ({}): {}", name, status, body);
                WithdrawalOutcome::Rejected { status }
            }
            Err(e) => {
                error!("[{}] Withdrawal request failed: {}", name, e);
                WithdrawalOutcome::Failed
            }
        }
    }
}
