// packages/engine/src/platform/testing.rs
//! Scripted in-memory platform for unit tests

use crate::identity::{Balances, TokenPair};
use crate::platform::api::{PlatformApi, VerifyRequest, WithdrawalRequest, WithdrawalResponse};
use crate::utils::errors::RemoteCallError;
use async_trait::async_trait;
use chrono::{Duration, Utc};
use parking_lot::Mutex;
use std::collections::VecDeque;

/// Call recorded by [`MockPlatform`]
#[derive(Debug, Clone, PartialEq)]
pub enum PlatformCall {
    Nonce {
        address: String,
        chain_id: String,
    },
    Verify {
        request: VerifyRequest,
        session_header: String,
    },
    Balance {
        token: String,
    },
    Withdraw {
        token: String,
        request: WithdrawalRequest,
    },
    Referral {
        token: String,
        code: String,
    },
}

#[derive(Default)]
struct Script {
    nonce_failures: u32,
    verify_failures: u32,
    balance_failures: u32,
    balances: VecDeque<Balances>,
    withdrawal: Option<WithdrawalResponse>,
    token_ttl: Option<Duration>,
}

/// Platform fake: every call succeeds unless scripted otherwise
#[derive(Default)]
pub struct MockPlatform {
    script: Mutex<Script>,
    calls: Mutex<Vec<PlatformCall>>,
    verify_count: Mutex<u32>,
}

impl MockPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue balances returned by successive balance calls; the last one repeats
    pub fn push_balance(&self, balances: Balances) -> &Self {
        self.script.lock().balances.push_back(balances);
        self
    }

    pub fn fail_nonce(&self, times: u32) -> &Self {
        self.script.lock().nonce_failures = times;
        self
    }

    pub fn fail_verify(&self, times: u32) -> &Self {
        self.script.lock().verify_failures = times;
        self
    }

    pub fn fail_balance(&self, times: u32) -> &Self {
        self.script.lock().balance_failures = times;
        self
    }

    pub fn set_withdrawal(&self, response: WithdrawalResponse) -> &Self {
        self.script.lock().withdrawal = Some(response);
        self
    }

    /// Lifetime of issued access tokens (default one hour; negative = expired)
    pub fn set_token_ttl(&self, ttl: Duration) -> &Self {
        self.script.lock().token_ttl = Some(ttl);
        self
    }

    pub fn calls(&self) -> Vec<PlatformCall> {
        self.calls.lock().clone()
    }

    pub fn withdraw_calls(&self) -> Vec<WithdrawalRequest> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                PlatformCall::Withdraw { request, .. } => Some(request.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, pred: impl Fn(&PlatformCall) -> bool) -> usize {
        self.calls.lock().iter().filter(|call| pred(call)).count()
    }

    fn record(&self, call: PlatformCall) {
        self.calls.lock().push(call);
    }
}

fn unavailable(endpoint: &'static str) -> RemoteCallError {
    RemoteCallError::Status {
        endpoint,
        status: 503,
        body: "scripted failure".into(),
    }
}

#[async_trait]
impl PlatformApi for MockPlatform {
    async fn fetch_nonce(&self, address: &str, chain_id: &str) -> Result<String, RemoteCallError> {
        self.record(PlatformCall::Nonce {
            address: address.into(),
            chain_id: chain_id.into(),
        });

        let mut script = self.script.lock();
        if script.nonce_failures > 0 {
            script.nonce_failures -= 1;
            return Err(unavailable("nonce"));
        }
        Ok(format!("Sign in with nonce 0000-{}", chain_id))
    }

    async fn verify_wallet(
        &self,
        request: &VerifyRequest,
        session_header: &str,
    ) -> Result<TokenPair, RemoteCallError> {
        self.record(PlatformCall::Verify {
            request: request.clone(),
            session_header: session_header.into(),
        });

        let ttl = {
            let mut script = self.script.lock();
            if script.verify_failures > 0 {
                script.verify_failures -= 1;
                return Err(RemoteCallError::Status {
                    endpoint: "verify",
                    status: 401,
                    body: "bad signature".into(),
                });
            }
            script.token_ttl.unwrap_or_else(|| Duration::hours(1))
        };

        let serial = {
            let mut count = self.verify_count.lock();
            *count += 1;
            *count
        };

        let now = Utc::now();
        Ok(TokenPair {
            access_token: format!("access-{}-{}", request.telegram_id, serial),
            access_expiry: Some(now + ttl),
            refresh_token: format!("refresh-{}-{}", request.telegram_id, serial),
            refresh_expiry: Some(now + Duration::days(7)),
        })
    }

    async fn fetch_balance(&self, access_token: &str) -> Result<Balances, RemoteCallError> {
        self.record(PlatformCall::Balance {
            token: access_token.into(),
        });

        let mut script = self.script.lock();
        if script.balance_failures > 0 {
            script.balance_failures -= 1;
            return Err(unavailable("balance"));
        }
        let balances = if script.balances.len() > 1 {
            script.balances.pop_front()
        } else {
            script.balances.front().copied()
        };
        Ok(balances.unwrap_or_default())
    }

    async fn withdraw(
        &self,
        access_token: &str,
        request: &WithdrawalRequest,
    ) -> Result<WithdrawalResponse, RemoteCallError> {
        self.record(PlatformCall::Withdraw {
            token: access_token.into(),
            request: request.clone(),
        });

        let response = self.script.lock().withdrawal.clone();
        Ok(response.unwrap_or_else(|| WithdrawalResponse::Accepted(serde_json::json!({}))))
    }

    async fn bind_referral(&self, access_token: &str, code: &str) -> Result<(), RemoteCallError> {
        self.record(PlatformCall::Referral {
            token: access_token.into(),
            code: code.into(),
        });
        Ok(())
    }
}
