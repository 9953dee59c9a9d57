// packages/engine/src/identity/record.rs
//! Per-identity record and the value types it is built from

use crate::identity::session::SessionDescriptor;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Stable identifier of one configured identity (the platform user id)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdentityId(pub u64);

impl fmt::Display for IdentityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Mnemonic the signing key is derived from
///
/// Only the authenticator reads the phrase; `Debug` never prints it.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretSeed(String);

impl SecretSeed {
    pub fn new(phrase: impl Into<String>) -> Self {
        Self(phrase.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Debug for SecretSeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretSeed([redacted])")
    }
}

/// Access/refresh token pair returned by wallet verification
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenPair {
    pub access_token: String,
    pub access_expiry: Option<DateTime<Utc>>,
    pub refresh_token: String,
    pub refresh_expiry: Option<DateTime<Utc>>,
}

impl TokenPair {
    /// True when there is no usable access token at `now`
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self.access_expiry {
            Some(expiry) => self.access_token.is_empty() || now > expiry,
            None => true,
        }
    }
}

/// Counters mirrored from the platform's virtual wallet
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Balances {
    /// Resource budget consumed by taps
    #[serde(default, deserialize_with = "lenient_u64")]
    pub energy: u64,

    #[serde(default, deserialize_with = "lenient_u64")]
    pub energy_premium: u64,

    /// Withdrawable reward balance
    #[serde(default, deserialize_with = "lenient_u64")]
    pub mpx: u64,

    #[serde(default, deserialize_with = "lenient_u64")]
    pub xfi: u64,
}

/// Accepts integers, floats and numeric strings; fractions are truncated
/// and negative values clamp to zero.
fn lenient_u64<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Counter {
        Unsigned(u64),
        Signed(i64),
        Float(f64),
        Text(String),
        Null(()),
    }

    let from_float = |value: f64| {
        if value.is_finite() && value > 0.0 {
            value.trunc() as u64
        } else {
            0
        }
    };

    match Counter::deserialize(deserializer)? {
        Counter::Unsigned(value) => Ok(value),
        Counter::Signed(value) => Ok(value.max(0) as u64),
        Counter::Float(value) => Ok(from_float(value)),
        Counter::Text(raw) => {
            let raw = raw.trim();
            raw.parse::<u64>()
                .or_else(|_| raw.parse::<f64>().map(from_float))
                .map_err(|_| D::Error::custom(format!("not a number: {raw:?}")))
        }
        Counter::Null(()) => Ok(0),
    }
}

/// Everything the engine knows about one identity
#[derive(Debug, Clone)]
pub struct IdentityRecord {
    pub id: IdentityId,

    /// Human-readable label for logs
    pub display_name: String,

    pub credential_seed: SecretSeed,

    /// Platform session the identity logs in with
    pub session: SessionDescriptor,

    pub tokens: TokenPair,

    pub balances: Balances,

    /// Logical timestamp of the next simulated tap
    pub simulation_clock: u64,

    /// Never withdraws rewards
    pub reserved: bool,

    /// Referral code already bound for this identity
    pub referral_bound: bool,
}

impl IdentityRecord {
    /// Build a fresh record for a session and seed
    pub fn new(session: SessionDescriptor, seed: SecretSeed, initial_clock: u64) -> Self {
        Self {
            id: session.user_id(),
            display_name: session.display_name(),
            credential_seed: seed,
            session,
            tokens: TokenPair::default(),
            balances: Balances::default(),
            simulation_clock: initial_clock,
            reserved: false,
            referral_bound: false,
        }
    }

    pub fn with_reserved(mut self, reserved: bool) -> Self {
        self.reserved = reserved;
        self
    }
}
