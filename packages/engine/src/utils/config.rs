// packages/engine/src/utils/config.rs
//! Engine configuration
//!
//! Layered with the `config` crate, lowest precedence first:
//!
//! 1. Built-in defaults ([`WorkerConfig::default`])
//! 2. Optional `tapfarm.{toml,yaml,json}` file in the working directory
//! 3. `TAPFARM__SECTION__KEY` environment variables
//! 4. The plain variables `WITHDRAWAL_STATUS`, `TARGET_WALLET_ADDRESS`,
//!    `EXCEPT_PHRASE` and `REFERRAL_CODE`

use crate::utils::errors::{Result, WorkerError};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Base name of the optional configuration file
const CONFIG_FILE_STEM: &str = "tapfarm";

/// Prefix for structured environment overrides
const ENV_PREFIX: &str = "TAPFARM";

/// Smallest batch the platform accepts
pub const MIN_TAP_BATCH: u64 = 10;

/// Top-level engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// JSON file listing identities (`[{tgWebAppData, seedPhrase}]`)
    pub identities_file: PathBuf,

    /// Remote endpoints
    pub endpoints: EndpointConfig,

    /// Realtime connection policy
    pub connection: ConnectionConfig,

    /// Authentication retry policy
    pub auth: AuthConfig,

    /// Tap simulation pacing
    pub simulation: SimulationConfig,

    /// Reward withdrawal
    pub withdrawal: WithdrawalConfig,

    /// Referral code bound once per identity after login
    pub referral_code: Option<String>,

    /// Logging and metrics
    pub observability: ObservabilityConfig,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            identities_file: PathBuf::from("tokens.json"),
            endpoints: EndpointConfig::default(),
            connection: ConnectionConfig::default(),
            auth: AuthConfig::default(),
            simulation: SimulationConfig::default(),
            withdrawal: WithdrawalConfig::default(),
            referral_code: None,
            observability: ObservabilityConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointConfig {
    /// Base URL for nonce and wallet verification
    pub auth_base: String,

    /// Base URL for balance, withdrawal and referral
    pub game_base: String,

    /// Realtime socket URL
    pub socket_url: String,

    /// Value sent as `origin` (and `referer` with a trailing slash)
    pub origin: String,

    /// Chain identifier used during login
    pub chain_id: String,

    /// Per-request HTTP timeout in seconds
    pub request_timeout_secs: u64,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            auth_base: "https://testpad.xfi.foundation/api/v1".into(),
            game_base: "https://test-bot.crossfi.org/api/v1".into(),
            socket_url: "wss://test-bot.crossfi.org/api/socket.io/?EIO=4&transport=websocket"
                .into(),
            origin: "https://bot.crossfi.org".into(),
            chain_id: "0x103d".into(),
            request_timeout_secs: 30,
        }
    }
}

impl EndpointConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Seconds between heartbeat frames
    pub heartbeat_interval_secs: u64,

    /// Seconds to wait before reconnecting after a failure
    pub retry_delay_secs: u64,

    /// Consecutive failed attempts before an identity is abandoned
    pub max_retries: u32,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_secs: 25,
            retry_delay_secs: 5,
            max_retries: 5,
        }
    }
}

impl ConnectionConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Login attempts before setup gives up
    pub max_attempts: u32,

    /// First backoff delay in milliseconds, doubled per attempt
    pub backoff_base_ms: u64,

    /// Backoff ceiling in milliseconds
    pub backoff_max_ms: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            backoff_base_ms: 2_000,
            backoff_max_ms: 60_000,
        }
    }
}

impl AuthConfig {
    /// Delay before retry number `attempt` (1-based)
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.saturating_sub(1).min(16);
        let delay = self.backoff_base_ms.saturating_mul(factor);
        Duration::from_millis(delay.min(self.backoff_max_ms))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Seconds between scheduler cycles
    pub cycle_interval_secs: u64,

    /// Longest time one cycle keeps tapping
    pub tap_window_secs: u64,

    /// Connection lifetime before a forced re-login
    pub session_ceiling_secs: u64,

    /// Maximum taps per transmitted frame
    pub batch_cap: u64,

    /// Lower bound of the per-tap interval
    pub min_tap_interval_ms: u64,

    /// Upper bound of the per-tap interval
    pub max_tap_interval_ms: u64,

    /// Starting value of each identity's simulation clock
    pub initial_clock: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            cycle_interval_secs: 300,
            tap_window_secs: 300,
            session_ceiling_secs: 12 * 60 * 60,
            batch_cap: 48,
            min_tap_interval_ms: 100,
            max_tap_interval_ms: 500,
            initial_clock: 10_000,
        }
    }
}

impl SimulationConfig {
    pub fn cycle_interval(&self) -> Duration {
        Duration::from_secs(self.cycle_interval_secs)
    }

    pub fn tap_window(&self) -> Duration {
        Duration::from_secs(self.tap_window_secs)
    }

    pub fn session_ceiling(&self) -> Duration {
        Duration::from_secs(self.session_ceiling_secs)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WithdrawalConfig {
    /// Whether cycles end with a withdrawal check
    pub enabled: bool,

    /// Destination wallet for withdrawn rewards
    pub target_wallet_address: Option<String>,

    /// Identity whose seed equals this value never withdraws
    pub excluded_seed_phrase: Option<String>,

    /// Identity ids that never withdraw
    pub excluded_identities: Vec<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub log_format: LogFormat,

    /// Prometheus listener; metrics are recorded but not exported when unset
    pub metrics_addr: Option<SocketAddr>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_format: LogFormat::Pretty,
            metrics_addr: None,
        }
    }
}

impl WorkerConfig {
    /// Load configuration from the working directory and environment
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration, reading `file` instead of the default file name
    pub fn load_from(file: Option<&Path>) -> Result<Self> {
        let defaults = Config::try_from(&WorkerConfig::default())?;

        let file_source = match file {
            Some(path) => File::from(path).required(true),
            None => File::with_name(CONFIG_FILE_STEM).required(false),
        };

        let withdrawal_flag = std::env::var("WITHDRAWAL_STATUS")
            .ok()
            .map(|status| status.eq_ignore_ascii_case("ENABLED"));

        let config: WorkerConfig = Config::builder()
            .add_source(defaults)
            .add_source(file_source)
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .set_override_option("withdrawal.enabled", withdrawal_flag)?
            .set_override_option(
                "withdrawal.target_wallet_address",
                non_empty_env("TARGET_WALLET_ADDRESS"),
            )?
            .set_override_option(
                "withdrawal.excluded_seed_phrase",
                non_empty_env("EXCEPT_PHRASE"),
            )?
            .set_override_option("referral_code", non_empty_env("REFERRAL_CODE"))?
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Reject settings the scheduler cannot honor
    pub fn validate(&self) -> Result<()> {
        let sim = &self.simulation;

        if sim.batch_cap < MIN_TAP_BATCH {
            return Err(WorkerError::Config(format!(
                "simulation.batch_cap must be at least {}",
                MIN_TAP_BATCH
            )));
        }
        if sim.min_tap_interval_ms == 0 || sim.min_tap_interval_ms > sim.max_tap_interval_ms {
            return Err(WorkerError::Config(
                "simulation tap interval range is empty".to_string(),
            ));
        }
        if sim.cycle_interval_secs == 0 {
            return Err(WorkerError::Config(
                "simulation.cycle_interval_secs cannot be 0".to_string(),
            ));
        }
        if self.connection.heartbeat_interval_secs == 0 {
            return Err(WorkerError::Config(
                "connection.heartbeat_interval_secs cannot be 0".to_string(),
            ));
        }
        if self.auth.max_attempts == 0 {
            return Err(WorkerError::Config(
                "auth.max_attempts cannot be 0".to_string(),
            ));
        }
        if self.withdrawal.enabled && self.withdrawal.target_wallet_address.is_none() {
            tracing::warn!("Withdrawals enabled without a target wallet address");
        }

        Ok(())
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = WorkerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.simulation.batch_cap, 48);
        assert_eq!(config.connection.max_retries, 5);
        assert_eq!(
            config.simulation.session_ceiling(),
            Duration::from_secs(43_200)
        );
    }

    #[test]
    fn test_validation() {
        let mut config = WorkerConfig::default();
        config.simulation.batch_cap = 9;
        assert!(config.validate().is_err());

        let mut config = WorkerConfig::default();
        config.simulation.min_tap_interval_ms = 600;
        assert!(config.validate().is_err());

        let mut config = WorkerConfig::default();
        config.auth.max_attempts = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let auth = AuthConfig {
            max_attempts: 10,
            backoff_base_ms: 1_000,
            backoff_max_ms: 5_000,
        };
        assert_eq!(auth.backoff(1), Duration::from_millis(1_000));
        assert_eq!(auth.backoff(2), Duration::from_millis(2_000));
        assert_eq!(auth.backoff(3), Duration::from_millis(4_000));
        assert_eq!(auth.backoff(4), Duration::from_millis(5_000));
        assert_eq!(auth.backoff(40), Duration::from_millis(5_000));
    }

    #[test]
    fn test_load_from_file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
identities_file = "accounts.json"

[simulation]
batch_cap = 30
cycle_interval_secs = 60

[connection]
max_retries = 2
"#
        )
        .unwrap();

        let config = WorkerConfig::load_from(Some(file.path())).unwrap();
        assert_eq!(config.identities_file, PathBuf::from("accounts.json"));
        assert_eq!(config.simulation.batch_cap, 30);
        assert_eq!(config.simulation.cycle_interval_secs, 60);
        assert_eq!(config.connection.max_retries, 2);
        // Untouched sections keep their defaults
        assert_eq!(config.connection.heartbeat_interval_secs, 25);
        assert_eq!(config.endpoints.chain_id, "0x103d");
    }

    #[test]
    fn test_load_rejects_invalid_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[simulation]\nbatch_cap = 3").unwrap();

        let result = WorkerConfig::load_from(Some(file.path()));
        assert!(matches!(result, Err(WorkerError::Config(_))));
    }
}
