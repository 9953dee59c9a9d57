// packages/engine/src/observability.rs
//! Logging and metrics setup
//!
//! - **Tracing**: `RUST_LOG` filter (default `info`), human-readable or JSON
//! - **Metrics**: optional Prometheus scrape endpoint
//!
//! Counters recorded by the engine:
//!
//! - `tapfarm_taps_sent_total`
//! - `tapfarm_frames_sent_total{kind}`
//! - `tapfarm_reconnects_total`
//! - `tapfarm_withdrawals_total{outcome}`
//! - `tapfarm_auth_failures_total`

use crate::utils::config::LogFormat;
use crate::utils::errors::{Result, WorkerError};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber
pub fn init_tracing(format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(env_filter);

    let installed = match format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_target(false))
            .try_init(),
        LogFormat::Pretty => registry
            .with(tracing_subscriber::fmt::layer().with_target(false))
            .try_init(),
    };

    installed
        .map_err(|e| WorkerError::Config(format!("failed to install tracing subscriber: {}", e)))
}

/// Start the Prometheus exporter when an address is configured
pub fn init_metrics(addr: Option<SocketAddr>) -> Result<()> {
    let Some(addr) = addr else {
        return Ok(());
    };

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| WorkerError::Config(format!("failed to start metrics exporter: {}", e)))?;

    info!("Prometheus metrics listening on {}", addr);
    Ok(())
}
