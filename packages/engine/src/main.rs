// packages/engine/src/main.rs
//! Tapfarm Engine
//!
//! Loads configuration and identities, starts one worker per identity and
//! runs until Ctrl-C.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tapfarm_engine::identity::load_identities;
use tapfarm_engine::observability::{init_metrics, init_tracing};
use tapfarm_engine::{
    HttpPlatformClient, IdentityStore, WebSocketTransport, WorkerConfig, WorkerContext, WorkerPool,
};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = WorkerConfig::load().context("failed to load configuration")?;

    // Initialize observability (tracing, metrics)
    init_tracing(config.observability.log_format)?;
    init_metrics(config.observability.metrics_addr)?;

    info!("Starting Tapfarm Engine v{}", tapfarm_engine::VERSION);

    // Load identities
    let records = load_identities(
        &config.identities_file,
        &config.simulation,
        &config.withdrawal,
    )
    .await
    .with_context(|| {
        format!(
            "failed to load identities from {}",
            config.identities_file.display()
        )
    })?;
    let store = Arc::new(IdentityStore::from_records(records));
    info!("Loaded {} identities", store.len());

    let api = Arc::new(HttpPlatformClient::new(config.endpoints.clone())?);
    let transport = Arc::new(
        WebSocketTransport::new(config.endpoints.socket_url.clone())
            .with_connect_timeout(Duration::from_secs(config.endpoints.request_timeout_secs)),
    );

    let ctx = WorkerContext::new(config, store, api, transport);
    let pool = WorkerPool::new(ctx);
    pool.start();

    // Graceful shutdown handler
    tokio::signal::ctrl_c()
        .await
        .context("failed to install Ctrl-C handler")?;
    info!("Received shutdown signal, cleaning up...");

    let stats = pool.stats();
    info!(
        "Stopping {} identities ({} active, {} abandoned)",
        stats.identities, stats.active, stats.abandoned
    );
    pool.shutdown().await;

    info!("Engine stopped");
    Ok(())
}
