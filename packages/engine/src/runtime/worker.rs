// packages/engine/src/runtime/worker.rs
//! Worker pool: one independent task chain per identity
//!
//! # Architecture
//!
//! ```text
//! WorkerPool
//! ├─ WorkerContext (config, store, platform, transport, authenticator)
//! └─ ConnectionManager
//!    ├─ identity 1: driver ─► heartbeat + scheduler
//!    ├─ identity 2: driver ─► heartbeat + scheduler
//!    └─ ...
//! ```
//!
//! Identities never share a task, so one identity failing to log in or
//! connect does not affect the others. Cross-identity parallelism is not
//! limited.

use crate::auth::Authenticator;
use crate::connection::manager::{ConnectionManager, ConnectionState};
use crate::connection::transport::{FrameSender, Transport};
use crate::identity::{IdentityId, IdentityStore};
use crate::platform::api::PlatformApi;
use crate::runtime::scheduler::SimulationScheduler;
use crate::runtime::withdrawal::WithdrawalGate;
use crate::utils::config::WorkerConfig;
use crate::utils::errors::AuthError;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Shared dependencies of every identity's tasks
pub struct WorkerContext {
    pub config: WorkerConfig,
    pub store: Arc<IdentityStore>,
    pub api: Arc<dyn PlatformApi>,
    pub transport: Arc<dyn Transport>,
    pub authenticator: Authenticator,

    /// Present when withdrawals are enabled
    pub gate: Option<Arc<WithdrawalGate>>,
}

impl WorkerContext {
    pub fn new(
        config: WorkerConfig,
        store: Arc<IdentityStore>,
        api: Arc<dyn PlatformApi>,
        transport: Arc<dyn Transport>,
    ) -> Arc<Self> {
        let authenticator = Authenticator::new(
            Arc::clone(&store),
            Arc::clone(&api),
            config.endpoints.chain_id.clone(),
            config.auth.clone(),
        );
        let gate = config.withdrawal.enabled.then(|| {
            Arc::new(WithdrawalGate::new(
                Arc::clone(&store),
                Arc::clone(&api),
                config.withdrawal.clone(),
            ))
        });

        Arc::new(Self {
            config,
            store,
            api,
            transport,
            authenticator,
            gate,
        })
    }

    /// Log in with retries, then bind the referral code once
    pub async fn login(&self, id: IdentityId) -> Result<(), AuthError> {
        self.authenticator.authenticate_with_retry(id).await?;
        self.bind_referral(id).await;
        Ok(())
    }

    /// Scheduler for one connection of `id`
    pub fn scheduler(&self, id: IdentityId, sender: FrameSender) -> SimulationScheduler {
        SimulationScheduler::new(
            id,
            Arc::clone(&self.store),
            Arc::clone(&self.api),
            self.gate.clone(),
            self.config.simulation.clone(),
            sender,
        )
    }

    async fn bind_referral(&self, id: IdentityId) {
        let Some(code) = self
            .config
            .referral_code
            .as_deref()
            .map(str::trim)
            .filter(|code| !code.is_empty())
        else {
            return;
        };

        if self
            .store
            .read(id, |record| record.referral_bound)
            .unwrap_or(true)
        {
            return;
        }
        let Ok(token) = self.store.access_token(id) else {
            return;
        };

        let name = self.store.display_name(id);
        match self.api.bind_referral(&token, code).await {
            Ok(()) => {
                info!("[{}] Referral code bound", name);
                let _ = self.store.mark_referral_bound(id);
            }
            Err(e) => warn!("[{}] Failed to bind referral code: {}", name, e),
        }
    }
}

/// Connection states across all identities
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub identities: usize,
    pub active: usize,
    pub connecting: usize,
    pub abandoned: usize,
    pub idle: usize,
}

/// Starts and stops every identity
pub struct WorkerPool {
    ctx: Arc<WorkerContext>,
    manager: Arc<ConnectionManager>,

    /// Setup tasks that may still be logging in
    setups: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    pub fn new(ctx: Arc<WorkerContext>) -> Self {
        let manager = Arc::new(ConnectionManager::new(Arc::clone(&ctx)));
        Self {
            ctx,
            manager,
            setups: Mutex::new(Vec::new()),
        }
    }

    pub fn manager(&self) -> &Arc<ConnectionManager> {
        &self.manager
    }

    /// Set up a connection for every identity concurrently
    ///
    /// Returns immediately; identities that fail to log in are logged and
    /// left idle.
    pub fn start(&self) -> usize {
        let ids = self.ctx.store.ids();
        info!("Starting {} identities", ids.len());

        let mut setups = self.setups.lock();
        for id in &ids {
            let id = *id;
            let manager = Arc::clone(&self.manager);
            let name = self.ctx.store.display_name(id);

            setups.push(tokio::spawn(async move {
                if let Err(e) = manager.setup_connection(id).await {
                    error!("[{}] Setup failed: {}", name, e);
                }
            }));
        }

        ids.len()
    }

    pub fn stats(&self) -> PoolStats {
        let ids = self.ctx.store.ids();
        let mut stats = PoolStats {
            identities: ids.len(),
            ..Default::default()
        };

        for id in ids {
            match self.manager.state(id) {
                ConnectionState::Active => stats.active += 1,
                ConnectionState::Connecting
                | ConnectionState::Handshaking
                | ConnectionState::Reauthenticating => stats.connecting += 1,
                ConnectionState::Abandoned => stats.abandoned += 1,
                ConnectionState::Disconnected
                | ConnectionState::ClosingClean
                | ConnectionState::ClosingError => stats.idle += 1,
            }
        }

        stats
    }

    /// Stop pending setups and close every connection
    pub async fn shutdown(&self) {
        info!("Shutting down worker pool");

        let setups: Vec<JoinHandle<()>> = self.setups.lock().drain(..).collect();
        for setup in setups {
            setup.abort();
            let _ = setup.await;
        }

        self.manager.shutdown().await;
    }
}
