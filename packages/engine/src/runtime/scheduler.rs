// packages/engine/src/runtime/scheduler.rs
//! Per-identity simulation scheduler
//!
//! Runs while the identity's connection is active. Each cycle spends the
//! energy budget in paced batches and then checks for a withdrawal.
//!
//! ```text
//! cycle ─► token valid? ─► refresh balances ─► [synthesize ─► send ─► spend]* ─► withdrawal
//!              │ no
//!              ▼
//!        TokenExpired (connection re-authenticates)
//! ```
//!
//! The scheduler exits with [`SchedulerExit::SessionCeiling`] once the
//! session has been up for `session_ceiling`; the connection manager then
//! runs a full re-login.

use crate::connection::frame::OutboundFrame;
use crate::connection::transport::FrameSender;
use crate::identity::{IdentityId, IdentityStore};
use crate::platform::api::PlatformApi;
use crate::runtime::tap_batch::{batch_size, synthesize, TapPacer};
use crate::runtime::withdrawal::WithdrawalGate;
use crate::utils::config::{SimulationConfig, MIN_TAP_BATCH};
use chrono::Utc;
use std::sync::Arc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Why the scheduler stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerExit {
    TokenExpired,
    SessionCeiling,
    Cancelled,
}

/// Result of one cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    Completed {
        taps_sent: u64,
        frames_sent: u64,
    },

    /// Another cycle for the identity was still running
    Skipped,

    TokenExpired,
    Cancelled,
}

/// Drives simulation cycles for one identity over one connection
pub struct SimulationScheduler {
    id: IdentityId,
    store: Arc<IdentityStore>,
    api: Arc<dyn PlatformApi>,

    /// Present when withdrawals are enabled
    gate: Option<Arc<WithdrawalGate>>,

    config: SimulationConfig,
    pacer: TapPacer,
    sender: FrameSender,
}

impl SimulationScheduler {
    pub fn new(
        id: IdentityId,
        store: Arc<IdentityStore>,
        api: Arc<dyn PlatformApi>,
        gate: Option<Arc<WithdrawalGate>>,
        config: SimulationConfig,
        sender: FrameSender,
    ) -> Self {
        let pacer = TapPacer::from_config(&config);
        Self {
            id,
            store,
            api,
            gate,
            config,
            pacer,
            sender,
        }
    }

    /// Run cycles every `cycle_interval` until expiry, the ceiling or cancel
    pub async fn run(self, cancel: CancellationToken) -> SchedulerExit {
        let name = self.store.display_name(self.id);
        let started = Instant::now();
        let period = self.config.cycle_interval();
        let mut ticker = tokio::time::interval_at(started + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut cycle = 0u64;

        loop {
            cycle += 1;
            match self.run_cycle(cycle, &cancel).await {
                CycleOutcome::TokenExpired => return SchedulerExit::TokenExpired,
                CycleOutcome::Cancelled => return SchedulerExit::Cancelled,
                CycleOutcome::Completed { .. } | CycleOutcome::Skipped => {}
            }

            tokio::select! {
                _ = cancel.cancelled() => return SchedulerExit::Cancelled,
                _ = ticker.tick() => {}
            }

            if started.elapsed() >= self.config.session_ceiling() {
                info!(
                    "[{}] Session open for {:?}, forcing a fresh login",
                    name,
                    self.config.session_ceiling()
                );
                return SchedulerExit::SessionCeiling;
            }
        }
    }

    /// One simulation cycle
    pub async fn run_cycle(&self, cycle: u64, cancel: &CancellationToken) -> CycleOutcome {
        let name = self.store.display_name(self.id);

        let Some(_guard) = self.store.try_begin_cycle(self.id) else {
            warn!(
                "[{}] Previous cycle still running, skipping cycle {}",
                name, cycle
            );
            return CycleOutcome::Skipped;
        };

        info!("[{}] Processing simulation cycle {}", name, cycle);

        if self
            .store
            .token_expired(self.id, Utc::now())
            .unwrap_or(true)
        {
            info!("[{}] Access token expired", name);
            return CycleOutcome::TokenExpired;
        }

        self.refresh_balances(&name).await;

        let window_start = Instant::now();
        let mut taps_sent = 0u64;
        let mut frames_sent = 0u64;

        loop {
            if window_start.elapsed() >= self.config.tap_window() {
                debug!("[{}] Tap window elapsed", name);
                break;
            }

            let energy = self.store.balances(self.id).map(|b| b.energy).unwrap_or(0);
            if energy <= MIN_TAP_BATCH {
                break;
            }

            let size = batch_size(energy, self.config.batch_cap);
            if size == 0 {
                break;
            }

            let clock = self
                .store
                .simulation_clock(self.id)
                .unwrap_or(self.config.initial_clock);
            let Some(synthesized) = synthesize(size, clock, &self.pacer, cancel).await else {
                return CycleOutcome::Cancelled;
            };

            if let Err(e) = self.sender.send(&OutboundFrame::Taps(synthesized.batch)) {
                warn!("[{}] Failed to send taps: {}", name, e);
                break;
            }

            let remaining = self
                .store
                .record_batch(self.id, size, synthesized.clock)
                .unwrap_or(0);
            taps_sent += size;
            frames_sent += 1;
            metrics::counter!("tapfarm_taps_sent_total").increment(size);

            info!("[{}] Sent {} taps, energy left: {}", name, size, remaining);
        }

        if taps_sent == 0 {
            let energy = self.store.balances(self.id).map(|b| b.energy).unwrap_or(0);
            info!(
                "[{}] Less than {} taps possible, no simulation data sent. Energy left: {}",
                name, MIN_TAP_BATCH, energy
            );
        }

        if let Some(gate) = &self.gate {
            gate.maybe_withdraw(self.id).await;
        }

        CycleOutcome::Completed {
            taps_sent,
            frames_sent,
        }
    }

    async fn refresh_balances(&self, name: &str) {
        let Ok(token) = self.store.access_token(self.id) else {
            return;
        };

        match self.api.fetch_balance(&token).await {
            Ok(balances) => {
                debug!(
                    "[{}] Balance refreshed: energy={}, mpx={}",
                    name, balances.energy, balances.mpx
                );
                let _ = self.store.set_balances(self.id, balances);
            }
            // The last known budget stays in place
            Err(e) => error!("[{}] Failed to refresh balance: {}", name, e),
        }
    }
}
