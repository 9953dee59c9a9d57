// packages/engine/src/runtime/tap_batch.rs
//! Batch sizing and paced action synthesis

use crate::connection::frame::{TapAction, TapBatch};
use crate::utils::config::{SimulationConfig, MIN_TAP_BATCH};
use rand::Rng;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Size of the next batch for a budget of `budget` actions
///
/// Either `0` (budget too small) or `min(cap, budget)`, which is then at
/// least [`MIN_TAP_BATCH`].
pub fn batch_size(budget: u64, cap: u64) -> u64 {
    let size = cap.min(budget);
    if size >= MIN_TAP_BATCH {
        size
    } else {
        0
    }
}

/// Random spacing between consecutive actions
#[derive(Debug, Clone, Copy)]
pub struct TapPacer {
    min_ms: u64,
    max_ms: u64,
}

impl TapPacer {
    pub fn new(min_ms: u64, max_ms: u64) -> Self {
        Self {
            min_ms: min_ms.min(max_ms),
            max_ms: max_ms.max(min_ms),
        }
    }

    pub fn from_config(config: &SimulationConfig) -> Self {
        Self::new(config.min_tap_interval_ms, config.max_tap_interval_ms)
    }

    pub fn next_interval_ms(&self) -> u64 {
        rand::thread_rng().gen_range(self.min_ms..=self.max_ms)
    }
}

/// A synthesized batch and the clock value after its last action
#[derive(Debug, Clone)]
pub struct SynthesizedBatch {
    pub batch: TapBatch,
    pub clock: u64,
}

/// Build `count` actions starting at `clock`
///
/// Each action is stamped with the current clock; the clock then advances by
/// a random interval and the task sleeps for that long. Returns `None` when
/// cancelled midway.
pub async fn synthesize(
    count: u64,
    mut clock: u64,
    pacer: &TapPacer,
    cancel: &CancellationToken,
) -> Option<SynthesizedBatch> {
    let mut taps = Vec::with_capacity(count as usize);

    for _ in 0..count {
        taps.push(TapAction::click(clock));

        let interval = pacer.next_interval_ms();
        clock += interval;

        tokio::select! {
            _ = cancel.cancelled() => return None,
            _ = tokio::time::sleep(Duration::from_millis(interval)) => {}
        }
    }

    Some(SynthesizedBatch {
        batch: TapBatch { taps },
        clock,
    })
}
