// packages/engine/src/runtime/task.rs
//! Cancellable periodic background task
//!
//! The task is owned by whoever spawned it: dropping the handle stops it, so
//! a timer can never outlive the connection that started it.

use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::trace;

/// Runs a closure every `period` until cancelled or dropped
pub struct RepeatingTask {
    name: &'static str,
    cancel: CancellationToken,
    handle: Option<JoinHandle<u64>>,
}

impl RepeatingTask {
    /// Spawn the task; the first tick fires one `period` after spawning
    pub fn spawn<F>(
        name: &'static str,
        period: Duration,
        cancel: CancellationToken,
        mut tick: F,
    ) -> Self
    where
        F: FnMut() + Send + 'static,
    {
        let token = cancel.clone();

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut ticks = 0u64;

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = interval.tick() => {
                        tick();
                        ticks += 1;
                    }
                }
            }

            trace!("{} task stopped after {} ticks", name, ticks);
            ticks
        });

        Self {
            name,
            cancel,
            handle: Some(handle),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Cancel and wait for the task; returns how many ticks ran
    pub async fn stop(mut self) -> u64 {
        self.cancel.cancel();
        match self.handle.take() {
            Some(handle) => handle.await.unwrap_or(0),
            None => 0,
        }
    }
}

impl Drop for RepeatingTask {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
