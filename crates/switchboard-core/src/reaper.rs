//! Idle-connection eviction.
//!
//! A connection is idle when `now - last_activity > max_idle`. Only
//! successful outbound delivery refreshes `last_activity`, so a client that
//! only ever receives traffic nobody sends back to it will eventually be
//! swept even while its socket is open.

use std::sync::Arc;
use std::time::Duration;

use chrono::TimeDelta;
use metrics::counter;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::metrics::IDLE_EVICTIONS_TOTAL;
use crate::registry::Registry;

/// Sweeps idle connections out of a [`Registry`].
#[derive(Clone, Debug)]
pub struct Reaper {
    registry: Arc<Registry>,
    max_idle: TimeDelta,
}

impl Reaper {
    /// Create a reaper that evicts connections idle longer than `max_idle`.
    pub fn new(registry: Arc<Registry>, max_idle: Duration) -> Self {
        let max_idle = TimeDelta::from_std(max_idle).unwrap_or(TimeDelta::MAX);
        Self { registry, max_idle }
    }

    /// Remove every connection idle beyond the configured threshold.
    /// Returns the number removed.
    pub fn sweep(&self) -> usize {
        self.sweep_older_than(self.max_idle)
    }

    /// Remove every connection idle beyond `max_idle`, ignoring the
    /// configured threshold. Returns the number removed.
    pub fn sweep_idle(&self, max_idle: Duration) -> usize {
        self.sweep_older_than(TimeDelta::from_std(max_idle).unwrap_or(TimeDelta::MAX))
    }

    /// Candidates are collected under the lock and removed afterwards; a
    /// candidate that re-registered in between is left alone.
    fn sweep_older_than(&self, max_idle: TimeDelta) -> usize {
        let now = self.registry.now();
        let Some(cutoff) = now.checked_sub_signed(max_idle) else {
            return 0;
        };

        let candidates = self.registry.idle_before(cutoff);
        let removed = candidates
            .iter()
            .filter(|(id, handle)| self.registry.remove_if_same(id, handle, "idle"))
            .count();

        if removed > 0 {
            counter!(IDLE_EVICTIONS_TOTAL).increment(removed as u64);
            info!(
                removed,
                max_idle_secs = max_idle.num_seconds(),
                "idle connections swept"
            );
        } else {
            debug!(candidates = candidates.len(), "idle sweep found nothing");
        }
        removed
    }

    /// Sweep every `interval` until `cancel` fires.
    pub async fn run(self, interval: Duration, cancel: CancellationToken) {
        let mut ticker = time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // first tick completes immediately
        let _ = ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let _ = self.sweep();
                }
                () = cancel.cancelled() => {
                    debug!("reaper stopped");
                    return;
                }
            }
        }
    }

    /// Spawn [`Reaper::run`] on the current runtime.
    pub fn spawn(self, interval: Duration, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(interval, cancel))
    }
}
