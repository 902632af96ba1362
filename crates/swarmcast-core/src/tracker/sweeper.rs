//! Periodic removal of stale peers
//!
//! Runs a background task that sweeps the registry on a fixed interval.
//! A failing sweep is logged and the next one still runs.

use super::PeerTracker;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

impl PeerTracker {
    /// Start the sweep loop. It stops when `shutdown` is cancelled.
    pub fn spawn_sweeper(self: &Arc<Self>, shutdown: CancellationToken) -> JoinHandle<()> {
        let tracker = Arc::clone(self);
        let period = tracker.config.sweep_interval;

        info!("Starting tracker sweeper (every {:?})", period);

        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        info!("Tracker sweeper stopped");
                        break;
                    }
                    _ = ticker.tick() => {}
                }

                match catch_unwind(AssertUnwindSafe(|| tracker.scheduled_sweep())) {
                    Ok(0) => {}
                    Ok(removed) => info!(removed, "Cleaned up inactive peers"),
                    Err(_) => error!("Tracker sweep failed; retrying on next interval"),
                }
            }
        })
    }

    fn scheduled_sweep(&self) -> usize {
        #[cfg(test)]
        self.maybe_fail_sweep();
        self.sweep()
    }

    #[cfg(test)]
    fn maybe_fail_sweep(&self) {
        use std::sync::atomic::Ordering;
        let fail = self
            .failing_sweeps
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if fail {
            panic!("sweep failure requested by test");
        }
    }
}
