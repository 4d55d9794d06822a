use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{debug, info, warn};

use super::registry::LoggerRegistry;
use crate::observability::Metrics;

/// Lower bound on the sweep period
pub const MIN_SWEEP_PERIOD: Duration = Duration::from_millis(1);

/// Sweep every half idle timeout, so a stale writer is found at most
/// 1.5 × idle_timeout after its last event
pub fn sweep_period(idle_timeout: Duration) -> Duration {
    (idle_timeout / 2).max(MIN_SWEEP_PERIOD)
}

/// Periodic task closing and evicting idle writers
pub(crate) struct IdleReaper {
    registry: Arc<LoggerRegistry>,
    idle_timeout: Duration,
    metrics: Arc<Metrics>,
    shutdown: watch::Receiver<bool>,
}

impl IdleReaper {
    pub(crate) fn new(
        registry: Arc<LoggerRegistry>,
        idle_timeout: Duration,
        metrics: Arc<Metrics>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            registry,
            idle_timeout,
            metrics,
            shutdown,
        }
    }

    pub(crate) async fn run(mut self) {
        let period = sweep_period(self.idle_timeout);
        info!(?period, idle_timeout = ?self.idle_timeout, "Idle reaper started");

        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.sweep().await;
                }
                _ = self.shutdown.changed() => {
                    break;
                }
            }
        }

        info!("Idle reaper stopped");
    }

    /// One pass over the registry; returns how many writers were evicted
    pub(crate) async fn sweep(&self) -> usize {
        let reaped = self
            .registry
            .reap_idle(Instant::now(), self.idle_timeout)
            .await;

        for entry in &reaped {
            match &entry.result {
                Ok(()) => info!(key = %entry.key, "Writer idle timeout, closed"),
                Err(e) => {
                    warn!(
                        key = %entry.key,
                        error = %e,
                        "Could not close idle writer (possible data loss)"
                    );
                    self.metrics.close_failed();
                }
            }
            self.metrics.writer_reaped();
        }

        if !reaped.is_empty() {
            debug!(count = reaped.len(), "Sweep evicted writers");
        }

        reaped.len()
    }
}
