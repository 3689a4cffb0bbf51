use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::{interval, interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::sweep::MonitorEngine;

/// Timing of a tenant loop.
#[derive(Debug, Clone, Copy)]
pub struct LoopSettings {
    pub evaluation_interval: Duration,
    pub cleanup_interval: Duration,
    pub stop_timeout: Duration,
}

impl LoopSettings {
    /// Intervals of zero are raised to one second.
    pub fn from_secs(evaluation_interval: u64, cleanup_interval: u64, stop_timeout: u64) -> Self {
        Self {
            evaluation_interval: Duration::from_secs(evaluation_interval.max(1)),
            cleanup_interval: Duration::from_secs(cleanup_interval.max(1)),
            stop_timeout: Duration::from_secs(stop_timeout),
        }
    }
}

/// The long-running monitoring loop of one tenant.
///
/// Sweeps run every `evaluation_interval` until the token is cancelled; a
/// second, coarser timer garbage-collects hysteresis counters.
pub struct TenantLoop {
    tenant_id: String,
    engine: MonitorEngine,
    settings: LoopSettings,
    cancel: CancellationToken,
}

impl TenantLoop {
    pub fn new(
        tenant_id: String,
        engine: MonitorEngine,
        settings: LoopSettings,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            tenant_id,
            engine,
            settings,
            cancel,
        }
    }

    pub async fn run(self) {
        tracing::info!(
            tenant_id = %self.tenant_id,
            interval_secs = self.settings.evaluation_interval.as_secs(),
            "Tenant monitoring loop started"
        );

        let mut sweep_tick = interval(self.settings.evaluation_interval);
        sweep_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let cleanup_every = self.settings.cleanup_interval;
        let mut cleanup_tick = interval_at(Instant::now() + cleanup_every, cleanup_every);
        cleanup_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                _ = cleanup_tick.tick() => {
                    let removed = self.engine.hysteresis().sweep_expired();
                    if removed > 0 {
                        tracing::debug!(tenant_id = %self.tenant_id, removed, "Expired hysteresis counters dropped");
                    }
                }
                _ = sweep_tick.tick() => self.run_sweep().await,
            }
        }

        tracing::info!(tenant_id = %self.tenant_id, "Tenant monitoring loop stopped");
    }

    /// Runs one sweep in its own task so a panic inside it is reported here
    /// instead of ending the loop.
    ///
    /// The sweep checks the token between rules. If it is still running half a
    /// stop timeout after cancellation, it is aborted and awaited here, so the
    /// loop never exits while its sweep task is alive.
    async fn run_sweep(&self) {
        let engine = self.engine.clone();
        let tenant_id = self.tenant_id.clone();
        let cancel = self.cancel.clone();

        let mut sweep = JoinSet::new();
        sweep.spawn(async move { engine.sweep_tenant(&tenant_id, &cancel).await });

        let grace = self.settings.stop_timeout / 2;
        let grace_expired = async {
            self.cancel.cancelled().await;
            tokio::time::sleep(grace).await;
        };
        let joined = tokio::select! {
            joined = sweep.join_next() => joined,
            _ = grace_expired => {
                sweep.abort_all();
                sweep.join_next().await
            }
        };

        match joined {
            Some(Ok(Ok(stats))) if stats.cancelled => {
                tracing::info!(tenant_id = %self.tenant_id, "Sweep interrupted by stop request");
            }
            Some(Ok(Ok(_))) | None => {}
            Some(Ok(Err(e))) => {
                tracing::error!(tenant_id = %self.tenant_id, error = %e, "Sweep failed");
            }
            Some(Err(e)) if e.is_cancelled() => {
                tracing::warn!(tenant_id = %self.tenant_id, "Sweep aborted after stop request");
            }
            Some(Err(e)) => {
                tracing::error!(tenant_id = %self.tenant_id, error = %e, "Sweep task did not complete");
            }
        }
    }
}
