use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use utoipa::ToSchema;

use super::scheduler::{LoopSettings, TenantLoop};
use super::sweep::MonitorEngine;

struct LoopHandle {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
    started_at: DateTime<Utc>,
}

/// Snapshot returned by [`Supervisor::status`].
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct MonitorStatus {
    /// Tenants with a live monitoring loop, sorted.
    pub running_tenants: Vec<String>,
    pub interval_secs: u64,
    /// Number of hysteresis counters currently held in memory.
    pub cache_size: usize,
}

/// Process-wide registry of tenant monitoring loops.
///
/// Starts and stops are serialised by `lifecycle`, so a tenant never has two
/// live loops: `start_monitoring` stops the previous loop before spawning the
/// new one. The handle map has its own short-lived lock, which keeps
/// `status` responsive while a loop is being waited on.
pub struct Supervisor {
    engine: MonitorEngine,
    settings: LoopSettings,
    lifecycle: tokio::sync::Mutex<()>,
    loops: Mutex<HashMap<String, LoopHandle>>,
}

impl Supervisor {
    pub fn new(engine: MonitorEngine, settings: LoopSettings) -> Self {
        Self {
            engine,
            settings,
            lifecycle: tokio::sync::Mutex::new(()),
            loops: Mutex::new(HashMap::new()),
        }
    }

    pub fn engine(&self) -> &MonitorEngine {
        &self.engine
    }

    fn loops(&self) -> std::sync::MutexGuard<'_, HashMap<String, LoopHandle>> {
        self.loops.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Starts the tenant's loop. Returns `true` when a running loop was replaced.
    pub async fn start_monitoring(&self, tenant_id: &str) -> bool {
        let _lifecycle = self.lifecycle.lock().await;
        let previous = self.loops().remove(tenant_id);
        let replaced = match previous {
            Some(previous) => {
                let live = !previous.handle.is_finished();
                self.shut_down(tenant_id, previous).await;
                live
            }
            None => false,
        };

        let cancel = CancellationToken::new();
        let tenant_loop = TenantLoop::new(
            tenant_id.to_string(),
            self.engine.clone(),
            self.settings,
            cancel.clone(),
        );
        let handle = tokio::spawn(tenant_loop.run());
        self.loops().insert(
            tenant_id.to_string(),
            LoopHandle {
                cancel,
                handle,
                started_at: Utc::now(),
            },
        );
        replaced
    }

    /// Stops the tenant's loop. Returns `false` when none was registered.
    pub async fn stop_monitoring(&self, tenant_id: &str) -> bool {
        let _lifecycle = self.lifecycle.lock().await;
        let running = self.loops().remove(tenant_id);
        match running {
            Some(running) => {
                self.shut_down(tenant_id, running).await;
                true
            }
            None => false,
        }
    }

    /// Stops every loop; cancellation is signalled to all of them before waiting.
    pub async fn stop_all(&self) -> usize {
        let _lifecycle = self.lifecycle.lock().await;
        let drained: Vec<(String, LoopHandle)> = self.loops().drain().collect();
        for (_, running) in &drained {
            running.cancel.cancel();
        }
        let count = drained.len();
        for (tenant_id, running) in drained {
            self.shut_down(&tenant_id, running).await;
        }
        if count > 0 {
            tracing::info!(count, "All tenant monitoring loops stopped");
        }
        count
    }

    /// Starts a loop for every tenant owning an enabled rule.
    pub async fn autostart(&self) -> anyhow::Result<usize> {
        let tenants = self.engine.rules().list_monitored_tenants().await?;
        for tenant_id in &tenants {
            self.start_monitoring(tenant_id).await;
        }
        Ok(tenants.len())
    }

    /// Loops being stopped are already absent from the snapshot.
    pub async fn status(&self) -> MonitorStatus {
        let mut running_tenants: Vec<String> = self
            .loops()
            .iter()
            .filter(|(_, l)| !l.handle.is_finished())
            .map(|(tenant, _)| tenant.clone())
            .collect();
        running_tenants.sort();
        MonitorStatus {
            running_tenants,
            interval_secs: self.settings.evaluation_interval.as_secs(),
            cache_size: self.engine.hysteresis().len(),
        }
    }

    pub async fn is_running(&self, tenant_id: &str) -> bool {
        self.loops()
            .get(tenant_id)
            .is_some_and(|l| !l.handle.is_finished())
    }

    /// Cancels the loop and waits up to `stop_timeout` for it to exit. A loop
    /// that overruns is aborted and awaited until the task is gone.
    async fn shut_down(&self, tenant_id: &str, running: LoopHandle) {
        running.cancel.cancel();
        let mut handle = running.handle;
        match tokio::time::timeout(self.settings.stop_timeout, &mut handle).await {
            Ok(Ok(())) => {
                tracing::debug!(
                    tenant_id = %tenant_id,
                    ran_secs = (Utc::now() - running.started_at).num_seconds(),
                    "Tenant monitoring loop exited"
                );
            }
            Ok(Err(e)) => {
                tracing::error!(tenant_id = %tenant_id, error = %e, "Tenant monitoring loop ended abnormally");
            }
            Err(_) => {
                handle.abort();
                let _ = handle.await;
                tracing::warn!(
                    tenant_id = %tenant_id,
                    timeout_secs = self.settings.stop_timeout.as_secs(),
                    "Tenant monitoring loop did not stop in time, aborted"
                );
            }
        }
    }
}
