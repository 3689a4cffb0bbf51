//! Tenant monitoring: the sweep pipeline, the per-tenant loop and the
//! supervisor that owns every running loop.

pub mod scheduler;
pub mod supervisor;
pub mod sweep;

#[cfg(test)]
mod tests;

pub use scheduler::LoopSettings;
pub use supervisor::{MonitorStatus, Supervisor};
pub use sweep::{ManualEvaluation, ManualStatus, MonitorEngine};

use crate::config::MonitorConfig;
use opsmon_alert::hysteresis::HysteresisTracker;
use opsmon_alert::incident::IncidentManager;
use opsmon_notify::dispatcher::Dispatcher;
use opsmon_notify::plugin::ChannelRegistry;
use opsmon_storage::MonitorStore;
use std::sync::Arc;
use std::time::Duration;

/// Wires the engine to the SQLite store for every collaborator seam.
pub fn engine_for_store(
    store: &Arc<MonitorStore>,
    config: &MonitorConfig,
    registry: ChannelRegistry,
) -> MonitorEngine {
    let dispatcher = Dispatcher::new(
        Arc::new(registry),
        store.clone(),
        store.clone(),
        Duration::from_secs(config.notification_timeout_secs),
    );
    MonitorEngine::new(
        store.clone(),
        Arc::new(store.target_domains(config.sample_staleness_secs)),
        Arc::new(HysteresisTracker::new(
            config.hysteresis_ttl_secs,
            config.hysteresis_capacity,
        )),
        IncidentManager::new(store.clone()),
        Arc::new(dispatcher),
    )
}

pub fn loop_settings(config: &MonitorConfig) -> LoopSettings {
    LoopSettings::from_secs(
        config.evaluation_interval_secs,
        config.cache_cleanup_interval_secs,
        config.stop_timeout_secs,
    )
}
