use crate::config::ServerConfig;
use crate::monitor::{self, MonitorEngine, Supervisor};
use chrono::{DateTime, Utc};
use opsmon_notify::plugin::ChannelRegistry;
use opsmon_storage::MonitorStore;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<MonitorStore>,
    pub supervisor: Arc<Supervisor>,
    pub start_time: DateTime<Utc>,
    pub config: Arc<ServerConfig>,
}

impl AppState {
    /// Builds the monitoring engine on top of `store` with the built-in channel types.
    pub fn new(store: Arc<MonitorStore>, config: ServerConfig) -> Self {
        let engine = monitor::engine_for_store(&store, &config.monitor, ChannelRegistry::default());
        let supervisor = Supervisor::new(engine, monitor::loop_settings(&config.monitor));
        Self {
            store,
            supervisor: Arc::new(supervisor),
            start_time: Utc::now(),
            config: Arc::new(config),
        }
    }

    pub fn engine(&self) -> &MonitorEngine {
        self.supervisor.engine()
    }
}
