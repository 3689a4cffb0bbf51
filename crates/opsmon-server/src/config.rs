use anyhow::Context;
use opsmon_common::types::{AlertRule, NotificationChannelConfig};
use opsmon_storage::store::{HostRecord, ProbeRecord};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_http_port")]
    pub http_port: u16,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_url")]
    pub url: String,
}

impl DatabaseConfig {
    /// File path of a `sqlite://` URL, without query parameters.
    pub fn sqlite_path(&self) -> Option<&str> {
        let rest = self.url.strip_prefix("sqlite://")?;
        let path = rest.split('?').next().unwrap_or(rest);
        (!path.is_empty() && path != ":memory:").then_some(path)
    }

    /// Creates the directory holding the SQLite file when it does not exist yet.
    pub fn ensure_data_dir(&self) -> anyhow::Result<()> {
        let Some(parent) = self.sqlite_path().and_then(|p| std::path::Path::new(p).parent()) else {
            return Ok(());
        };
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create data directory '{}'", parent.display()))?;
        }
        Ok(())
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
        }
    }
}

/// Tenant monitoring loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Sleep between two sweeps of a tenant.
    #[serde(default = "default_evaluation_interval_secs")]
    pub evaluation_interval_secs: u64,
    /// Period of the hysteresis garbage collection inside each loop.
    #[serde(default = "default_cache_cleanup_interval_secs")]
    pub cache_cleanup_interval_secs: u64,
    #[serde(default = "default_hysteresis_ttl_secs")]
    pub hysteresis_ttl_secs: u64,
    #[serde(default = "default_hysteresis_capacity")]
    pub hysteresis_capacity: usize,
    /// Upper bound on waiting for a loop to exit after cancellation.
    #[serde(default = "default_stop_timeout_secs")]
    pub stop_timeout_secs: u64,
    /// Samples older than this count as "no recent data".
    #[serde(default = "default_sample_staleness_secs")]
    pub sample_staleness_secs: u64,
    #[serde(default = "default_notification_timeout_secs")]
    pub notification_timeout_secs: u64,
    /// Start a loop for every tenant with enabled rules at boot.
    #[serde(default = "default_autostart")]
    pub autostart: bool,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            evaluation_interval_secs: default_evaluation_interval_secs(),
            cache_cleanup_interval_secs: default_cache_cleanup_interval_secs(),
            hysteresis_ttl_secs: default_hysteresis_ttl_secs(),
            hysteresis_capacity: default_hysteresis_capacity(),
            stop_timeout_secs: default_stop_timeout_secs(),
            sample_staleness_secs: default_sample_staleness_secs(),
            notification_timeout_secs: default_notification_timeout_secs(),
            autostart: default_autostart(),
        }
    }
}

// ---- Seed file types (used by the `seed` CLI subcommand) ----

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SeedFile {
    #[serde(default)]
    pub channels: Vec<NotificationChannelConfig>,
    #[serde(default)]
    pub hosts: Vec<HostRecord>,
    #[serde(default)]
    pub probes: Vec<ProbeRecord>,
    #[serde(default)]
    pub rules: Vec<AlertRule>,
}

impl SeedFile {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read seed file '{path}'"))?;
        serde_json::from_str(&content).with_context(|| format!("Failed to parse seed file '{path}'"))
    }
}

fn default_http_port() -> u16 {
    8080
}

fn default_database_url() -> String {
    "sqlite://data/opsmon.db?mode=rwc".to_string()
}

fn default_evaluation_interval_secs() -> u64 {
    60
}

fn default_cache_cleanup_interval_secs() -> u64 {
    300
}

fn default_hysteresis_ttl_secs() -> u64 {
    3600
}

fn default_hysteresis_capacity() -> usize {
    100_000
}

fn default_stop_timeout_secs() -> u64 {
    10
}

fn default_sample_staleness_secs() -> u64 {
    300
}

fn default_notification_timeout_secs() -> u64 {
    15
}

fn default_autostart() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_port: default_http_port(),
            database: DatabaseConfig::default(),
            monitor: MonitorConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file '{path}'"))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file '{path}'"))?;
        Ok(config)
    }
}
