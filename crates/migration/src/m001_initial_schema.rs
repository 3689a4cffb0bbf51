use sea_orm_migration::prelude::*;

pub struct Migration;

impl MigrationName for Migration {
    fn name(&self) -> &str {
        "m001_initial_schema"
    }
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager.get_connection().execute_unprepared(UP_SQL).await?;
        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .get_connection()
            .execute_unprepared(DOWN_SQL)
            .await?;
        Ok(())
    }
}

// Decimal quantities are TEXT so comparisons stay exact after a round trip.
const UP_SQL: &str = "
CREATE TABLE IF NOT EXISTS notification_channels (
    id TEXT PRIMARY KEY NOT NULL,
    tenant_id TEXT NOT NULL,
    name TEXT NOT NULL,
    channel_type TEXT NOT NULL,
    config_json TEXT NOT NULL DEFAULT '{}',
    enabled INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_notification_channels_tenant ON notification_channels(tenant_id);

CREATE TABLE IF NOT EXISTS alert_rules (
    id TEXT PRIMARY KEY NOT NULL,
    tenant_id TEXT NOT NULL,
    name TEXT NOT NULL,
    target_kind TEXT NOT NULL,
    target_selector TEXT,
    metric TEXT NOT NULL,
    operator TEXT NOT NULL,
    threshold TEXT NOT NULL,
    consecutive_failures INTEGER NOT NULL DEFAULT 0,
    silence_secs INTEGER NOT NULL DEFAULT 0,
    severity TEXT NOT NULL,
    channel_ids TEXT NOT NULL DEFAULT '[]',
    enabled INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_alert_rules_tenant_enabled ON alert_rules(tenant_id, enabled);

CREATE TABLE IF NOT EXISTS hosts (
    id TEXT PRIMARY KEY NOT NULL,
    tenant_id TEXT NOT NULL,
    name TEXT NOT NULL,
    address TEXT,
    enabled INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_hosts_tenant ON hosts(tenant_id);

CREATE TABLE IF NOT EXISTS host_metric_snapshots (
    id TEXT PRIMARY KEY NOT NULL,
    host_id TEXT NOT NULL,
    cpu_percent TEXT,
    memory_percent TEXT,
    disk_percent TEXT,
    load_avg TEXT,
    collected_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_host_snapshots_host_time ON host_metric_snapshots(host_id, collected_at DESC);

CREATE TABLE IF NOT EXISTS network_probes (
    id TEXT PRIMARY KEY NOT NULL,
    tenant_id TEXT NOT NULL,
    name TEXT NOT NULL,
    probe_type TEXT NOT NULL DEFAULT 'http',
    endpoint TEXT NOT NULL,
    enabled INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_network_probes_tenant ON network_probes(tenant_id);

CREATE TABLE IF NOT EXISTS probe_results (
    id TEXT PRIMARY KEY NOT NULL,
    probe_id TEXT NOT NULL,
    success INTEGER NOT NULL,
    response_time_ms TEXT,
    status_code INTEGER,
    error TEXT,
    checked_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_probe_results_probe_time ON probe_results(probe_id, checked_at DESC);

CREATE TABLE IF NOT EXISTS incidents (
    id TEXT PRIMARY KEY NOT NULL,
    tenant_id TEXT NOT NULL,
    rule_id TEXT NOT NULL,
    rule_name TEXT NOT NULL,
    target_id TEXT NOT NULL,
    target_name TEXT NOT NULL,
    target_kind TEXT NOT NULL,
    metric TEXT NOT NULL,
    severity TEXT NOT NULL,
    status TEXT NOT NULL,
    observed_value TEXT,
    threshold_value TEXT NOT NULL,
    message TEXT NOT NULL,
    trigger_count INTEGER NOT NULL DEFAULT 1,
    first_triggered_at TEXT NOT NULL,
    last_triggered_at TEXT NOT NULL,
    last_notified_at TEXT,
    acknowledged_at TEXT,
    acknowledged_by TEXT,
    resolved_at TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE UNIQUE INDEX IF NOT EXISTS idx_incidents_one_open
    ON incidents(rule_id, target_id) WHERE status IN ('active', 'acknowledged');
CREATE INDEX IF NOT EXISTS idx_incidents_tenant_status ON incidents(tenant_id, status);
CREATE INDEX IF NOT EXISTS idx_incidents_created ON incidents(created_at DESC);

CREATE TABLE IF NOT EXISTS notification_attempts (
    id TEXT PRIMARY KEY NOT NULL,
    tenant_id TEXT NOT NULL,
    incident_id TEXT NOT NULL,
    rule_id TEXT NOT NULL,
    channel_id TEXT NOT NULL,
    channel_name TEXT NOT NULL,
    channel_type TEXT NOT NULL,
    status TEXT NOT NULL,
    detail TEXT,
    duration_ms INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_notification_attempts_incident ON notification_attempts(incident_id, created_at);
";

const DOWN_SQL: &str = "
DROP TABLE IF EXISTS notification_attempts;
DROP TABLE IF EXISTS incidents;
DROP TABLE IF EXISTS probe_results;
DROP TABLE IF EXISTS network_probes;
DROP TABLE IF EXISTS host_metric_snapshots;
DROP TABLE IF EXISTS hosts;
DROP TABLE IF EXISTS alert_rules;
DROP TABLE IF EXISTS notification_channels;
";
