use anyhow::Result;
use async_trait::async_trait;
use chrono::{Duration, Utc};
use opsmon_alert::target::{
    HostMetricExtractor, ProbeMetricExtractor, SampleSource, TargetDomain, TargetDomains,
    TargetResolver,
};
use opsmon_common::types::{self, HostSnapshot, ProbeResult, Sample, Target, TargetKind};
use sea_orm::{ActiveModelTrait, ActiveValue::Set, ColumnTrait, EntityTrait, QueryFilter, QueryOrder};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::{decimal_to_text, now_fixed, parse_opt_decimal, to_fixed, to_utc, MonitorStore};
use crate::entities::{host, host_metric_snapshot, network_probe, probe_result};
use crate::error::StorageError;

/// A monitored host as registered by the inventory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostRecord {
    pub id: String,
    pub tenant_id: String,
    pub name: String,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

/// A configured network probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeRecord {
    pub id: String,
    pub tenant_id: String,
    pub name: String,
    #[serde(default = "default_probe_type")]
    pub probe_type: String,
    pub endpoint: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

fn default_probe_type() -> String {
    "http".to_string()
}

fn to_snapshot(m: host_metric_snapshot::Model) -> Result<HostSnapshot, StorageError> {
    Ok(HostSnapshot {
        cpu_percent: parse_opt_decimal("cpu_percent", m.cpu_percent.as_deref())?,
        memory_percent: parse_opt_decimal("memory_percent", m.memory_percent.as_deref())?,
        disk_percent: parse_opt_decimal("disk_percent", m.disk_percent.as_deref())?,
        load_avg: parse_opt_decimal("load_avg", m.load_avg.as_deref())?,
        collected_at: to_utc(m.collected_at),
        host_id: m.host_id,
    })
}

fn to_probe_result(m: probe_result::Model) -> Result<ProbeResult, StorageError> {
    Ok(ProbeResult {
        response_time_ms: parse_opt_decimal("response_time_ms", m.response_time_ms.as_deref())?,
        checked_at: to_utc(m.checked_at),
        probe_id: m.probe_id,
        success: m.success,
        status_code: m.status_code,
        error: m.error,
    })
}

impl MonitorStore {
    pub async fn save_host(&self, record: &HostRecord) -> Result<()> {
        let _guard = self.write_guard().await;
        let now = now_fixed();
        match host::Entity::find_by_id(record.id.as_str()).one(self.db()).await? {
            Some(m) => {
                let mut am: host::ActiveModel = m.into();
                am.tenant_id = Set(record.tenant_id.clone());
                am.name = Set(record.name.clone());
                am.address = Set(record.address.clone());
                am.enabled = Set(record.enabled);
                am.updated_at = Set(now);
                am.update(self.db()).await?;
            }
            None => {
                host::ActiveModel {
                    id: Set(record.id.clone()),
                    tenant_id: Set(record.tenant_id.clone()),
                    name: Set(record.name.clone()),
                    address: Set(record.address.clone()),
                    enabled: Set(record.enabled),
                    created_at: Set(now),
                    updated_at: Set(now),
                }
                .insert(self.db())
                .await?;
            }
        }
        Ok(())
    }

    pub async fn save_probe(&self, record: &ProbeRecord) -> Result<()> {
        let _guard = self.write_guard().await;
        let now = now_fixed();
        match network_probe::Entity::find_by_id(record.id.as_str()).one(self.db()).await? {
            Some(m) => {
                let mut am: network_probe::ActiveModel = m.into();
                am.tenant_id = Set(record.tenant_id.clone());
                am.name = Set(record.name.clone());
                am.probe_type = Set(record.probe_type.clone());
                am.endpoint = Set(record.endpoint.clone());
                am.enabled = Set(record.enabled);
                am.updated_at = Set(now);
                am.update(self.db()).await?;
            }
            None => {
                network_probe::ActiveModel {
                    id: Set(record.id.clone()),
                    tenant_id: Set(record.tenant_id.clone()),
                    name: Set(record.name.clone()),
                    probe_type: Set(record.probe_type.clone()),
                    endpoint: Set(record.endpoint.clone()),
                    enabled: Set(record.enabled),
                    created_at: Set(now),
                    updated_at: Set(now),
                }
                .insert(self.db())
                .await?;
            }
        }
        Ok(())
    }

    pub async fn list_hosts(&self, tenant_id: &str) -> Result<Vec<Target>> {
        let rows = host::Entity::find()
            .filter(host::Column::TenantId.eq(tenant_id))
            .filter(host::Column::Enabled.eq(true))
            .order_by_asc(host::Column::Name)
            .all(self.db())
            .await?;
        Ok(rows
            .into_iter()
            .map(|m| Target {
                id: m.id,
                tenant_id: m.tenant_id,
                kind: TargetKind::Host,
                name: m.name,
            })
            .collect())
    }

    pub async fn list_probes(&self, tenant_id: &str) -> Result<Vec<Target>> {
        let rows = network_probe::Entity::find()
            .filter(network_probe::Column::TenantId.eq(tenant_id))
            .filter(network_probe::Column::Enabled.eq(true))
            .order_by_asc(network_probe::Column::Name)
            .all(self.db())
            .await?;
        Ok(rows
            .into_iter()
            .map(|m| Target {
                id: m.id,
                tenant_id: m.tenant_id,
                kind: TargetKind::Probe,
                name: m.name,
            })
            .collect())
    }

    pub async fn insert_host_snapshot(&self, snapshot: &HostSnapshot) -> Result<()> {
        let _guard = self.write_guard().await;
        host_metric_snapshot::ActiveModel {
            id: Set(opsmon_common::id::next_id()),
            host_id: Set(snapshot.host_id.clone()),
            cpu_percent: Set(snapshot.cpu_percent.map(decimal_to_text)),
            memory_percent: Set(snapshot.memory_percent.map(decimal_to_text)),
            disk_percent: Set(snapshot.disk_percent.map(decimal_to_text)),
            load_avg: Set(snapshot.load_avg.map(decimal_to_text)),
            collected_at: Set(to_fixed(snapshot.collected_at)),
        }
        .insert(self.db())
        .await?;
        Ok(())
    }

    pub async fn insert_probe_result(&self, result: &ProbeResult) -> Result<()> {
        let _guard = self.write_guard().await;
        probe_result::ActiveModel {
            id: Set(opsmon_common::id::next_id()),
            probe_id: Set(result.probe_id.clone()),
            success: Set(result.success),
            response_time_ms: Set(result.response_time_ms.map(decimal_to_text)),
            status_code: Set(result.status_code),
            error: Set(result.error.clone()),
            checked_at: Set(to_fixed(result.checked_at)),
        }
        .insert(self.db())
        .await?;
        Ok(())
    }

    pub async fn latest_host_snapshot(&self, host_id: &str) -> Result<Option<HostSnapshot>> {
        let model = host_metric_snapshot::Entity::find()
            .filter(host_metric_snapshot::Column::HostId.eq(host_id))
            .order_by_desc(host_metric_snapshot::Column::CollectedAt)
            .order_by_desc(host_metric_snapshot::Column::Id)
            .one(self.db())
            .await?;
        Ok(model.map(to_snapshot).transpose()?)
    }

    pub async fn latest_probe_result(&self, probe_id: &str) -> Result<Option<ProbeResult>> {
        let model = probe_result::Entity::find()
            .filter(probe_result::Column::ProbeId.eq(probe_id))
            .order_by_desc(probe_result::Column::CheckedAt)
            .order_by_desc(probe_result::Column::Id)
            .one(self.db())
            .await?;
        Ok(model.map(to_probe_result).transpose()?)
    }

    /// Host and probe domains backed by this store.
    pub fn target_domains(self: &Arc<Self>, staleness_secs: u64) -> TargetDomains {
        let hosts = Arc::new(HostTargets::new(self.clone(), staleness_secs));
        let probes = Arc::new(ProbeTargets::new(self.clone(), staleness_secs));
        let mut domains = TargetDomains::new();
        domains.register(TargetDomain {
            kind: TargetKind::Host,
            resolver: hosts.clone(),
            samples: hosts,
            extractor: Arc::new(HostMetricExtractor),
        });
        domains.register(TargetDomain {
            kind: TargetKind::Probe,
            resolver: probes.clone(),
            samples: probes,
            extractor: Arc::new(ProbeMetricExtractor),
        });
        domains
    }
}

fn is_fresh(observed_at: chrono::DateTime<Utc>, staleness: Duration) -> bool {
    Utc::now() - observed_at <= staleness
}

/// Enabled hosts and their latest snapshot.
pub struct HostTargets {
    store: Arc<MonitorStore>,
    staleness: Duration,
}

impl HostTargets {
    pub fn new(store: Arc<MonitorStore>, staleness_secs: u64) -> Self {
        Self {
            store,
            staleness: types::seconds(staleness_secs),
        }
    }
}

#[async_trait]
impl TargetResolver for HostTargets {
    async fn list_targets(&self, tenant_id: &str) -> Result<Vec<Target>> {
        self.store.list_hosts(tenant_id).await
    }
}

#[async_trait]
impl SampleSource for HostTargets {
    async fn latest_sample(&self, target: &Target) -> Result<Option<Sample>> {
        let snapshot = self.store.latest_host_snapshot(&target.id).await?;
        Ok(snapshot
            .filter(|s| is_fresh(s.collected_at, self.staleness))
            .map(Sample::Host))
    }
}

/// Enabled network probes and their latest result.
pub struct ProbeTargets {
    store: Arc<MonitorStore>,
    staleness: Duration,
}

impl ProbeTargets {
    pub fn new(store: Arc<MonitorStore>, staleness_secs: u64) -> Self {
        Self {
            store,
            staleness: types::seconds(staleness_secs),
        }
    }
}

#[async_trait]
impl TargetResolver for ProbeTargets {
    async fn list_targets(&self, tenant_id: &str) -> Result<Vec<Target>> {
        self.store.list_probes(tenant_id).await
    }
}

#[async_trait]
impl SampleSource for ProbeTargets {
    async fn latest_sample(&self, target: &Target) -> Result<Option<Sample>> {
        let result = self.store.latest_probe_result(&target.id).await?;
        Ok(result
            .filter(|r| is_fresh(r.checked_at, self.staleness))
            .map(Sample::Probe))
    }
}
