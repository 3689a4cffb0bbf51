//! Pluggable seams that let one evaluation pipeline serve both hosts and
//! network probes.

use crate::condition::MetricKind;
use async_trait::async_trait;
use opsmon_common::types::{AlertRule, Sample, Target, TargetKind};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;

/// Enumerates the monitored targets of one kind.
#[async_trait]
pub trait TargetResolver: Send + Sync {
    /// Every enabled target of the tenant.
    async fn list_targets(&self, tenant_id: &str) -> anyhow::Result<Vec<Target>>;

    /// Targets a rule applies to.
    async fn targets_for_rule(&self, rule: &AlertRule) -> anyhow::Result<Vec<Target>> {
        let targets = self.list_targets(&rule.tenant_id).await?;
        Ok(targets
            .into_iter()
            .filter(|t| selector_matches(rule, t))
            .collect())
    }
}

/// Supplies the latest sample for a target.
///
/// `None` means no recent data: either nothing was ever collected or the
/// newest sample is older than the source's staleness window.
#[async_trait]
pub trait SampleSource: Send + Sync {
    async fn latest_sample(&self, target: &Target) -> anyhow::Result<Option<Sample>>;
}

/// Maps a condition type to the reading it watches on a sample.
pub trait MetricExtractor: Send + Sync {
    fn extract(&self, metric: MetricKind, sample: &Sample) -> Option<Decimal>;
}

pub struct HostMetricExtractor;

impl MetricExtractor for HostMetricExtractor {
    fn extract(&self, metric: MetricKind, sample: &Sample) -> Option<Decimal> {
        let Sample::Host(snapshot) = sample else {
            return None;
        };
        match metric {
            MetricKind::Cpu => snapshot.cpu_percent,
            MetricKind::Memory => snapshot.memory_percent,
            MetricKind::Disk => snapshot.disk_percent,
            MetricKind::Load => snapshot.load_avg,
            _ => None,
        }
    }
}

pub struct ProbeMetricExtractor;

impl MetricExtractor for ProbeMetricExtractor {
    fn extract(&self, metric: MetricKind, sample: &Sample) -> Option<Decimal> {
        let Sample::Probe(result) = sample else {
            return None;
        };
        match metric {
            MetricKind::ResponseTime => result.response_time_ms,
            MetricKind::StatusCode => result.status_code.map(Decimal::from),
            MetricKind::Availability => Some(if result.success {
                Decimal::ONE
            } else {
                Decimal::ZERO
            }),
            _ => None,
        }
    }
}

/// Resolver, sample source and extractor for one target kind.
#[derive(Clone)]
pub struct TargetDomain {
    pub kind: TargetKind,
    pub resolver: Arc<dyn TargetResolver>,
    pub samples: Arc<dyn SampleSource>,
    pub extractor: Arc<dyn MetricExtractor>,
}

/// Target domains keyed by kind.
#[derive(Clone, Default)]
pub struct TargetDomains {
    domains: HashMap<TargetKind, TargetDomain>,
}

impl TargetDomains {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, domain: TargetDomain) {
        self.domains.insert(domain.kind, domain);
    }

    pub fn get(&self, kind: TargetKind) -> Option<&TargetDomain> {
        self.domains.get(&kind)
    }
}

/// Whether `target` is selected by the rule: same tenant and kind, and either
/// no selector, an exact id match, or a name glob match.
pub fn selector_matches(rule: &AlertRule, target: &Target) -> bool {
    if target.tenant_id != rule.tenant_id || target.kind != rule.target_kind {
        return false;
    }
    if rule.selects_all_targets() {
        return true;
    }
    let selector = rule.target_selector.as_deref().unwrap_or_default().trim();
    selector == target.id || glob_match::glob_match(selector, &target.name)
}
