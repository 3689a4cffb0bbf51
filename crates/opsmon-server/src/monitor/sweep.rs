//! One evaluation pass over a tenant's rules.

use anyhow::Result;
use chrono::{DateTime, Utc};
use opsmon_alert::error::AlertError;
use opsmon_alert::evaluator::{describe_breach, evaluate};
use opsmon_alert::hysteresis::HysteresisTracker;
use opsmon_alert::incident::IncidentManager;
use opsmon_alert::source::RuleSource;
use opsmon_alert::target::{TargetDomain, TargetDomains};
use opsmon_common::types::{AlertRule, Incident, Sample, Target, TargetKind};
use opsmon_notify::dispatcher::Dispatcher;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Latest samples fetched during one sweep, so targets shared by several
/// rules are read once.
#[derive(Default)]
pub struct SampleCache {
    samples: HashMap<(TargetKind, String), Option<Sample>>,
}

impl SampleCache {
    async fn latest(&mut self, domain: &TargetDomain, target: &Target) -> Result<Option<Sample>> {
        let key = (target.kind, target.id.clone());
        if let Some(cached) = self.samples.get(&key) {
            return Ok(cached.clone());
        }
        let sample = domain.samples.latest_sample(target).await?;
        self.samples.insert(key, sample.clone());
        Ok(sample)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepStats {
    pub rules: usize,
    pub failed_rules: usize,
    pub fired: usize,
    pub resolved: usize,
    /// The sweep stopped early on cancellation.
    pub cancelled: bool,
}

/// Outcome of evaluating one rule against all of its targets.
#[derive(Debug, Clone, Default)]
pub struct RuleOutcome {
    /// Incidents opened or refreshed by this evaluation.
    pub triggered: Vec<Incident>,
    pub resolved: usize,
}

enum TargetOutcome {
    Fired(Incident),
    Resolved,
    Unchanged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ManualStatus {
    Ok,
    Disabled,
}

/// Result of a manual single-rule evaluation.
#[derive(Debug, Clone, Serialize)]
pub struct ManualEvaluation {
    pub status: ManualStatus,
    pub triggered_incidents: Vec<Incident>,
}

/// Everything a sweep needs: rule configuration, target domains and the
/// shared hysteresis, incident and dispatch services.
#[derive(Clone)]
pub struct MonitorEngine {
    rules: Arc<dyn RuleSource>,
    domains: Arc<TargetDomains>,
    hysteresis: Arc<HysteresisTracker>,
    incidents: IncidentManager,
    dispatcher: Arc<Dispatcher>,
}

impl MonitorEngine {
    pub fn new(
        rules: Arc<dyn RuleSource>,
        domains: Arc<TargetDomains>,
        hysteresis: Arc<HysteresisTracker>,
        incidents: IncidentManager,
        dispatcher: Arc<Dispatcher>,
    ) -> Self {
        Self {
            rules,
            domains,
            hysteresis,
            incidents,
            dispatcher,
        }
    }

    pub fn rules(&self) -> &Arc<dyn RuleSource> {
        &self.rules
    }

    pub fn hysteresis(&self) -> &Arc<HysteresisTracker> {
        &self.hysteresis
    }

    pub fn incidents(&self) -> &IncidentManager {
        &self.incidents
    }

    /// Evaluates every enabled rule of the tenant. A failing rule is logged
    /// and skipped; cancellation is checked before each rule.
    pub async fn sweep_tenant(&self, tenant_id: &str, cancel: &CancellationToken) -> Result<SweepStats> {
        let rules = self.rules.list_enabled_rules(tenant_id).await?;
        let mut stats = SweepStats::default();
        let mut samples = SampleCache::default();

        for rule in &rules {
            if cancel.is_cancelled() {
                stats.cancelled = true;
                break;
            }
            stats.rules += 1;
            match self.evaluate_rule(rule, &mut samples).await {
                Ok(outcome) => {
                    stats.fired += outcome.triggered.len();
                    stats.resolved += outcome.resolved;
                }
                Err(e) => {
                    stats.failed_rules += 1;
                    tracing::warn!(
                        tenant_id = %tenant_id,
                        rule_id = %rule.id,
                        error = %e,
                        "Rule evaluation failed"
                    );
                }
            }
        }

        tracing::debug!(
            tenant_id = %tenant_id,
            rules = stats.rules,
            failed = stats.failed_rules,
            fired = stats.fired,
            resolved = stats.resolved,
            "Sweep finished"
        );
        Ok(stats)
    }

    /// Runs one rule outside the sweep cadence through the same pipeline.
    pub async fn evaluate_rule_once(&self, rule_id: &str) -> Result<ManualEvaluation, AlertError> {
        let rule = self
            .rules
            .get_rule(rule_id)
            .await
            .map_err(|e| AlertError::storage(format!("{e:#}")))?
            .ok_or_else(|| AlertError::RuleNotFound(rule_id.to_string()))?;

        if !rule.enabled {
            return Ok(ManualEvaluation {
                status: ManualStatus::Disabled,
                triggered_incidents: Vec::new(),
            });
        }

        let outcome = self
            .evaluate_rule(&rule, &mut SampleCache::default())
            .await
            .map_err(|e| AlertError::storage(format!("{e:#}")))?;
        Ok(ManualEvaluation {
            status: ManualStatus::Ok,
            triggered_incidents: outcome.triggered,
        })
    }

    pub async fn evaluate_rule(&self, rule: &AlertRule, samples: &mut SampleCache) -> Result<RuleOutcome> {
        let mut outcome = RuleOutcome::default();
        let Some(domain) = self.domains.get(rule.target_kind) else {
            tracing::warn!(rule_id = %rule.id, kind = %rule.target_kind, "No target domain registered");
            return Ok(outcome);
        };

        let targets = domain.resolver.targets_for_rule(rule).await?;
        let now = Utc::now();

        for target in &targets {
            match self.evaluate_target(rule, domain, target, samples, now).await {
                Ok(TargetOutcome::Fired(incident)) => outcome.triggered.push(incident),
                Ok(TargetOutcome::Resolved) => outcome.resolved += 1,
                Ok(TargetOutcome::Unchanged) => {}
                Err(e) => tracing::warn!(
                    rule_id = %rule.id,
                    target_id = %target.id,
                    error = %e,
                    "Target evaluation failed"
                ),
            }
        }

        let live: Vec<&str> = targets.iter().map(|t| t.id.as_str()).collect();
        outcome.resolved += self.incidents.resolve_vanished(&rule.id, &live, now).await?.len();
        Ok(outcome)
    }

    async fn evaluate_target(
        &self,
        rule: &AlertRule,
        domain: &TargetDomain,
        target: &Target,
        samples: &mut SampleCache,
        now: DateTime<Utc>,
    ) -> Result<TargetOutcome> {
        let Some(sample) = samples.latest(domain, target).await? else {
            self.hysteresis.clear(&rule.id, &target.id);
            return self.resolve_open(rule, target, now).await;
        };

        let evaluation = evaluate(rule, &sample, domain.extractor.as_ref());
        if !evaluation.triggered {
            self.hysteresis.clear(&rule.id, &target.id);
            if evaluation.is_clear() {
                return self.resolve_open(rule, target, now).await;
            }
            return Ok(TargetOutcome::Unchanged);
        }

        if !self.hysteresis.should_fire_at(rule, &target.id, true, now) {
            return Ok(TargetOutcome::Unchanged);
        }

        let message = describe_breach(rule, &target.name, evaluation.observed);
        let firing = self
            .incidents
            .open_or_refresh(rule, target, evaluation.observed, message, now)
            .await?;
        let mut incident = firing.incident;

        if firing.notify {
            let report = self.dispatcher.dispatch(&incident, rule).await;
            if report.any_sent() {
                let notified_at = Utc::now();
                self.incidents.mark_notified(&incident.id, notified_at).await?;
                incident.last_notified_at = Some(notified_at);
            } else if !report.attempts.is_empty() {
                tracing::warn!(
                    incident_id = %incident.id,
                    rule_id = %rule.id,
                    attempts = report.attempts.len(),
                    "Every notification attempt failed"
                );
            }
        }
        Ok(TargetOutcome::Fired(incident))
    }

    async fn resolve_open(&self, rule: &AlertRule, target: &Target, now: DateTime<Utc>) -> Result<TargetOutcome> {
        Ok(match self.incidents.auto_resolve(&rule.id, &target.id, now).await? {
            Some(_) => TargetOutcome::Resolved,
            None => TargetOutcome::Unchanged,
        })
    }
}
