use crate::error::{AlertError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use opsmon_common::types::{AlertRule, Incident, IncidentDraft, IncidentStatus, Target, Transition};
use rust_decimal::Decimal;
use std::sync::Arc;

/// Result of [`IncidentStore::open_or_refresh`].
#[derive(Debug, Clone, PartialEq)]
pub enum OpenOutcome {
    /// No open incident existed for the (rule, target) pair; a new one was created.
    Opened(Incident),
    /// The existing open incident was updated in place.
    Refreshed(Incident),
}

impl OpenOutcome {
    pub fn incident(&self) -> &Incident {
        match self {
            OpenOutcome::Opened(i) | OpenOutcome::Refreshed(i) => i,
        }
    }

    pub fn into_incident(self) -> Incident {
        match self {
            OpenOutcome::Opened(i) | OpenOutcome::Refreshed(i) => i,
        }
    }

    pub fn is_new(&self) -> bool {
        matches!(self, OpenOutcome::Opened(_))
    }
}

/// Persistence for incidents.
///
/// Implementations must make `open_or_refresh` and `transition` atomic: the
/// lookup of the open incident and the write that follows cannot interleave
/// with another call for the same (rule, target).
#[async_trait]
pub trait IncidentStore: Send + Sync {
    async fn open_or_refresh(&self, draft: &IncidentDraft, now: DateTime<Utc>) -> Result<OpenOutcome>;

    async fn get(&self, incident_id: &str) -> Result<Option<Incident>>;

    async fn find_open(&self, rule_id: &str, target_id: &str) -> Result<Option<Incident>>;

    async fn list_open_for_rule(&self, rule_id: &str) -> Result<Vec<Incident>>;

    async fn transition(
        &self,
        incident_id: &str,
        transition: &Transition,
        now: DateTime<Utc>,
    ) -> Result<Incident>;

    async fn mark_notified(&self, incident_id: &str, now: DateTime<Utc>) -> Result<()>;
}

/// A confirmed breach after it reached the store.
#[derive(Debug, Clone)]
pub struct Firing {
    pub incident: Incident,
    pub opened: bool,
    /// Whether the caller should dispatch notifications now.
    pub notify: bool,
}

/// Incident lifecycle operations shared by the sweep and the control API.
#[derive(Clone)]
pub struct IncidentManager {
    store: Arc<dyn IncidentStore>,
}

impl IncidentManager {
    pub fn new(store: Arc<dyn IncidentStore>) -> Self {
        Self { store }
    }

    /// Opens a new incident or refreshes the open one, and decides whether
    /// this firing notifies.
    ///
    /// New incidents always notify. A refreshed incident notifies again only
    /// while it is still `active` and the rule's silence period has elapsed
    /// since the last accepted notification.
    pub async fn open_or_refresh(
        &self,
        rule: &AlertRule,
        target: &Target,
        observed: Option<Decimal>,
        message: String,
        now: DateTime<Utc>,
    ) -> Result<Firing> {
        let draft = draft_for(rule, target, observed, message);
        let outcome = self.store.open_or_refresh(&draft, now).await?;
        let opened = outcome.is_new();
        let incident = outcome.into_incident();

        let notify = opened
            || (incident.status == IncidentStatus::Active
                && incident.silence_elapsed(rule.silence_secs, now));

        if opened {
            tracing::info!(
                incident_id = %incident.id,
                rule_id = %rule.id,
                target_id = %target.id,
                "Incident opened"
            );
        } else if !notify {
            tracing::debug!(
                incident_id = %incident.id,
                rule_id = %rule.id,
                "Incident refreshed within silence period"
            );
        }

        Ok(Firing {
            incident,
            opened,
            notify,
        })
    }

    pub async fn mark_notified(&self, incident_id: &str, now: DateTime<Utc>) -> Result<()> {
        self.store.mark_notified(incident_id, now).await
    }

    pub async fn get(&self, incident_id: &str) -> Result<Incident> {
        self.store
            .get(incident_id)
            .await?
            .ok_or_else(|| AlertError::IncidentNotFound(incident_id.to_string()))
    }

    pub async fn acknowledge(&self, incident_id: &str, user_id: &str) -> Result<Incident> {
        let transition = Transition::Acknowledge {
            user_id: user_id.to_string(),
        };
        self.store.transition(incident_id, &transition, Utc::now()).await
    }

    pub async fn ignore(&self, incident_id: &str) -> Result<Incident> {
        self.store
            .transition(incident_id, &Transition::Ignore, Utc::now())
            .await
    }

    pub async fn resolve(&self, incident_id: &str) -> Result<Incident> {
        self.store
            .transition(incident_id, &Transition::Resolve, Utc::now())
            .await
    }

    /// Resolves the open incident for (rule, target) if there is one.
    pub async fn auto_resolve(
        &self,
        rule_id: &str,
        target_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Incident>> {
        let Some(open) = self.store.find_open(rule_id, target_id).await? else {
            return Ok(None);
        };
        self.close(open, now).await
    }

    /// Resolves every open incident of the rule whose target is not in `live_targets`.
    pub async fn resolve_vanished(
        &self,
        rule_id: &str,
        live_targets: &[&str],
        now: DateTime<Utc>,
    ) -> Result<Vec<Incident>> {
        let mut resolved = Vec::new();
        for open in self.store.list_open_for_rule(rule_id).await? {
            if live_targets.contains(&open.target_id.as_str()) {
                continue;
            }
            if let Some(incident) = self.close(open, now).await? {
                resolved.push(incident);
            }
        }
        Ok(resolved)
    }

    async fn close(&self, open: Incident, now: DateTime<Utc>) -> Result<Option<Incident>> {
        match self.store.transition(&open.id, &Transition::Resolve, now).await {
            Ok(incident) => {
                tracing::info!(
                    incident_id = %incident.id,
                    rule_id = %incident.rule_id,
                    target_id = %incident.target_id,
                    "Incident auto-resolved"
                );
                Ok(Some(incident))
            }
            // closed concurrently by an operator
            Err(AlertError::IllegalTransition(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

pub fn draft_for(
    rule: &AlertRule,
    target: &Target,
    observed: Option<Decimal>,
    message: String,
) -> IncidentDraft {
    IncidentDraft {
        tenant_id: rule.tenant_id.clone(),
        rule_id: rule.id.clone(),
        rule_name: rule.name.clone(),
        target_id: target.id.clone(),
        target_name: target.name.clone(),
        target_kind: target.kind,
        metric: rule.metric.clone(),
        severity: rule.severity,
        observed_value: observed,
        threshold_value: rule.threshold,
        message,
    }
}
