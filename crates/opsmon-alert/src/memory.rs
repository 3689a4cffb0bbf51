use crate::error::{AlertError, Result};
use crate::incident::{IncidentStore, OpenOutcome};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use opsmon_common::types::{Incident, IncidentDraft, Transition};
use std::sync::Mutex;

/// In-process incident store. Every operation holds one lock for its whole
/// read-decide-write, which gives the same atomicity as a database transaction.
#[derive(Default)]
pub struct MemoryIncidentStore {
    incidents: Mutex<Vec<Incident>>,
}

impl MemoryIncidentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all(&self) -> Vec<Incident> {
        self.incidents
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }
}

#[async_trait]
impl IncidentStore for MemoryIncidentStore {
    async fn open_or_refresh(&self, draft: &IncidentDraft, now: DateTime<Utc>) -> Result<OpenOutcome> {
        let mut incidents = self.incidents.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(open) = incidents
            .iter_mut()
            .find(|i| i.is_open() && i.rule_id == draft.rule_id && i.target_id == draft.target_id)
        {
            open.refresh(draft, now);
            return Ok(OpenOutcome::Refreshed(open.clone()));
        }
        let incident = Incident::open(opsmon_common::id::next_id(), draft, now);
        incidents.push(incident.clone());
        Ok(OpenOutcome::Opened(incident))
    }

    async fn get(&self, incident_id: &str) -> Result<Option<Incident>> {
        let incidents = self.incidents.lock().unwrap_or_else(|p| p.into_inner());
        Ok(incidents.iter().find(|i| i.id == incident_id).cloned())
    }

    async fn find_open(&self, rule_id: &str, target_id: &str) -> Result<Option<Incident>> {
        let incidents = self.incidents.lock().unwrap_or_else(|p| p.into_inner());
        Ok(incidents
            .iter()
            .find(|i| i.is_open() && i.rule_id == rule_id && i.target_id == target_id)
            .cloned())
    }

    async fn list_open_for_rule(&self, rule_id: &str) -> Result<Vec<Incident>> {
        let incidents = self.incidents.lock().unwrap_or_else(|p| p.into_inner());
        Ok(incidents
            .iter()
            .filter(|i| i.is_open() && i.rule_id == rule_id)
            .cloned()
            .collect())
    }

    async fn transition(
        &self,
        incident_id: &str,
        transition: &Transition,
        now: DateTime<Utc>,
    ) -> Result<Incident> {
        let mut incidents = self.incidents.lock().unwrap_or_else(|p| p.into_inner());
        let incident = incidents
            .iter_mut()
            .find(|i| i.id == incident_id)
            .ok_or_else(|| AlertError::IncidentNotFound(incident_id.to_string()))?;
        incident.apply(transition, now)?;
        Ok(incident.clone())
    }

    async fn mark_notified(&self, incident_id: &str, now: DateTime<Utc>) -> Result<()> {
        let mut incidents = self.incidents.lock().unwrap_or_else(|p| p.into_inner());
        let incident = incidents
            .iter_mut()
            .find(|i| i.id == incident_id)
            .ok_or_else(|| AlertError::IncidentNotFound(incident_id.to_string()))?;
        incident.last_notified_at = Some(now);
        incident.updated_at = now;
        Ok(())
    }
}
