use crate::error::NotifyError;
use crate::plugin::ChannelRegistry;
use async_trait::async_trait;
use chrono::Utc;
use opsmon_common::types::{
    AlertRule, AttemptStatus, Incident, NotificationAttempt, NotificationChannelConfig,
};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Read access to a tenant's configured channels.
#[async_trait]
pub trait ChannelSource: Send + Sync {
    async fn list_channels(&self, tenant_id: &str) -> anyhow::Result<Vec<NotificationChannelConfig>>;
}

/// Audit sink for delivery attempts.
#[async_trait]
pub trait AttemptLog: Send + Sync {
    async fn record_attempt(&self, attempt: &NotificationAttempt) -> anyhow::Result<()>;
}

/// Outcome of one [`Dispatcher::dispatch`] call.
#[derive(Debug, Clone, Default)]
pub struct DispatchReport {
    pub attempts: Vec<NotificationAttempt>,
    /// Channel ids that were not attempted (missing, disabled or foreign).
    pub skipped: Vec<String>,
}

impl DispatchReport {
    pub fn any_sent(&self) -> bool {
        self.attempts.iter().any(|a| a.status == AttemptStatus::Sent)
    }
}

/// Sends an incident to every channel of its rule, one attempt per channel.
pub struct Dispatcher {
    registry: Arc<ChannelRegistry>,
    channels: Arc<dyn ChannelSource>,
    attempts: Arc<dyn AttemptLog>,
    send_timeout: Duration,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<ChannelRegistry>,
        channels: Arc<dyn ChannelSource>,
        attempts: Arc<dyn AttemptLog>,
        send_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            channels,
            attempts,
            send_timeout,
        }
    }

    /// Delivers `incident` through the rule's channels in configured order.
    ///
    /// Missing, disabled or other-tenant channels are skipped with a warning.
    /// A failing channel is recorded as a `failed` attempt and never stops
    /// delivery to the others.
    pub async fn dispatch(&self, incident: &Incident, rule: &AlertRule) -> DispatchReport {
        let mut report = DispatchReport::default();
        if rule.channel_ids.is_empty() {
            return report;
        }

        let configured = match self.channels.list_channels(&rule.tenant_id).await {
            Ok(c) => c,
            Err(e) => {
                tracing::error!(
                    rule_id = %rule.id,
                    incident_id = %incident.id,
                    error = %e,
                    "Failed to load notification channels"
                );
                report.skipped = rule.channel_ids.clone();
                return report;
            }
        };

        let mut seen = Vec::with_capacity(rule.channel_ids.len());
        for channel_id in &rule.channel_ids {
            if seen.contains(&channel_id) {
                continue;
            }
            seen.push(channel_id);

            let Some(channel) = configured
                .iter()
                .find(|c| &c.id == channel_id && c.tenant_id == rule.tenant_id)
            else {
                tracing::warn!(rule_id = %rule.id, channel_id = %channel_id, "Notification channel not found, skipping");
                report.skipped.push(channel_id.clone());
                continue;
            };
            if !channel.enabled {
                tracing::warn!(rule_id = %rule.id, channel_id = %channel_id, "Notification channel disabled, skipping");
                report.skipped.push(channel_id.clone());
                continue;
            }

            let attempt = self.attempt(incident, channel).await;
            if let Err(e) = self.attempts.record_attempt(&attempt).await {
                tracing::error!(
                    incident_id = %incident.id,
                    channel_id = %channel.id,
                    error = %e,
                    "Failed to record notification attempt"
                );
            }
            report.attempts.push(attempt);
        }

        report
    }

    async fn attempt(&self, incident: &Incident, channel: &NotificationChannelConfig) -> NotificationAttempt {
        let started = Instant::now();
        let result = match self
            .registry
            .create_channel(&channel.channel_type, &channel.id, &channel.config)
        {
            Ok(instance) => match tokio::time::timeout(self.send_timeout, instance.send(incident)).await {
                Ok(sent) => sent,
                Err(_) => Err(NotifyError::Timeout(self.send_timeout.as_secs())),
            },
            Err(e) => Err(e),
        };

        let (status, detail) = match result {
            Ok(receipt) => {
                tracing::info!(
                    incident_id = %incident.id,
                    channel_id = %channel.id,
                    channel_type = %channel.channel_type,
                    "Notification sent"
                );
                (AttemptStatus::Sent, receipt.detail)
            }
            Err(e) => {
                tracing::warn!(
                    incident_id = %incident.id,
                    channel_id = %channel.id,
                    channel_type = %channel.channel_type,
                    error = %e,
                    "Notification failed"
                );
                (AttemptStatus::Failed, Some(crate::utils::truncate_string(
                    &e.to_string(),
                    crate::utils::MAX_BODY_LENGTH,
                )))
            }
        };

        NotificationAttempt {
            id: opsmon_common::id::next_id(),
            tenant_id: incident.tenant_id.clone(),
            incident_id: incident.id.clone(),
            rule_id: incident.rule_id.clone(),
            channel_id: channel.id.clone(),
            channel_name: channel.name.clone(),
            channel_type: channel.channel_type.clone(),
            status,
            detail,
            duration_ms: started.elapsed().as_millis() as i64,
            created_at: Utc::now(),
        }
    }
}
