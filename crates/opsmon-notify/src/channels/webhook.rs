use crate::error::{NotifyError, Result};
use crate::plugin::ChannelPlugin;
use crate::utils::{format_observed, truncate_string, MAX_BODY_LENGTH};
use crate::{NotificationChannel, SendReceipt};
use async_trait::async_trait;
use opsmon_common::types::Incident;
use serde::Deserialize;
use serde_json::Value;

/// Generic JSON webhook. Success is any 2xx answer.
pub struct WebhookChannel {
    instance_id: String,
    client: reqwest::Client,
    url: String,
    body_template: Option<String>,
}

impl WebhookChannel {
    pub fn new(instance_id: &str, url: &str, body_template: Option<String>) -> Self {
        Self {
            instance_id: instance_id.to_string(),
            client: reqwest::Client::new(),
            url: url.to_string(),
            body_template,
        }
    }

    pub fn render_body(&self, incident: &Incident) -> String {
        match &self.body_template {
            Some(template) => template
                .replace("{{incident_id}}", &incident.id)
                .replace("{{rule_name}}", &incident.rule_name)
                .replace("{{target}}", &incident.target_name)
                .replace("{{metric}}", &incident.metric)
                .replace("{{value}}", &format_observed(incident))
                .replace("{{threshold}}", &incident.threshold_value.normalize().to_string())
                .replace("{{severity}}", &incident.severity.to_string())
                .replace("{{message}}", &incident.message),
            None => serde_json::json!({
                "incident_id": incident.id,
                "tenant_id": incident.tenant_id,
                "rule_id": incident.rule_id,
                "rule_name": incident.rule_name,
                "target_id": incident.target_id,
                "target_name": incident.target_name,
                "target_kind": incident.target_kind,
                "metric": incident.metric,
                "severity": incident.severity,
                "status": incident.status,
                "observed_value": incident.observed_value.map(|v| v.normalize().to_string()),
                "threshold_value": incident.threshold_value.normalize().to_string(),
                "message": incident.message,
                "first_triggered_at": incident.first_triggered_at.to_rfc3339(),
                "last_triggered_at": incident.last_triggered_at.to_rfc3339(),
            })
            .to_string(),
        }
    }
}

#[async_trait]
impl NotificationChannel for WebhookChannel {
    async fn send(&self, incident: &Incident) -> Result<SendReceipt> {
        let resp = self
            .client
            .post(&self.url)
            .header("Content-Type", "application/json")
            .body(self.render_body(incident))
            .send()
            .await?;

        let status = resp.status();
        let body = match resp.text().await {
            Ok(text) => truncate_string(&text, MAX_BODY_LENGTH),
            Err(e) => format!("[failed to read response body: {e}]"),
        };

        if !status.is_success() {
            return Err(NotifyError::ApiError {
                service: "webhook".into(),
                status: status.as_u16(),
                body,
            });
        }
        Ok(SendReceipt {
            detail: Some(format!("HTTP {}", status.as_u16())),
        })
    }

    fn channel_type(&self) -> &str {
        "webhook"
    }

    fn instance_id(&self) -> &str {
        &self.instance_id
    }
}

// Plugin

#[derive(Deserialize)]
struct WebhookConfig {
    url: String,
    body_template: Option<String>,
}

pub struct WebhookPlugin;

impl WebhookPlugin {
    fn parse(config: &Value) -> Result<WebhookConfig> {
        let cfg: WebhookConfig = serde_json::from_value(config.clone())
            .map_err(|e| NotifyError::InvalidConfig(format!("webhook: {e}")))?;
        if !cfg.url.starts_with("http://") && !cfg.url.starts_with("https://") {
            return Err(NotifyError::InvalidConfig(
                "webhook: url must be an http(s) URL".into(),
            ));
        }
        Ok(cfg)
    }
}

impl ChannelPlugin for WebhookPlugin {
    fn name(&self) -> &str {
        "webhook"
    }

    fn validate_config(&self, config: &Value) -> Result<()> {
        Self::parse(config).map(|_| ())
    }

    fn create_channel(&self, instance_id: &str, config: &Value) -> Result<Box<dyn NotificationChannel>> {
        let cfg = Self::parse(config)?;
        Ok(Box::new(WebhookChannel::new(instance_id, &cfg.url, cfg.body_template)))
    }
}
