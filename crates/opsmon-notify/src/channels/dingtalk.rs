use crate::error::{NotifyError, Result};
use crate::plugin::ChannelPlugin;
use crate::utils::{format_observed, incident_title, truncate_string, MAX_BODY_LENGTH};
use crate::{NotificationChannel, SendReceipt};
use async_trait::async_trait;
use base64::Engine;
use hmac::{Hmac, Mac};
use opsmon_common::types::Incident;
use serde::Deserialize;
use serde_json::Value;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// DingTalk custom robot.
pub struct DingTalkChannel {
    instance_id: String,
    client: reqwest::Client,
    webhook_url: String,
    secret: Option<String>,
}

impl DingTalkChannel {
    pub fn new(instance_id: &str, webhook_url: &str, secret: Option<String>) -> Self {
        Self {
            instance_id: instance_id.to_string(),
            client: reqwest::Client::new(),
            webhook_url: webhook_url.to_string(),
            secret,
        }
    }

    /// Appends `timestamp` and `sign` when a signing secret is configured.
    pub fn sign_url(&self, timestamp_ms: i64) -> Result<String> {
        let Some(secret) = &self.secret else {
            return Ok(self.webhook_url.clone());
        };
        let string_to_sign = format!("{timestamp_ms}\n{secret}");
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|e| NotifyError::InvalidConfig(format!("dingtalk secret: {e}")))?;
        mac.update(string_to_sign.as_bytes());
        let sign = base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes());
        let separator = if self.webhook_url.contains('?') { '&' } else { '?' };
        Ok(format!(
            "{}{}timestamp={}&sign={}",
            self.webhook_url,
            separator,
            timestamp_ms,
            urlencoding::encode(&sign)
        ))
    }

    fn format_markdown(incident: &Incident) -> (String, String) {
        let title = incident_title(incident);
        let text = format!(
            "### {title}\n\n\
             - **Severity**: {severity}\n\
             - **Target**: {target}\n\
             - **Metric**: {metric}\n\
             - **Observed**: {observed}\n\
             - **Threshold**: {threshold}\n\
             - **Time**: {time}\n\n\
             > {message}",
            severity = incident.severity,
            target = incident.target_name,
            metric = incident.metric,
            observed = format_observed(incident),
            threshold = incident.threshold_value.normalize(),
            time = incident.last_triggered_at.to_rfc3339(),
            message = incident.message,
        );
        (title, text)
    }
}

#[async_trait]
impl NotificationChannel for DingTalkChannel {
    async fn send(&self, incident: &Incident) -> Result<SendReceipt> {
        let (title, text) = Self::format_markdown(incident);
        let payload = serde_json::json!({
            "msgtype": "markdown",
            "markdown": { "title": title, "text": text },
        });

        let url = self.sign_url(chrono::Utc::now().timestamp_millis())?;
        let resp = self.client.post(&url).json(&payload).send().await?;
        let status = resp.status();
        let body = resp.text().await?;
        let body = truncate_string(&body, MAX_BODY_LENGTH);

        if !status.is_success() {
            return Err(NotifyError::ApiError {
                service: "dingtalk".into(),
                status: status.as_u16(),
                body,
            });
        }

        let parsed: Value = serde_json::from_str(&body)?;
        if parsed.get("errcode").and_then(Value::as_i64) != Some(0) {
            tracing::warn!(
                channel_id = %self.instance_id,
                response = %body,
                "DingTalk API rejected message"
            );
            return Err(NotifyError::ApiError {
                service: "dingtalk".into(),
                status: status.as_u16(),
                body,
            });
        }

        Ok(SendReceipt { detail: Some(body) })
    }

    fn channel_type(&self) -> &str {
        "dingtalk"
    }

    fn instance_id(&self) -> &str {
        &self.instance_id
    }
}

// Plugin

#[derive(Deserialize)]
struct DingTalkConfig {
    webhook_url: String,
    secret: Option<String>,
}

pub struct DingTalkPlugin;

impl DingTalkPlugin {
    fn parse(config: &Value) -> Result<DingTalkConfig> {
        let cfg: DingTalkConfig = serde_json::from_value(config.clone())
            .map_err(|e| NotifyError::InvalidConfig(format!("dingtalk: {e}")))?;
        if !cfg.webhook_url.starts_with("http://") && !cfg.webhook_url.starts_with("https://") {
            return Err(NotifyError::InvalidConfig(
                "dingtalk: webhook_url must be an http(s) URL".into(),
            ));
        }
        Ok(cfg)
    }
}

impl ChannelPlugin for DingTalkPlugin {
    fn name(&self) -> &str {
        "dingtalk"
    }

    fn validate_config(&self, config: &Value) -> Result<()> {
        Self::parse(config).map(|_| ())
    }

    fn create_channel(&self, instance_id: &str, config: &Value) -> Result<Box<dyn NotificationChannel>> {
        let cfg = Self::parse(config)?;
        Ok(Box::new(DingTalkChannel::new(
            instance_id,
            &cfg.webhook_url,
            cfg.secret.filter(|s| !s.is_empty()),
        )))
    }
}
