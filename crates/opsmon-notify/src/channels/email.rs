use crate::error::{NotifyError, Result};
use crate::plugin::ChannelPlugin;
use crate::utils::{format_observed, incident_title, truncate_string, MAX_BODY_LENGTH};
use crate::{NotificationChannel, SendReceipt};
use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use opsmon_common::types::Incident;
use serde::Deserialize;
use serde_json::Value;

pub struct EmailChannel {
    instance_id: String,
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    to: Vec<Mailbox>,
}

impl EmailChannel {
    pub fn new(instance_id: &str, cfg: &EmailConfig) -> Result<Self> {
        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::relay(&cfg.smtp_host)
            .map_err(|e| NotifyError::SmtpError(e.to_string()))?
            .port(cfg.smtp_port);
        if let (Some(user), Some(pass)) = (&cfg.smtp_username, &cfg.smtp_password) {
            builder = builder.credentials(Credentials::new(user.clone(), pass.clone()));
        }

        Ok(Self {
            instance_id: instance_id.to_string(),
            transport: builder.build(),
            from: parse_mailbox(&cfg.from)?,
            to: cfg
                .to
                .iter()
                .map(|addr| parse_mailbox(addr))
                .collect::<Result<_>>()?,
        })
    }

    fn format_body(incident: &Incident) -> String {
        format!(
            "Rule: {rule}\nSeverity: {severity}\nTarget: {target} ({kind})\nMetric: {metric}\nObserved: {observed}\nThreshold: {threshold}\nFirst triggered: {first}\nLast triggered: {last}\n\n{message}",
            rule = incident.rule_name,
            severity = incident.severity,
            target = incident.target_name,
            kind = incident.target_kind,
            metric = incident.metric,
            observed = format_observed(incident),
            threshold = incident.threshold_value.normalize(),
            first = incident.first_triggered_at.to_rfc3339(),
            last = incident.last_triggered_at.to_rfc3339(),
            message = incident.message,
        )
    }
}

fn parse_mailbox(addr: &str) -> Result<Mailbox> {
    addr.parse()
        .map_err(|e| NotifyError::InvalidConfig(format!("bad address '{addr}': {e}")))
}

#[async_trait]
impl NotificationChannel for EmailChannel {
    async fn send(&self, incident: &Incident) -> Result<SendReceipt> {
        let mut builder = Message::builder()
            .from(self.from.clone())
            .subject(incident_title(incident))
            .header(ContentType::TEXT_PLAIN);
        for to in &self.to {
            builder = builder.to(to.clone());
        }
        let email = builder
            .body(Self::format_body(incident))
            .map_err(|e| NotifyError::SmtpError(e.to_string()))?;

        let response = self
            .transport
            .send(email)
            .await
            .map_err(|e| NotifyError::SmtpError(e.to_string()))?;

        let detail = response
            .message()
            .map(|line| line.to_string())
            .collect::<Vec<_>>()
            .join(" ");
        Ok(SendReceipt {
            detail: Some(truncate_string(
                &format!("{} {}", response.code(), detail),
                MAX_BODY_LENGTH,
            )),
        })
    }

    fn channel_type(&self) -> &str {
        "email"
    }

    fn instance_id(&self) -> &str {
        &self.instance_id
    }
}

// Plugin

#[derive(Debug, Deserialize)]
pub struct EmailConfig {
    pub smtp_host: String,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    pub smtp_username: Option<String>,
    pub smtp_password: Option<String>,
    pub from: String,
    pub to: Vec<String>,
}

fn default_smtp_port() -> u16 {
    587
}

pub struct EmailPlugin;

impl EmailPlugin {
    fn parse(config: &Value) -> Result<EmailConfig> {
        let cfg: EmailConfig = serde_json::from_value(config.clone())
            .map_err(|e| NotifyError::InvalidConfig(format!("email: {e}")))?;
        if cfg.to.is_empty() {
            return Err(NotifyError::InvalidConfig(
                "email: at least one recipient is required".into(),
            ));
        }
        Ok(cfg)
    }
}

impl ChannelPlugin for EmailPlugin {
    fn name(&self) -> &str {
        "email"
    }

    fn validate_config(&self, config: &Value) -> Result<()> {
        let cfg = Self::parse(config)?;
        parse_mailbox(&cfg.from)?;
        for addr in &cfg.to {
            parse_mailbox(addr)?;
        }
        Ok(())
    }

    fn create_channel(&self, instance_id: &str, config: &Value) -> Result<Box<dyn NotificationChannel>> {
        let cfg = Self::parse(config)?;
        Ok(Box::new(EmailChannel::new(instance_id, &cfg)?))
    }
}
