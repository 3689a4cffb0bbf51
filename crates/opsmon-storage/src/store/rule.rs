use anyhow::Result;
use async_trait::async_trait;
use opsmon_alert::source::RuleSource;
use opsmon_common::types::AlertRule;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect,
};

use super::{decimal_to_text, now_fixed, parse_decimal, parse_enum, MonitorStore};
use crate::entities::alert_rule::{self, Column, Entity};
use crate::error::StorageError;

fn to_rule(m: alert_rule::Model) -> Result<AlertRule, StorageError> {
    Ok(AlertRule {
        threshold: parse_decimal("threshold", &m.threshold)?,
        target_kind: parse_enum("target_kind", &m.target_kind)?,
        severity: parse_enum("severity", &m.severity)?,
        channel_ids: serde_json::from_str(&m.channel_ids)?,
        silence_secs: m.silence_secs.max(0) as u64,
        id: m.id,
        tenant_id: m.tenant_id,
        name: m.name,
        target_selector: m.target_selector,
        metric: m.metric,
        operator: m.operator,
        consecutive_failures: m.consecutive_failures,
        enabled: m.enabled,
    })
}

impl MonitorStore {
    /// Inserts the rule, or overwrites the stored rule with the same id.
    pub async fn save_rule(&self, rule: &AlertRule) -> Result<AlertRule> {
        let _guard = self.write_guard().await;
        let now = now_fixed();
        let channel_ids = serde_json::to_string(&rule.channel_ids)?;
        let existing = Entity::find_by_id(rule.id.as_str()).one(self.db()).await?;

        let model = match existing {
            Some(m) => {
                let mut am: alert_rule::ActiveModel = m.into();
                am.tenant_id = Set(rule.tenant_id.clone());
                am.name = Set(rule.name.clone());
                am.target_kind = Set(rule.target_kind.to_string());
                am.target_selector = Set(rule.target_selector.clone());
                am.metric = Set(rule.metric.clone());
                am.operator = Set(rule.operator.clone());
                am.threshold = Set(decimal_to_text(rule.threshold));
                am.consecutive_failures = Set(rule.consecutive_failures);
                am.silence_secs = Set(i64::try_from(rule.silence_secs).unwrap_or(i64::MAX));
                am.severity = Set(rule.severity.to_string());
                am.channel_ids = Set(channel_ids);
                am.enabled = Set(rule.enabled);
                am.updated_at = Set(now);
                am.update(self.db()).await?
            }
            None => {
                alert_rule::ActiveModel {
                    id: Set(rule.id.clone()),
                    tenant_id: Set(rule.tenant_id.clone()),
                    name: Set(rule.name.clone()),
                    target_kind: Set(rule.target_kind.to_string()),
                    target_selector: Set(rule.target_selector.clone()),
                    metric: Set(rule.metric.clone()),
                    operator: Set(rule.operator.clone()),
                    threshold: Set(decimal_to_text(rule.threshold)),
                    consecutive_failures: Set(rule.consecutive_failures),
                    silence_secs: Set(i64::try_from(rule.silence_secs).unwrap_or(i64::MAX)),
                    severity: Set(rule.severity.to_string()),
                    channel_ids: Set(channel_ids),
                    enabled: Set(rule.enabled),
                    created_at: Set(now),
                    updated_at: Set(now),
                }
                .insert(self.db())
                .await?
            }
        };
        Ok(to_rule(model)?)
    }

    pub async fn get_rule_by_id(&self, id: &str) -> Result<Option<AlertRule>> {
        let model = Entity::find_by_id(id).one(self.db()).await?;
        Ok(model.map(to_rule).transpose()?)
    }

    /// Enabled rules of a tenant. Rows that fail to decode are logged and skipped.
    pub async fn list_enabled_rules_for(&self, tenant_id: &str) -> Result<Vec<AlertRule>> {
        let rows = Entity::find()
            .filter(Column::TenantId.eq(tenant_id))
            .filter(Column::Enabled.eq(true))
            .order_by_asc(Column::CreatedAt)
            .all(self.db())
            .await?;
        Ok(rows
            .into_iter()
            .filter_map(|m| {
                let id = m.id.clone();
                match to_rule(m) {
                    Ok(rule) => Some(rule),
                    Err(e) => {
                        tracing::warn!(rule_id = %id, error = %e, "Skipping undecodable alert rule");
                        None
                    }
                }
            })
            .collect())
    }

    pub async fn tenants_with_enabled_rules(&self) -> Result<Vec<String>> {
        let tenants: Vec<String> = Entity::find()
            .select_only()
            .column(Column::TenantId)
            .filter(Column::Enabled.eq(true))
            .distinct()
            .order_by_asc(Column::TenantId)
            .into_tuple()
            .all(self.db())
            .await?;
        Ok(tenants)
    }
}

#[async_trait]
impl RuleSource for MonitorStore {
    async fn list_enabled_rules(&self, tenant_id: &str) -> Result<Vec<AlertRule>> {
        self.list_enabled_rules_for(tenant_id).await
    }

    async fn get_rule(&self, rule_id: &str) -> Result<Option<AlertRule>> {
        self.get_rule_by_id(rule_id).await
    }

    async fn list_monitored_tenants(&self) -> Result<Vec<String>> {
        self.tenants_with_enabled_rules().await
    }
}
