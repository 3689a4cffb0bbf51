use async_trait::async_trait;
use opsmon_common::types::AlertRule;

/// Read-only access to rule configuration.
#[async_trait]
pub trait RuleSource: Send + Sync {
    async fn list_enabled_rules(&self, tenant_id: &str) -> anyhow::Result<Vec<AlertRule>>;

    /// Looks a rule up regardless of its `enabled` flag.
    async fn get_rule(&self, rule_id: &str) -> anyhow::Result<Option<AlertRule>>;

    /// Tenants owning at least one enabled rule.
    async fn list_monitored_tenants(&self) -> anyhow::Result<Vec<String>>;
}
