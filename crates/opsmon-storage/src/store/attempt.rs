use anyhow::Result;
use async_trait::async_trait;
use opsmon_common::types::NotificationAttempt;
use opsmon_notify::dispatcher::AttemptLog;
use sea_orm::{ActiveModelTrait, ActiveValue::Set, ColumnTrait, EntityTrait, QueryFilter, QueryOrder};

use super::{parse_enum, to_fixed, to_utc, MonitorStore};
use crate::entities::notification_attempt::{self, Column, Entity};
use crate::error::StorageError;

fn to_attempt(m: notification_attempt::Model) -> Result<NotificationAttempt, StorageError> {
    Ok(NotificationAttempt {
        status: parse_enum("status", &m.status)?,
        created_at: to_utc(m.created_at),
        id: m.id,
        tenant_id: m.tenant_id,
        incident_id: m.incident_id,
        rule_id: m.rule_id,
        channel_id: m.channel_id,
        channel_name: m.channel_name,
        channel_type: m.channel_type,
        detail: m.detail,
        duration_ms: m.duration_ms,
    })
}

impl MonitorStore {
    pub async fn insert_attempt(&self, attempt: &NotificationAttempt) -> Result<()> {
        let _guard = self.write_guard().await;
        notification_attempt::ActiveModel {
            id: Set(attempt.id.clone()),
            tenant_id: Set(attempt.tenant_id.clone()),
            incident_id: Set(attempt.incident_id.clone()),
            rule_id: Set(attempt.rule_id.clone()),
            channel_id: Set(attempt.channel_id.clone()),
            channel_name: Set(attempt.channel_name.clone()),
            channel_type: Set(attempt.channel_type.clone()),
            status: Set(attempt.status.as_str().to_string()),
            detail: Set(attempt.detail.clone()),
            duration_ms: Set(attempt.duration_ms),
            created_at: Set(to_fixed(attempt.created_at)),
        }
        .insert(self.db())
        .await?;
        Ok(())
    }

    /// Attempts for an incident, oldest first.
    pub async fn list_attempts_for_incident(&self, incident_id: &str) -> Result<Vec<NotificationAttempt>> {
        let rows = Entity::find()
            .filter(Column::IncidentId.eq(incident_id))
            .order_by_asc(Column::CreatedAt)
            .order_by_asc(Column::Id)
            .all(self.db())
            .await?;
        Ok(rows
            .into_iter()
            .map(to_attempt)
            .collect::<Result<Vec<_>, _>>()?)
    }
}

#[async_trait]
impl AttemptLog for MonitorStore {
    async fn record_attempt(&self, attempt: &NotificationAttempt) -> Result<()> {
        self.insert_attempt(attempt).await
    }
}
