use anyhow::Result;
use async_trait::async_trait;
use opsmon_common::types::NotificationChannelConfig;
use opsmon_notify::dispatcher::ChannelSource;
use sea_orm::{ActiveModelTrait, ActiveValue::Set, ColumnTrait, EntityTrait, QueryFilter, QueryOrder};

use super::{now_fixed, MonitorStore};
use crate::entities::notification_channel::{self, Column, Entity};
use crate::error::StorageError;

fn to_channel(m: notification_channel::Model) -> Result<NotificationChannelConfig, StorageError> {
    Ok(NotificationChannelConfig {
        config: serde_json::from_str(&m.config_json)?,
        id: m.id,
        tenant_id: m.tenant_id,
        name: m.name,
        channel_type: m.channel_type,
        enabled: m.enabled,
    })
}

impl MonitorStore {
    /// Inserts the channel, or overwrites the stored channel with the same id.
    pub async fn save_channel(&self, channel: &NotificationChannelConfig) -> Result<NotificationChannelConfig> {
        let _guard = self.write_guard().await;
        let now = now_fixed();
        let config_json = serde_json::to_string(&channel.config)?;
        let model = match Entity::find_by_id(channel.id.as_str()).one(self.db()).await? {
            Some(m) => {
                let mut am: notification_channel::ActiveModel = m.into();
                am.tenant_id = Set(channel.tenant_id.clone());
                am.name = Set(channel.name.clone());
                am.channel_type = Set(channel.channel_type.clone());
                am.config_json = Set(config_json);
                am.enabled = Set(channel.enabled);
                am.updated_at = Set(now);
                am.update(self.db()).await?
            }
            None => {
                notification_channel::ActiveModel {
                    id: Set(channel.id.clone()),
                    tenant_id: Set(channel.tenant_id.clone()),
                    name: Set(channel.name.clone()),
                    channel_type: Set(channel.channel_type.clone()),
                    config_json: Set(config_json),
                    enabled: Set(channel.enabled),
                    created_at: Set(now),
                    updated_at: Set(now),
                }
                .insert(self.db())
                .await?
            }
        };
        Ok(to_channel(model)?)
    }

    /// All channels of a tenant, enabled or not.
    pub async fn list_channels_for(&self, tenant_id: &str) -> Result<Vec<NotificationChannelConfig>> {
        let rows = Entity::find()
            .filter(Column::TenantId.eq(tenant_id))
            .order_by_asc(Column::CreatedAt)
            .all(self.db())
            .await?;
        let mut channels = Vec::with_capacity(rows.len());
        for m in rows {
            let id = m.id.clone();
            match to_channel(m) {
                Ok(c) => channels.push(c),
                Err(e) => tracing::warn!(channel_id = %id, error = %e, "Skipping undecodable channel"),
            }
        }
        Ok(channels)
    }
}

#[async_trait]
impl ChannelSource for MonitorStore {
    async fn list_channels(&self, tenant_id: &str) -> Result<Vec<NotificationChannelConfig>> {
        self.list_channels_for(tenant_id).await
    }
}
