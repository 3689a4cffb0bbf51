use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "alert_rules")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub tenant_id: String,
    pub name: String,
    pub target_kind: String,
    pub target_selector: Option<String>,
    pub metric: String,
    pub operator: String,
    /// Canonical decimal string.
    pub threshold: String,
    pub consecutive_failures: i32,
    pub silence_secs: i64,
    pub severity: String,
    /// JSON array of channel ids, in notification order.
    pub channel_ids: String,
    pub enabled: bool,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
