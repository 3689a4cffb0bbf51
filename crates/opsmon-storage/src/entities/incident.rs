use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "incidents")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub tenant_id: String,
    pub rule_id: String,
    pub rule_name: String,
    pub target_id: String,
    pub target_name: String,
    pub target_kind: String,
    pub metric: String,
    pub severity: String,
    pub status: String,
    pub observed_value: Option<String>,
    pub threshold_value: String,
    pub message: String,
    pub trigger_count: i64,
    pub first_triggered_at: DateTimeWithTimeZone,
    pub last_triggered_at: DateTimeWithTimeZone,
    pub last_notified_at: Option<DateTimeWithTimeZone>,
    pub acknowledged_at: Option<DateTimeWithTimeZone>,
    pub acknowledged_by: Option<String>,
    pub resolved_at: Option<DateTimeWithTimeZone>,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
