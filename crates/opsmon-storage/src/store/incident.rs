use async_trait::async_trait;
use chrono::{DateTime, Utc};
use opsmon_alert::error::{AlertError, Result as AlertResult};
use opsmon_alert::incident::{IncidentStore, OpenOutcome};
use opsmon_common::types::{Incident, IncidentDraft, IncidentStatus, Transition};
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, Order,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Select, TransactionTrait,
};

use super::{
    decimal_to_text, is_retryable, parse_decimal, parse_enum, parse_opt_decimal, to_fixed, to_utc,
    MonitorStore,
};
use crate::entities::incident::{self, Column, Entity};
use crate::error::StorageError;

/// Filters for listing incidents.
#[derive(Debug, Clone, Default)]
pub struct IncidentFilter {
    pub tenant_id: Option<String>,
    pub status: Option<IncidentStatus>,
    pub rule_id: Option<String>,
}

fn to_incident(m: incident::Model) -> Result<Incident, StorageError> {
    Ok(Incident {
        target_kind: parse_enum("target_kind", &m.target_kind)?,
        severity: parse_enum("severity", &m.severity)?,
        status: parse_enum("status", &m.status)?,
        observed_value: parse_opt_decimal("observed_value", m.observed_value.as_deref())?,
        threshold_value: parse_decimal("threshold_value", &m.threshold_value)?,
        first_triggered_at: to_utc(m.first_triggered_at),
        last_triggered_at: to_utc(m.last_triggered_at),
        last_notified_at: m.last_notified_at.map(to_utc),
        acknowledged_at: m.acknowledged_at.map(to_utc),
        resolved_at: m.resolved_at.map(to_utc),
        created_at: to_utc(m.created_at),
        updated_at: to_utc(m.updated_at),
        id: m.id,
        tenant_id: m.tenant_id,
        rule_id: m.rule_id,
        rule_name: m.rule_name,
        target_id: m.target_id,
        target_name: m.target_name,
        metric: m.metric,
        message: m.message,
        trigger_count: m.trigger_count,
        acknowledged_by: m.acknowledged_by,
    })
}

fn new_model(i: &Incident) -> incident::ActiveModel {
    incident::ActiveModel {
        id: Set(i.id.clone()),
        tenant_id: Set(i.tenant_id.clone()),
        rule_id: Set(i.rule_id.clone()),
        rule_name: Set(i.rule_name.clone()),
        target_id: Set(i.target_id.clone()),
        target_name: Set(i.target_name.clone()),
        target_kind: Set(i.target_kind.to_string()),
        metric: Set(i.metric.clone()),
        severity: Set(i.severity.to_string()),
        status: Set(i.status.as_str().to_string()),
        observed_value: Set(i.observed_value.map(decimal_to_text)),
        threshold_value: Set(decimal_to_text(i.threshold_value)),
        message: Set(i.message.clone()),
        trigger_count: Set(i.trigger_count),
        first_triggered_at: Set(to_fixed(i.first_triggered_at)),
        last_triggered_at: Set(to_fixed(i.last_triggered_at)),
        last_notified_at: Set(i.last_notified_at.map(to_fixed)),
        acknowledged_at: Set(i.acknowledged_at.map(to_fixed)),
        acknowledged_by: Set(i.acknowledged_by.clone()),
        resolved_at: Set(i.resolved_at.map(to_fixed)),
        created_at: Set(to_fixed(i.created_at)),
        updated_at: Set(to_fixed(i.updated_at)),
    }
}

/// Attempts per write transaction before the error reaches the caller.
const WRITE_ATTEMPTS: u32 = 3;
const RETRY_BACKOFF: std::time::Duration = std::time::Duration::from_millis(50);

fn open_statuses() -> [&'static str; 2] {
    IncidentStatus::OPEN.map(|s| s.as_str())
}

fn db_err(e: DbErr) -> AlertError {
    AlertError::storage(StorageError::Db(e))
}

fn decode_err(e: StorageError) -> AlertError {
    AlertError::storage(e)
}

fn apply_filter(mut q: Select<Entity>, filter: &IncidentFilter) -> Select<Entity> {
    if let Some(tenant) = &filter.tenant_id {
        q = q.filter(Column::TenantId.eq(tenant.as_str()));
    }
    if let Some(status) = filter.status {
        q = q.filter(Column::Status.eq(status.as_str()));
    }
    if let Some(rule) = &filter.rule_id {
        q = q.filter(Column::RuleId.eq(rule.as_str()));
    }
    q
}

async fn find_open_model<C: ConnectionTrait>(
    conn: &C,
    rule_id: &str,
    target_id: &str,
) -> std::result::Result<Option<incident::Model>, DbErr> {
    Entity::find()
        .filter(Column::RuleId.eq(rule_id))
        .filter(Column::TargetId.eq(target_id))
        .filter(Column::Status.is_in(open_statuses()))
        .one(conn)
        .await
}

impl MonitorStore {
    pub async fn list_incidents(
        &self,
        filter: &IncidentFilter,
        limit: u64,
        offset: u64,
    ) -> anyhow::Result<Vec<Incident>> {
        let rows = apply_filter(Entity::find(), filter)
            .order_by(Column::CreatedAt, Order::Desc)
            .order_by(Column::Id, Order::Desc)
            .limit(limit)
            .offset(offset)
            .all(self.db())
            .await?;
        Ok(rows
            .into_iter()
            .map(to_incident)
            .collect::<Result<Vec<_>, _>>()?)
    }

    pub async fn count_incidents(&self, filter: &IncidentFilter) -> anyhow::Result<u64> {
        Ok(apply_filter(Entity::find(), filter).count(self.db()).await?)
    }

    /// One attempt at the read-decide-write of `open_or_refresh`.
    async fn try_open_or_refresh(
        &self,
        draft: &IncidentDraft,
        now: DateTime<Utc>,
    ) -> std::result::Result<OpenOutcome, TxnFailure> {
        let txn = self.db().begin().await?;
        let outcome = match find_open_model(&txn, &draft.rule_id, &draft.target_id).await? {
            Some(model) => {
                let mut current = to_incident(model.clone())?;
                current.refresh(draft, now);
                let mut am: incident::ActiveModel = model.into();
                am.observed_value = Set(current.observed_value.map(decimal_to_text));
                am.message = Set(current.message.clone());
                am.last_triggered_at = Set(to_fixed(current.last_triggered_at));
                am.trigger_count = Set(current.trigger_count);
                am.updated_at = Set(to_fixed(current.updated_at));
                am.update(&txn).await?;
                OpenOutcome::Refreshed(current)
            }
            None => {
                let opened = Incident::open(opsmon_common::id::next_id(), draft, now);
                new_model(&opened).insert(&txn).await?;
                OpenOutcome::Opened(opened)
            }
        };
        txn.commit().await?;
        Ok(outcome)
    }

    async fn try_transition(
        &self,
        incident_id: &str,
        transition: &Transition,
        now: DateTime<Utc>,
    ) -> std::result::Result<Incident, TxnFailure> {
        let txn = self.db().begin().await?;
        let model = Entity::find_by_id(incident_id)
            .one(&txn)
            .await?
            .ok_or_else(|| AlertError::IncidentNotFound(incident_id.to_string()))?;

        let mut current = to_incident(model.clone())?;
        current.apply(transition, now).map_err(AlertError::from)?;

        let mut am: incident::ActiveModel = model.into();
        am.status = Set(current.status.as_str().to_string());
        am.acknowledged_at = Set(current.acknowledged_at.map(to_fixed));
        am.acknowledged_by = Set(current.acknowledged_by.clone());
        am.resolved_at = Set(current.resolved_at.map(to_fixed));
        am.updated_at = Set(to_fixed(current.updated_at));
        am.update(&txn).await?;
        txn.commit().await?;
        Ok(current)
    }
}

enum TxnFailure {
    Db(DbErr),
    Decode(StorageError),
    Rejected(AlertError),
}

impl From<AlertError> for TxnFailure {
    fn from(e: AlertError) -> Self {
        TxnFailure::Rejected(e)
    }
}

impl From<DbErr> for TxnFailure {
    fn from(e: DbErr) -> Self {
        TxnFailure::Db(e)
    }
}

impl From<StorageError> for TxnFailure {
    fn from(e: StorageError) -> Self {
        TxnFailure::Decode(e)
    }
}

impl From<TxnFailure> for AlertError {
    fn from(f: TxnFailure) -> Self {
        match f {
            TxnFailure::Db(e) => db_err(e),
            TxnFailure::Decode(e) => decode_err(e),
            TxnFailure::Rejected(e) => e,
        }
    }
}

#[async_trait]
impl IncidentStore for MonitorStore {
    async fn open_or_refresh(&self, draft: &IncidentDraft, now: DateTime<Utc>) -> AlertResult<OpenOutcome> {
        let _guard = self.write_guard().await;
        let mut attempt = 1;
        loop {
            match self.try_open_or_refresh(draft, now).await {
                // another writer got there first; the replay refreshes its incident
                Err(TxnFailure::Db(e)) if attempt < WRITE_ATTEMPTS && is_retryable(&e) => {
                    tracing::debug!(
                        rule_id = %draft.rule_id,
                        target_id = %draft.target_id,
                        attempt,
                        error = %e,
                        "Incident write conflicted, retrying"
                    );
                    attempt += 1;
                    tokio::time::sleep(RETRY_BACKOFF).await;
                }
                other => return Ok(other?),
            }
        }
    }

    async fn get(&self, incident_id: &str) -> AlertResult<Option<Incident>> {
        let model = Entity::find_by_id(incident_id)
            .one(self.db())
            .await
            .map_err(db_err)?;
        model.map(to_incident).transpose().map_err(decode_err)
    }

    async fn find_open(&self, rule_id: &str, target_id: &str) -> AlertResult<Option<Incident>> {
        let model = find_open_model(self.db(), rule_id, target_id)
            .await
            .map_err(db_err)?;
        model.map(to_incident).transpose().map_err(decode_err)
    }

    async fn list_open_for_rule(&self, rule_id: &str) -> AlertResult<Vec<Incident>> {
        let rows = Entity::find()
            .filter(Column::RuleId.eq(rule_id))
            .filter(Column::Status.is_in(open_statuses()))
            .all(self.db())
            .await
            .map_err(db_err)?;
        rows.into_iter()
            .map(to_incident)
            .collect::<Result<Vec<_>, _>>()
            .map_err(decode_err)
    }

    async fn transition(
        &self,
        incident_id: &str,
        transition: &Transition,
        now: DateTime<Utc>,
    ) -> AlertResult<Incident> {
        let _guard = self.write_guard().await;
        let mut attempt = 1;
        let current = loop {
            match self.try_transition(incident_id, transition, now).await {
                Err(TxnFailure::Db(e)) if attempt < WRITE_ATTEMPTS && is_retryable(&e) => {
                    tracing::debug!(incident_id, attempt, error = %e, "Retrying incident transition");
                    attempt += 1;
                    tokio::time::sleep(RETRY_BACKOFF).await;
                }
                other => break other?,
            }
        };

        tracing::debug!(
            incident_id = %current.id,
            status = %current.status,
            "Incident transitioned"
        );
        Ok(current)
    }

    async fn mark_notified(&self, incident_id: &str, now: DateTime<Utc>) -> AlertResult<()> {
        let _guard = self.write_guard().await;
        let model = Entity::find_by_id(incident_id)
            .one(self.db())
            .await
            .map_err(db_err)?
            .ok_or_else(|| AlertError::IncidentNotFound(incident_id.to_string()))?;
        let mut am: incident::ActiveModel = model.into();
        am.last_notified_at = Set(Some(to_fixed(now)));
        am.updated_at = Set(to_fixed(now));
        am.update(self.db()).await.map_err(db_err)?;
        Ok(())
    }
}
