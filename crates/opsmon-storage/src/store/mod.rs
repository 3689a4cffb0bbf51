use anyhow::Result;
use chrono::{DateTime, FixedOffset, Utc};
use migration::{Migrator, MigratorTrait};
use rust_decimal::Decimal;
use sea_orm::{ConnectionTrait, Database, DatabaseConnection, DbErr, SqlErr};
use std::str::FromStr;
use tokio::sync::{Mutex, MutexGuard};

use crate::error::StorageError;

pub mod attempt;
pub mod channel;
pub mod incident;
pub mod rule;
pub mod target;

pub use target::{HostRecord, HostTargets, ProbeRecord, ProbeTargets};

/// Access layer over the monitoring database.
///
/// SQLite admits one writer at a time and a deferred transaction that read
/// from an older snapshot cannot upgrade to a write once another connection
/// committed. Every write of this store therefore runs under `write_lock`.
pub struct MonitorStore {
    pub(crate) db: DatabaseConnection,
    write_lock: Mutex<()>,
}

impl MonitorStore {
    /// Connects to `db_url` (e.g. `sqlite://data/opsmon.db?mode=rwc`) and
    /// brings the schema up to date.
    pub async fn new(db_url: &str) -> Result<Self> {
        let db = Database::connect(db_url).await?;
        if db_url.starts_with("sqlite:") {
            db.execute_unprepared("PRAGMA journal_mode=WAL;").await?;
        }
        Migrator::up(&db, None).await?;
        tracing::info!("Monitor database ready");
        Ok(Self {
            db,
            write_lock: Mutex::new(()),
        })
    }

    pub(crate) fn db(&self) -> &DatabaseConnection {
        &self.db
    }

    /// Serialises writers sharing this store's connection pool.
    pub(crate) async fn write_guard(&self) -> MutexGuard<'_, ()> {
        self.write_lock.lock().await
    }
}

/// Errors after which replaying the whole write transaction can succeed.
///
/// Covers the unique-index race on open incidents and `SQLITE_BUSY` from a
/// writer in another process (the `seed` command, for instance).
pub(crate) fn is_retryable(e: &DbErr) -> bool {
    if matches!(e.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) {
        return true;
    }
    let msg = e.to_string();
    msg.contains("database is locked") || msg.contains("SQLITE_BUSY")
}

pub(crate) fn now_fixed() -> DateTime<FixedOffset> {
    Utc::now().fixed_offset()
}

pub(crate) fn to_fixed(t: DateTime<Utc>) -> DateTime<FixedOffset> {
    t.fixed_offset()
}

pub(crate) fn to_utc(t: DateTime<FixedOffset>) -> DateTime<Utc> {
    t.with_timezone(&Utc)
}

pub(crate) fn decimal_to_text(d: Decimal) -> String {
    d.normalize().to_string()
}

pub(crate) fn parse_decimal(column: &'static str, value: &str) -> Result<Decimal, StorageError> {
    Decimal::from_str(value).map_err(|_| StorageError::Decode {
        column,
        value: value.to_string(),
    })
}

pub(crate) fn parse_opt_decimal(
    column: &'static str,
    value: Option<&str>,
) -> Result<Option<Decimal>, StorageError> {
    value.map(|v| parse_decimal(column, v)).transpose()
}

pub(crate) fn parse_enum<T>(column: &'static str, value: &str) -> Result<T, StorageError>
where
    T: FromStr<Err = String>,
{
    value.parse().map_err(|_| StorageError::Decode {
        column,
        value: value.to_string(),
    })
}
