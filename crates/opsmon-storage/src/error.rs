/// Errors that can occur within the storage layer.
///
/// # Examples
///
/// ```rust
/// use opsmon_storage::error::StorageError;
///
/// let err = StorageError::NotFound {
///     entity: "alert_rule",
///     id: "rule-99".to_string(),
/// };
/// assert!(err.to_string().contains("alert_rule"));
/// ```
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Storage: {entity} not found (id={id})")]
    NotFound { entity: &'static str, id: String },

    #[error("Storage: database error: {0}")]
    Db(#[from] sea_orm::DbErr),

    /// JSON serialization or deserialization failure (config_json, channel_ids).
    #[error("Storage: JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A stored value could not be decoded into its domain type.
    #[error("Storage: invalid value in column '{column}': {value}")]
    Decode { column: &'static str, value: String },
}

pub type Result<T> = std::result::Result<T, StorageError>;
