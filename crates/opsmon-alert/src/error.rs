use opsmon_common::types::IllegalTransition;

/// Errors raised by incident lifecycle operations.
///
/// # Examples
///
/// ```rust
/// use opsmon_alert::error::AlertError;
///
/// let err = AlertError::IncidentNotFound("42".to_string());
/// assert!(err.to_string().contains("42"));
/// ```
#[derive(Debug, thiserror::Error)]
pub enum AlertError {
    #[error("Alert: incident not found (id={0})")]
    IncidentNotFound(String),

    #[error("Alert: rule not found (id={0})")]
    RuleNotFound(String),

    /// The requested status change is not allowed from the incident's current status.
    #[error("Alert: {0}")]
    IllegalTransition(#[from] IllegalTransition),

    /// Failure in the backing incident store.
    #[error("Alert: storage error: {0}")]
    Storage(String),
}

impl AlertError {
    pub fn storage(err: impl std::fmt::Display) -> Self {
        Self::Storage(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AlertError>;
