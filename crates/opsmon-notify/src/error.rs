/// Errors that can occur within the notification subsystem.
///
/// # Examples
///
/// ```rust
/// use opsmon_notify::error::NotifyError;
///
/// let err = NotifyError::InvalidConfig("missing smtp_host".to_string());
/// assert!(err.to_string().contains("smtp_host"));
/// ```
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    /// Channel configuration is missing a required field or contains an invalid value.
    #[error("Notify: invalid channel configuration: {0}")]
    InvalidConfig(String),

    #[error("Notify: unknown channel type '{0}'")]
    UnknownChannelType(String),

    #[error("Notify: HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Notify: SMTP error: {0}")]
    SmtpError(String),

    #[error("Notify: JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// The external API answered but reported a failure.
    #[error("Notify: API error from {service}: status={status}, body={body}")]
    ApiError {
        service: String,
        status: u16,
        body: String,
    },

    #[error("Notify: send timed out after {0}s")]
    Timeout(u64),

    #[error("Notify: {0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, NotifyError>;
