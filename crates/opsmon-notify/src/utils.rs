//! Helpers shared by the channel implementations.

use opsmon_common::types::Incident;
use serde_json::Value;

/// Maximum length of a provider request/response excerpt kept in attempt records.
pub const MAX_BODY_LENGTH: usize = 4000;

/// Truncates to at most `max_len` bytes without splitting a character.
pub fn truncate_string(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        return s.to_string();
    }
    let mut end = max_len;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}... [truncated]", &s[..end])
}

/// Replaces values of secret-looking keys with `"***"`, recursively.
pub fn redact_sensitive_json(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, val)| {
                    let redacted = if is_sensitive_key(key) {
                        Value::String("***".to_string())
                    } else {
                        redact_sensitive_json(val)
                    };
                    (key.clone(), redacted)
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(redact_sensitive_json).collect()),
        _ => value.clone(),
    }
}

fn is_sensitive_key(key: &str) -> bool {
    let key = key.to_lowercase();
    ["password", "passwd", "secret", "token", "api_key", "apikey", "credentials"]
        .iter()
        .any(|needle| key.contains(needle))
}

/// `[opsmon][critical] rule name - target name`
pub fn incident_title(incident: &Incident) -> String {
    format!(
        "[opsmon][{}] {} - {}",
        incident.severity, incident.rule_name, incident.target_name
    )
}

pub fn format_observed(incident: &Incident) -> String {
    incident
        .observed_value
        .map(|v| v.normalize().to_string())
        .unwrap_or_else(|| "n/a".to_string())
}
