use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Alert severity level, ordered from lowest to highest.
///
/// # Examples
///
/// ```
/// use opsmon_common::types::Severity;
///
/// let sev: Severity = "warning".parse().unwrap();
/// assert_eq!(sev, Severity::Warning);
/// assert_eq!(sev.to_string(), "warning");
/// assert!(Severity::Critical > Severity::Info);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Info => write!(f, "info"),
            Severity::Warning => write!(f, "warning"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

impl std::str::FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "info" => Ok(Severity::Info),
            "warning" => Ok(Severity::Warning),
            "critical" => Ok(Severity::Critical),
            _ => Err(format!("unknown severity: {s}")),
        }
    }
}

/// Kind of monitored entity a rule is evaluated against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    Host,
    Probe,
}

impl TargetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetKind::Host => "host",
            TargetKind::Probe => "probe",
        }
    }
}

impl std::fmt::Display for TargetKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TargetKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "host" => Ok(TargetKind::Host),
            "probe" | "network_probe" => Ok(TargetKind::Probe),
            _ => Err(format!("unknown target kind: {s}")),
        }
    }
}

/// A monitored host or network probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    pub id: String,
    pub tenant_id: String,
    pub kind: TargetKind,
    pub name: String,
}

/// Latest resource snapshot reported for a host. Readings the collector
/// could not obtain are `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostSnapshot {
    pub host_id: String,
    pub cpu_percent: Option<Decimal>,
    pub memory_percent: Option<Decimal>,
    pub disk_percent: Option<Decimal>,
    pub load_avg: Option<Decimal>,
    pub collected_at: DateTime<Utc>,
}

/// Outcome of one network probe execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeResult {
    pub probe_id: String,
    pub success: bool,
    /// Absent when the probe failed before a response arrived.
    pub response_time_ms: Option<Decimal>,
    pub status_code: Option<i32>,
    pub error: Option<String>,
    pub checked_at: DateTime<Utc>,
}

/// The latest observation for a target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Sample {
    Host(HostSnapshot),
    Probe(ProbeResult),
}

impl Sample {
    pub fn target_id(&self) -> &str {
        match self {
            Sample::Host(s) => &s.host_id,
            Sample::Probe(r) => &r.probe_id,
        }
    }

    pub fn kind(&self) -> TargetKind {
        match self {
            Sample::Host(_) => TargetKind::Host,
            Sample::Probe(_) => TargetKind::Probe,
        }
    }

    pub fn observed_at(&self) -> DateTime<Utc> {
        match self {
            Sample::Host(s) => s.collected_at,
            Sample::Probe(r) => r.checked_at,
        }
    }

    /// Host snapshots only exist for reachable hosts, so they always count
    /// as a successful reading.
    pub fn is_success(&self) -> bool {
        match self {
            Sample::Host(_) => true,
            Sample::Probe(r) => r.success,
        }
    }
}

/// Tenant-scoped alert rule as configured through the management API.
///
/// `metric` and `operator` are kept as the raw configured strings; the
/// evaluator parses them and fails closed on anything it does not know.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRule {
    pub id: String,
    pub tenant_id: String,
    pub name: String,
    pub target_kind: TargetKind,
    /// Target id or name glob. `None` or empty selects every target of `target_kind`.
    pub target_selector: Option<String>,
    pub metric: String,
    pub operator: String,
    pub threshold: Decimal,
    /// 0 or 1 fires on the first breaching sample.
    pub consecutive_failures: i32,
    pub silence_secs: u64,
    pub severity: Severity,
    pub channel_ids: Vec<String>,
    pub enabled: bool,
}

impl AlertRule {
    /// No selector, a blank one or `*`.
    pub fn selects_all_targets(&self) -> bool {
        self.target_selector
            .as_deref()
            .map(str::trim)
            .map_or(true, |s| s.is_empty() || s == "*")
    }
}

/// Lifecycle state of an [`Incident`].
///
/// ```text
/// active ──► acknowledged ──► resolved
///   │              │
///   ├──────────────┴────────► ignored
///   └───────────────────────► resolved
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IncidentStatus {
    Active,
    Acknowledged,
    Ignored,
    Resolved,
}

impl IncidentStatus {
    pub const OPEN: [IncidentStatus; 2] = [IncidentStatus::Active, IncidentStatus::Acknowledged];

    pub fn as_str(&self) -> &'static str {
        match self {
            IncidentStatus::Active => "active",
            IncidentStatus::Acknowledged => "acknowledged",
            IncidentStatus::Ignored => "ignored",
            IncidentStatus::Resolved => "resolved",
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(self, IncidentStatus::Active | IncidentStatus::Acknowledged)
    }

    pub fn can_transition_to(&self, next: IncidentStatus) -> bool {
        use IncidentStatus::*;
        matches!(
            (self, next),
            (Active, Acknowledged)
                | (Active, Ignored)
                | (Active, Resolved)
                | (Acknowledged, Ignored)
                | (Acknowledged, Resolved)
        )
    }
}

impl std::fmt::Display for IncidentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for IncidentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "active" => Ok(IncidentStatus::Active),
            "acknowledged" => Ok(IncidentStatus::Acknowledged),
            "ignored" => Ok(IncidentStatus::Ignored),
            "resolved" => Ok(IncidentStatus::Resolved),
            _ => Err(format!("unknown incident status: {s}")),
        }
    }
}

/// A requested change of incident status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    Acknowledge { user_id: String },
    Ignore,
    Resolve,
}

impl Transition {
    pub fn target_status(&self) -> IncidentStatus {
        match self {
            Transition::Acknowledge { .. } => IncidentStatus::Acknowledged,
            Transition::Ignore => IncidentStatus::Ignored,
            Transition::Resolve => IncidentStatus::Resolved,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("illegal incident transition from {from} to {to}")]
pub struct IllegalTransition {
    pub from: IncidentStatus,
    pub to: IncidentStatus,
}

/// Everything needed to open an incident or refresh the open one.
#[derive(Debug, Clone, PartialEq)]
pub struct IncidentDraft {
    pub tenant_id: String,
    pub rule_id: String,
    pub rule_name: String,
    pub target_id: String,
    pub target_name: String,
    pub target_kind: TargetKind,
    pub metric: String,
    pub severity: Severity,
    pub observed_value: Option<Decimal>,
    pub threshold_value: Decimal,
    pub message: String,
}

/// Persisted record of a confirmed rule breach.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Incident {
    pub id: String,
    pub tenant_id: String,
    pub rule_id: String,
    pub rule_name: String,
    pub target_id: String,
    pub target_name: String,
    pub target_kind: TargetKind,
    pub metric: String,
    pub severity: Severity,
    pub status: IncidentStatus,
    pub observed_value: Option<Decimal>,
    pub threshold_value: Decimal,
    pub message: String,
    pub trigger_count: i64,
    pub first_triggered_at: DateTime<Utc>,
    pub last_triggered_at: DateTime<Utc>,
    /// Last time at least one channel accepted a notification for this incident.
    pub last_notified_at: Option<DateTime<Utc>>,
    pub acknowledged_at: Option<DateTime<Utc>>,
    pub acknowledged_by: Option<String>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Incident {
    pub fn open(id: String, draft: &IncidentDraft, now: DateTime<Utc>) -> Self {
        Self {
            id,
            tenant_id: draft.tenant_id.clone(),
            rule_id: draft.rule_id.clone(),
            rule_name: draft.rule_name.clone(),
            target_id: draft.target_id.clone(),
            target_name: draft.target_name.clone(),
            target_kind: draft.target_kind,
            metric: draft.metric.clone(),
            severity: draft.severity,
            status: IncidentStatus::Active,
            observed_value: draft.observed_value,
            threshold_value: draft.threshold_value,
            message: draft.message.clone(),
            trigger_count: 1,
            first_triggered_at: now,
            last_triggered_at: now,
            last_notified_at: None,
            acknowledged_at: None,
            acknowledged_by: None,
            resolved_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_open(&self) -> bool {
        self.status.is_open()
    }

    /// Records a repeated breach on this (still open) incident.
    pub fn refresh(&mut self, draft: &IncidentDraft, now: DateTime<Utc>) {
        self.observed_value = draft.observed_value;
        self.message = draft.message.clone();
        self.last_triggered_at = now;
        self.trigger_count += 1;
        self.updated_at = now;
    }

    pub fn apply(&mut self, transition: &Transition, now: DateTime<Utc>) -> Result<(), IllegalTransition> {
        let to = transition.target_status();
        if !self.status.can_transition_to(to) {
            return Err(IllegalTransition {
                from: self.status,
                to,
            });
        }
        match transition {
            Transition::Acknowledge { user_id } => {
                self.acknowledged_at = Some(now);
                self.acknowledged_by = Some(user_id.clone());
            }
            Transition::Resolve => self.resolved_at = Some(now),
            Transition::Ignore => {}
        }
        self.status = to;
        self.updated_at = now;
        Ok(())
    }

    /// Whether `silence_secs` have passed since the last accepted notification.
    /// An incident that was never notified is always due.
    pub fn silence_elapsed(&self, silence_secs: u64, now: DateTime<Utc>) -> bool {
        match self.last_notified_at {
            None => true,
            Some(last) => now - last >= seconds(silence_secs),
        }
    }
}

/// Converts a configured number of seconds, saturating at the largest
/// representable duration instead of panicking.
pub fn seconds(secs: u64) -> Duration {
    i64::try_from(secs)
        .ok()
        .and_then(Duration::try_seconds)
        .unwrap_or(Duration::MAX)
}

/// A tenant-owned notification destination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationChannelConfig {
    pub id: String,
    pub tenant_id: String,
    pub name: String,
    pub channel_type: String,
    pub config: serde_json::Value,
    pub enabled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttemptStatus {
    Sent,
    Failed,
}

impl AttemptStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttemptStatus::Sent => "sent",
            AttemptStatus::Failed => "failed",
        }
    }
}

impl std::str::FromStr for AttemptStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sent" => Ok(AttemptStatus::Sent),
            "failed" => Ok(AttemptStatus::Failed),
            _ => Err(format!("unknown attempt status: {s}")),
        }
    }
}

/// Audit record of one delivery attempt on one channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationAttempt {
    pub id: String,
    pub tenant_id: String,
    pub incident_id: String,
    pub rule_id: String,
    pub channel_id: String,
    pub channel_name: String,
    pub channel_type: String,
    pub status: AttemptStatus,
    pub detail: Option<String>,
    pub duration_ms: i64,
    pub created_at: DateTime<Utc>,
}
