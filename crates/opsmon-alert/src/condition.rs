use opsmon_common::types::{AlertRule, TargetKind};
use rust_decimal::Decimal;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    GreaterThan,
    LessThan,
    GreaterEqual,
    LessEqual,
    Equal,
    NotEqual,
}

impl FromStr for CompareOp {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            ">" | "gt" | "greater_than" => Ok(Self::GreaterThan),
            "<" | "lt" | "less_than" => Ok(Self::LessThan),
            ">=" | "gte" | "greater_equal" => Ok(Self::GreaterEqual),
            "<=" | "lte" | "less_equal" => Ok(Self::LessEqual),
            "==" | "=" | "eq" | "equal" => Ok(Self::Equal),
            "!=" | "<>" | "ne" | "not_equal" => Ok(Self::NotEqual),
            _ => Err(format!("unknown compare operator: {s}")),
        }
    }
}

impl std::fmt::Display for CompareOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::GreaterThan => ">",
            Self::LessThan => "<",
            Self::GreaterEqual => ">=",
            Self::LessEqual => "<=",
            Self::Equal => "==",
            Self::NotEqual => "!=",
        };
        f.write_str(s)
    }
}

impl CompareOp {
    /// Decimal comparison; equality is exact.
    pub fn check(&self, value: Decimal, threshold: Decimal) -> bool {
        match self {
            Self::GreaterThan => value > threshold,
            Self::LessThan => value < threshold,
            Self::GreaterEqual => value >= threshold,
            Self::LessEqual => value <= threshold,
            Self::Equal => value == threshold,
            Self::NotEqual => value != threshold,
        }
    }

    pub fn describe(&self) -> &'static str {
        match self {
            Self::GreaterThan => "above",
            Self::LessThan => "below",
            Self::GreaterEqual => "at or above",
            Self::LessEqual => "at or below",
            Self::Equal => "equal to",
            Self::NotEqual => "not equal to",
        }
    }
}

/// Condition types a rule can watch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricKind {
    ResponseTime,
    StatusCode,
    Availability,
    Cpu,
    Memory,
    Disk,
    Load,
}

impl FromStr for MetricKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "response_time" => Ok(Self::ResponseTime),
            "status_code" => Ok(Self::StatusCode),
            "availability" => Ok(Self::Availability),
            "cpu" | "cpu_usage" => Ok(Self::Cpu),
            "memory" | "memory_usage" => Ok(Self::Memory),
            "disk" | "disk_usage" => Ok(Self::Disk),
            "load" | "load_avg" => Ok(Self::Load),
            _ => Err(format!("unknown metric type: {s}")),
        }
    }
}

impl MetricKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ResponseTime => "response_time",
            Self::StatusCode => "status_code",
            Self::Availability => "availability",
            Self::Cpu => "cpu",
            Self::Memory => "memory",
            Self::Disk => "disk",
            Self::Load => "load",
        }
    }

    pub fn is_percentage(&self) -> bool {
        matches!(self, Self::Cpu | Self::Memory | Self::Disk)
    }

    /// The target kind whose samples carry this metric.
    pub fn target_kind(&self) -> TargetKind {
        match self {
            Self::ResponseTime | Self::StatusCode | Self::Availability => TargetKind::Probe,
            Self::Cpu | Self::Memory | Self::Disk | Self::Load => TargetKind::Host,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvalidRule {
    #[error("{0}")]
    Operator(String),
    #[error("{0}")]
    Metric(String),
    #[error("threshold must be non-negative, got {0}")]
    NegativeThreshold(Decimal),
    #[error("percentage threshold must not exceed 100, got {0}")]
    PercentageOverflow(Decimal),
    #[error("metric {metric} does not apply to {kind} targets")]
    KindMismatch { metric: &'static str, kind: TargetKind },
}

/// A rule whose operator and metric have been parsed and checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Condition {
    pub metric: MetricKind,
    pub operator: CompareOp,
    pub threshold: Decimal,
}

impl Condition {
    pub fn from_rule(rule: &AlertRule) -> Result<Self, InvalidRule> {
        let metric: MetricKind = rule.metric.parse().map_err(InvalidRule::Metric)?;
        // availability compares against the expected state, not via the operator
        let operator = match rule.operator.parse::<CompareOp>() {
            Ok(op) => op,
            Err(_) if metric == MetricKind::Availability => CompareOp::NotEqual,
            Err(e) => return Err(InvalidRule::Operator(e)),
        };

        if rule.threshold < Decimal::ZERO {
            return Err(InvalidRule::NegativeThreshold(rule.threshold));
        }
        if metric.is_percentage() && rule.threshold > Decimal::ONE_HUNDRED {
            return Err(InvalidRule::PercentageOverflow(rule.threshold));
        }
        if metric.target_kind() != rule.target_kind {
            return Err(InvalidRule::KindMismatch {
                metric: metric.as_str(),
                kind: rule.target_kind,
            });
        }

        Ok(Self {
            metric,
            operator,
            threshold: rule.threshold,
        })
    }
}

/// Checks the configuration invariants a rule must satisfy before it is saved.
///
/// The evaluator runs the same checks on every sweep and fails closed, so a
/// rule that bypassed this never fires.
pub fn validate_rule(rule: &AlertRule) -> Result<(), InvalidRule> {
    Condition::from_rule(rule).map(|_| ())
}
