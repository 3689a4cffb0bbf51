use crate::condition::{Condition, MetricKind};
use crate::target::MetricExtractor;
use opsmon_common::types::{AlertRule, Sample};
use rust_decimal::Decimal;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Evaluation {
    pub triggered: bool,
    pub observed: Option<Decimal>,
}

impl Evaluation {
    /// Nothing could be evaluated: absent metric or invalid rule.
    pub const SKIPPED: Evaluation = Evaluation {
        triggered: false,
        observed: None,
    };

    /// The condition was evaluated against real data and did not breach.
    pub fn is_clear(&self) -> bool {
        !self.triggered && self.observed.is_some()
    }
}

/// Evaluates `rule` against the latest `sample`.
///
/// Never fails: an invalid rule is logged and treated as not triggered.
pub fn evaluate(rule: &AlertRule, sample: &Sample, extractor: &dyn MetricExtractor) -> Evaluation {
    let condition = match Condition::from_rule(rule) {
        Ok(c) => c,
        Err(e) => {
            tracing::warn!(
                rule_id = %rule.id,
                tenant_id = %rule.tenant_id,
                error = %e,
                "Skipping invalid alert rule"
            );
            return Evaluation::SKIPPED;
        }
    };

    let Some(observed) = extractor.extract(condition.metric, sample) else {
        return Evaluation::SKIPPED;
    };

    let triggered = if condition.metric == MetricKind::Availability {
        let expected = if condition.threshold == Decimal::ONE {
            Decimal::ONE
        } else {
            Decimal::ZERO
        };
        observed != expected
    } else {
        condition.operator.check(observed, condition.threshold)
    };

    Evaluation {
        triggered,
        observed: Some(observed),
    }
}

/// Human-readable incident message.
pub fn describe_breach(rule: &AlertRule, target_name: &str, observed: Option<Decimal>) -> String {
    let observed = observed
        .map(|v| v.normalize().to_string())
        .unwrap_or_else(|| "n/a".to_string());

    if rule.metric.eq_ignore_ascii_case("availability") {
        let state = if observed == "1" { "up" } else { "down" };
        return format!("[{}] {} is {} (availability)", rule.name, target_name, state);
    }

    let op = rule
        .operator
        .parse::<crate::condition::CompareOp>()
        .map(|op| op.describe())
        .unwrap_or("compared to");
    format!(
        "[{}] {} on {} is {}, {} threshold {}",
        rule.name,
        rule.metric,
        target_name,
        observed,
        op,
        rule.threshold.normalize()
    )
}
