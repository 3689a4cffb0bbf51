pub mod alert_rule;
pub mod host;
pub mod host_metric_snapshot;
pub mod incident;
pub mod network_probe;
pub mod notification_attempt;
pub mod notification_channel;
pub mod probe_result;
