use super::scheduler::LoopSettings;
use super::supervisor::Supervisor;
use super::sweep::{ManualStatus, MonitorEngine, SampleCache};
use async_trait::async_trait;
use chrono::Utc;
use opsmon_alert::error::AlertError;
use opsmon_alert::hysteresis::HysteresisTracker;
use opsmon_alert::incident::IncidentManager;
use opsmon_alert::memory::MemoryIncidentStore;
use opsmon_alert::source::RuleSource;
use opsmon_alert::target::{
    ProbeMetricExtractor, SampleSource, TargetDomain, TargetDomains, TargetResolver,
};
use opsmon_common::types::{
    AlertRule, AttemptStatus, Incident, IncidentStatus, NotificationChannelConfig, ProbeResult,
    Sample, Severity, Target, TargetKind,
};
use opsmon_notify::dispatcher::Dispatcher;
use opsmon_notify::error::{NotifyError, Result as NotifyResult};
use opsmon_notify::memory::{MemoryAttemptLog, StaticChannelSource};
use opsmon_notify::plugin::{ChannelPlugin, ChannelRegistry};
use opsmon_notify::{NotificationChannel, SendReceipt};
use rust_decimal::Decimal;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

const TENANT: &str = "tenant-a";

#[derive(Default)]
struct FakeRules {
    rules: Mutex<Vec<AlertRule>>,
    listing_fails: AtomicBool,
}

impl FakeRules {
    fn set(&self, rules: Vec<AlertRule>) {
        *self.rules.lock().unwrap() = rules;
    }
}

#[async_trait]
impl RuleSource for FakeRules {
    async fn list_enabled_rules(&self, tenant_id: &str) -> anyhow::Result<Vec<AlertRule>> {
        if self.listing_fails.load(Ordering::SeqCst) {
            anyhow::bail!("rule table unavailable");
        }
        Ok(self
            .rules
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.enabled && r.tenant_id == tenant_id)
            .cloned()
            .collect())
    }

    async fn get_rule(&self, rule_id: &str) -> anyhow::Result<Option<AlertRule>> {
        Ok(self.rules.lock().unwrap().iter().find(|r| r.id == rule_id).cloned())
    }

    async fn list_monitored_tenants(&self) -> anyhow::Result<Vec<String>> {
        let mut tenants: Vec<String> = self
            .rules
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.enabled)
            .map(|r| r.tenant_id.clone())
            .collect();
        tenants.sort();
        tenants.dedup();
        Ok(tenants)
    }
}

/// Probes with a settable latest response time; `None` means no recent data.
///
/// Reads of targets in `failing_samples` return an error, target resolution
/// for rules in `unresolvable_rules` fails, and `panic_on_read` makes every
/// sample read panic.
#[derive(Default)]
struct FakeProbes {
    targets: Mutex<Vec<Target>>,
    samples: Mutex<HashMap<String, Option<Sample>>>,
    delay: Mutex<Duration>,
    reads: AtomicUsize,
    failing_samples: Mutex<HashSet<String>>,
    unresolvable_rules: Mutex<HashSet<String>>,
    panic_on_read: AtomicBool,
}

impl FakeProbes {
    fn add_probe(&self, id: &str) {
        self.targets.lock().unwrap().push(Target {
            id: id.to_string(),
            tenant_id: TENANT.to_string(),
            kind: TargetKind::Probe,
            name: format!("{id}-name"),
        });
    }

    fn remove_probe(&self, id: &str) {
        self.targets.lock().unwrap().retain(|t| t.id != id);
    }

    fn set_response_time(&self, id: &str, ms: Option<i64>) {
        let sample = ms.map(|ms| {
            Sample::Probe(ProbeResult {
                probe_id: id.to_string(),
                success: true,
                response_time_ms: Some(Decimal::from(ms)),
                status_code: Some(200),
                error: None,
                checked_at: Utc::now(),
            })
        });
        self.samples.lock().unwrap().insert(id.to_string(), sample);
    }

    fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TargetResolver for FakeProbes {
    async fn list_targets(&self, tenant_id: &str) -> anyhow::Result<Vec<Target>> {
        Ok(self
            .targets
            .lock()
            .unwrap()
            .iter()
            .filter(|t| t.tenant_id == tenant_id)
            .cloned()
            .collect())
    }

    async fn targets_for_rule(&self, rule: &AlertRule) -> anyhow::Result<Vec<Target>> {
        if self.unresolvable_rules.lock().unwrap().contains(&rule.id) {
            anyhow::bail!("selector of {} cannot be resolved", rule.id);
        }
        let targets = self.list_targets(&rule.tenant_id).await?;
        Ok(targets
            .into_iter()
            .filter(|t| opsmon_alert::target::selector_matches(rule, t))
            .collect())
    }
}

#[async_trait]
impl SampleSource for FakeProbes {
    async fn latest_sample(&self, target: &Target) -> anyhow::Result<Option<Sample>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if self.panic_on_read.load(Ordering::SeqCst) {
            panic!("sample decoder crashed on {}", target.id);
        }
        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.failing_samples.lock().unwrap().contains(&target.id) {
            anyhow::bail!("sample store timed out for {}", target.id);
        }
        Ok(self
            .samples
            .lock()
            .unwrap()
            .get(&target.id)
            .cloned()
            .flatten())
    }
}

/// Channel type that fails for incidents of the rules listed in `fail_rules`.
struct FlakyPlugin;

struct FlakyChannel {
    instance_id: String,
    fail_rules: Vec<String>,
}

#[async_trait]
impl NotificationChannel for FlakyChannel {
    async fn send(&self, incident: &Incident) -> NotifyResult<SendReceipt> {
        if self.fail_rules.contains(&incident.rule_id) {
            return Err(NotifyError::Other("provider rejected message".into()));
        }
        Ok(SendReceipt::default())
    }

    fn channel_type(&self) -> &str {
        "flaky"
    }

    fn instance_id(&self) -> &str {
        &self.instance_id
    }
}

impl ChannelPlugin for FlakyPlugin {
    fn name(&self) -> &str {
        "flaky"
    }

    fn validate_config(&self, _config: &Value) -> NotifyResult<()> {
        Ok(())
    }

    fn create_channel(&self, instance_id: &str, config: &Value) -> NotifyResult<Box<dyn NotificationChannel>> {
        let fail_rules = config["fail_rules"]
            .as_array()
            .map(|a| a.iter().filter_map(|v| v.as_str().map(String::from)).collect())
            .unwrap_or_default();
        Ok(Box::new(FlakyChannel {
            instance_id: instance_id.to_string(),
            fail_rules,
        }))
    }
}

struct Harness {
    engine: MonitorEngine,
    rules: Arc<FakeRules>,
    probes: Arc<FakeProbes>,
    incidents: Arc<MemoryIncidentStore>,
    attempts: Arc<MemoryAttemptLog>,
}

fn harness(channels: Vec<NotificationChannelConfig>) -> Harness {
    let rules = Arc::new(FakeRules::default());
    let probes = Arc::new(FakeProbes::default());
    let incidents = Arc::new(MemoryIncidentStore::new());
    let attempts = Arc::new(MemoryAttemptLog::new());

    let mut domains = TargetDomains::new();
    domains.register(TargetDomain {
        kind: TargetKind::Probe,
        resolver: probes.clone(),
        samples: probes.clone(),
        extractor: Arc::new(ProbeMetricExtractor),
    });

    let mut registry = ChannelRegistry::new();
    registry.register(Box::new(FlakyPlugin));
    let dispatcher = Dispatcher::new(
        Arc::new(registry),
        Arc::new(StaticChannelSource::new(channels)),
        attempts.clone(),
        Duration::from_secs(5),
    );

    let engine = MonitorEngine::new(
        rules.clone(),
        Arc::new(domains),
        Arc::new(HysteresisTracker::new(3600, 1000)),
        IncidentManager::new(incidents.clone()),
        Arc::new(dispatcher),
    );
    Harness {
        engine,
        rules,
        probes,
        incidents,
        attempts,
    }
}

fn flaky_channel(id: &str, fail_rules: &[&str]) -> NotificationChannelConfig {
    NotificationChannelConfig {
        id: id.to_string(),
        tenant_id: TENANT.to_string(),
        name: format!("channel {id}"),
        channel_type: "flaky".to_string(),
        config: json!({ "fail_rules": fail_rules }),
        enabled: true,
    }
}

fn slow_response_rule(id: &str, consecutive_failures: i32, channel_ids: &[&str]) -> AlertRule {
    AlertRule {
        id: id.to_string(),
        tenant_id: TENANT.to_string(),
        name: format!("rule {id}"),
        target_kind: TargetKind::Probe,
        target_selector: None,
        metric: "response_time".to_string(),
        operator: ">".to_string(),
        threshold: Decimal::from(500),
        consecutive_failures,
        silence_secs: 300,
        severity: Severity::Warning,
        channel_ids: channel_ids.iter().map(|s| s.to_string()).collect(),
        enabled: true,
    }
}

async fn sweep(h: &Harness) {
    let stats = h
        .engine
        .sweep_tenant(TENANT, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(stats.failed_rules, 0);
}

fn open_incidents(h: &Harness) -> Vec<Incident> {
    h.incidents.all().into_iter().filter(|i| i.is_open()).collect()
}

#[tokio::test]
async fn third_consecutive_breach_opens_one_incident() {
    let h = harness(vec![flaky_channel("7", &[])]);
    h.rules.set(vec![slow_response_rule("r1", 3, &["7"])]);
    h.probes.add_probe("p1");
    h.probes.set_response_time("p1", Some(600));

    sweep(&h).await;
    sweep(&h).await;
    assert!(h.incidents.all().is_empty());
    assert!(h.attempts.attempts().is_empty());

    sweep(&h).await;
    let all = h.incidents.all();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].status, IncidentStatus::Active);
    assert_eq!(all[0].observed_value, Some(Decimal::from(600)));
    assert!(all[0].last_notified_at.is_some());
    assert_eq!(h.attempts.attempts().len(), 1);
}

#[tokio::test]
async fn healthy_sample_between_breaches_restarts_the_count() {
    let h = harness(vec![]);
    h.rules.set(vec![slow_response_rule("r1", 2, &[])]);
    h.probes.add_probe("p1");

    h.probes.set_response_time("p1", Some(600));
    sweep(&h).await;
    h.probes.set_response_time("p1", Some(100));
    sweep(&h).await;
    h.probes.set_response_time("p1", Some(600));
    sweep(&h).await;
    assert!(h.incidents.all().is_empty());

    sweep(&h).await;
    assert_eq!(h.incidents.all().len(), 1);
}

#[tokio::test]
async fn shared_channel_failure_for_one_rule_does_not_affect_another() {
    let h = harness(vec![flaky_channel("7", &["rule-a"])]);
    h.rules.set(vec![
        slow_response_rule("rule-a", 0, &["7"]),
        slow_response_rule("rule-b", 0, &["7"]),
    ]);
    h.probes.add_probe("p1");
    h.probes.set_response_time("p1", Some(900));

    sweep(&h).await;

    let attempts = h.attempts.attempts();
    assert_eq!(attempts.len(), 2);
    let status_of = |rule: &str| {
        attempts
            .iter()
            .find(|a| a.rule_id == rule)
            .map(|a| a.status)
            .unwrap()
    };
    assert_eq!(status_of("rule-a"), AttemptStatus::Failed);
    assert_eq!(status_of("rule-b"), AttemptStatus::Sent);

    let incidents = h.incidents.all();
    let by_rule = |rule: &str| incidents.iter().find(|i| i.rule_id == rule).unwrap().clone();
    assert!(by_rule("rule-a").last_notified_at.is_none());
    assert!(by_rule("rule-b").last_notified_at.is_some());
}

#[tokio::test]
async fn failed_dispatch_is_retried_on_next_firing() {
    let h = harness(vec![flaky_channel("7", &["r1"])]);
    h.rules.set(vec![slow_response_rule("r1", 0, &["7"])]);
    h.probes.add_probe("p1");
    h.probes.set_response_time("p1", Some(900));

    sweep(&h).await;
    sweep(&h).await;
    assert_eq!(h.attempts.attempts().len(), 2);
    assert_eq!(open_incidents(&h).len(), 1);
}

#[tokio::test]
async fn silence_period_suppresses_repeat_notifications() {
    let h = harness(vec![flaky_channel("7", &[])]);
    h.rules.set(vec![slow_response_rule("r1", 0, &["7"])]);
    h.probes.add_probe("p1");

    h.probes.set_response_time("p1", Some(900));
    sweep(&h).await;
    h.probes.set_response_time("p1", Some(1200));
    sweep(&h).await;

    assert_eq!(h.attempts.attempts().len(), 1);
    let open = open_incidents(&h);
    assert_eq!(open.len(), 1);
    assert_eq!(open[0].trigger_count, 2);
    assert_eq!(open[0].observed_value, Some(Decimal::from(1200)));
}

#[tokio::test]
async fn recovery_resolves_and_next_breach_opens_new_incident() {
    let h = harness(vec![]);
    h.rules.set(vec![slow_response_rule("r1", 0, &[])]);
    h.probes.add_probe("p1");

    h.probes.set_response_time("p1", Some(900));
    sweep(&h).await;
    let first = open_incidents(&h).remove(0);

    h.probes.set_response_time("p1", Some(120));
    sweep(&h).await;
    assert!(open_incidents(&h).is_empty());

    h.probes.set_response_time("p1", Some(900));
    sweep(&h).await;
    let all = h.incidents.all();
    assert_eq!(all.len(), 2);
    let resolved = all.iter().find(|i| i.id == first.id).unwrap();
    assert_eq!(resolved.status, IncidentStatus::Resolved);
    assert_eq!(open_incidents(&h).len(), 1);
    assert_ne!(open_incidents(&h)[0].id, first.id);
}

#[tokio::test]
async fn missing_data_resolves_and_clears_progress() {
    let h = harness(vec![]);
    h.rules.set(vec![slow_response_rule("r1", 0, &[])]);
    h.probes.add_probe("p1");
    h.probes.set_response_time("p1", Some(900));
    sweep(&h).await;
    assert_eq!(open_incidents(&h).len(), 1);

    h.probes.set_response_time("p1", None);
    sweep(&h).await;
    assert!(open_incidents(&h).is_empty());
    assert_eq!(h.engine.hysteresis().count("r1", "p1"), 0);
}

#[tokio::test]
async fn vanished_target_is_resolved() {
    let h = harness(vec![]);
    h.rules.set(vec![slow_response_rule("r1", 0, &[])]);
    h.probes.add_probe("p1");
    h.probes.set_response_time("p1", Some(900));
    sweep(&h).await;

    h.probes.remove_probe("p1");
    sweep(&h).await;
    assert!(open_incidents(&h).is_empty());
}

#[tokio::test]
async fn invalid_rule_never_resolves_open_incident() {
    let h = harness(vec![]);
    let mut rule = slow_response_rule("r1", 0, &[]);
    h.rules.set(vec![rule.clone()]);
    h.probes.add_probe("p1");
    h.probes.set_response_time("p1", Some(900));
    sweep(&h).await;

    rule.operator = "between".to_string();
    h.rules.set(vec![rule]);
    sweep(&h).await;
    assert_eq!(open_incidents(&h).len(), 1);
}

#[tokio::test]
async fn acknowledged_incident_is_refreshed_without_notification() {
    let h = harness(vec![flaky_channel("7", &[])]);
    let mut rule = slow_response_rule("r1", 0, &["7"]);
    rule.silence_secs = 0;
    h.rules.set(vec![rule]);
    h.probes.add_probe("p1");
    h.probes.set_response_time("p1", Some(900));
    sweep(&h).await;

    let id = open_incidents(&h)[0].id.clone();
    h.engine.incidents().acknowledge(&id, "oncall").await.unwrap();
    sweep(&h).await;

    assert_eq!(h.attempts.attempts().len(), 1);
    let open = open_incidents(&h);
    assert_eq!(open[0].status, IncidentStatus::Acknowledged);
    assert_eq!(open[0].trigger_count, 2);
}

#[tokio::test]
async fn manual_evaluation_uses_the_sweep_pipeline() {
    let h = harness(vec![flaky_channel("7", &[])]);
    let mut disabled = slow_response_rule("off", 0, &["7"]);
    disabled.enabled = false;
    h.rules.set(vec![slow_response_rule("r1", 0, &["7"]), disabled]);
    h.probes.add_probe("p1");
    h.probes.set_response_time("p1", Some(900));

    let result = h.engine.evaluate_rule_once("r1").await.unwrap();
    assert_eq!(result.status, ManualStatus::Ok);
    assert_eq!(result.triggered_incidents.len(), 1);
    assert!(result.triggered_incidents[0].last_notified_at.is_some());
    assert_eq!(h.attempts.attempts().len(), 1);

    let result = h.engine.evaluate_rule_once("off").await.unwrap();
    assert_eq!(result.status, ManualStatus::Disabled);
    assert!(result.triggered_incidents.is_empty());

    let err = h.engine.evaluate_rule_once("nope").await.unwrap_err();
    assert!(matches!(err, AlertError::RuleNotFound(_)));
}

#[tokio::test]
async fn cancelled_sweep_stops_before_next_rule() {
    let h = harness(vec![]);
    h.rules.set(vec![
        slow_response_rule("r1", 0, &[]),
        slow_response_rule("r2", 0, &[]),
    ]);
    h.probes.add_probe("p1");
    h.probes.set_response_time("p1", Some(900));

    let cancel = CancellationToken::new();
    cancel.cancel();
    let stats = h.engine.sweep_tenant(TENANT, &cancel).await.unwrap();
    assert!(stats.cancelled);
    assert_eq!(stats.rules, 0);
    assert!(h.incidents.all().is_empty());
}

#[tokio::test]
async fn shared_target_sample_is_read_once_per_sweep() {
    let h = harness(vec![]);
    h.rules.set(vec![
        slow_response_rule("r1", 0, &[]),
        slow_response_rule("r2", 0, &[]),
    ]);
    h.probes.add_probe("p1");
    h.probes.set_response_time("p1", Some(100));

    let mut cache = SampleCache::default();
    for rule in h.rules.list_enabled_rules(TENANT).await.unwrap() {
        h.engine.evaluate_rule(&rule, &mut cache).await.unwrap();
    }
    assert_eq!(h.probes.reads(), 1);
}

#[tokio::test]
async fn failing_rule_is_skipped_and_others_still_fire() {
    let h = harness(vec![]);
    h.rules.set(vec![
        slow_response_rule("r1", 0, &[]),
        slow_response_rule("r2", 0, &[]),
        slow_response_rule("r3", 0, &[]),
    ]);
    h.probes.add_probe("p1");
    h.probes.set_response_time("p1", Some(600));
    h.probes.unresolvable_rules.lock().unwrap().insert("r2".to_string());

    let stats = h
        .engine
        .sweep_tenant(TENANT, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(stats.rules, 3);
    assert_eq!(stats.failed_rules, 1);
    assert_eq!(stats.fired, 2);

    let mut fired: Vec<String> = open_incidents(&h).into_iter().map(|i| i.rule_id).collect();
    fired.sort();
    assert_eq!(fired, vec!["r1", "r3"]);
}

#[tokio::test]
async fn failing_target_does_not_stop_its_siblings() {
    let h = harness(vec![]);
    h.rules.set(vec![slow_response_rule("r1", 0, &[])]);
    for id in ["p1", "p2", "p3"] {
        h.probes.add_probe(id);
        h.probes.set_response_time(id, Some(600));
    }
    h.probes.failing_samples.lock().unwrap().insert("p2".to_string());

    let stats = h
        .engine
        .sweep_tenant(TENANT, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(stats.failed_rules, 0);
    assert_eq!(stats.fired, 2);
    let mut targets: Vec<String> = open_incidents(&h).into_iter().map(|i| i.target_id).collect();
    targets.sort();
    assert_eq!(targets, vec!["p1", "p3"]);

    h.probes.failing_samples.lock().unwrap().clear();
    sweep(&h).await;
    assert_eq!(open_incidents(&h).len(), 3);
}

fn fast_settings() -> LoopSettings {
    LoopSettings {
        evaluation_interval: Duration::from_millis(50),
        cleanup_interval: Duration::from_secs(1),
        stop_timeout: Duration::from_secs(2),
    }
}

#[tokio::test]
async fn stop_during_sweep_then_immediate_restart_keeps_one_loop() {
    let h = harness(vec![]);
    let rules: Vec<AlertRule> = (0..20)
        .map(|i| {
            let mut rule = slow_response_rule(&format!("r{i}"), 0, &[]);
            rule.target_selector = Some(format!("p{i}"));
            rule
        })
        .collect();
    h.rules.set(rules);
    for i in 0..20 {
        h.probes.add_probe(&format!("p{i}"));
        h.probes.set_response_time(&format!("p{i}"), Some(100));
    }
    *h.probes.delay.lock().unwrap() = Duration::from_millis(50);

    let supervisor = Supervisor::new(h.engine.clone(), fast_settings());
    assert!(!supervisor.start_monitoring(TENANT).await);
    tokio::time::sleep(Duration::from_millis(120)).await;
    assert!(h.probes.reads() > 0);

    let started = Instant::now();
    assert!(supervisor.stop_monitoring(TENANT).await);
    assert!(started.elapsed() < Duration::from_secs(1));
    assert!(!supervisor.is_running(TENANT).await);

    let reads_after_stop = h.probes.reads();
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(h.probes.reads(), reads_after_stop);

    assert!(!supervisor.start_monitoring(TENANT).await);
    assert!(supervisor.start_monitoring(TENANT).await);
    let status = supervisor.status().await;
    assert_eq!(status.running_tenants, vec![TENANT.to_string()]);

    assert_eq!(supervisor.stop_all().await, 1);
    assert!(supervisor.status().await.running_tenants.is_empty());
}

#[tokio::test]
async fn stop_of_unknown_tenant_is_a_no_op() {
    let h = harness(vec![]);
    let supervisor = Supervisor::new(h.engine.clone(), fast_settings());
    assert!(!supervisor.stop_monitoring("nobody").await);
    assert_eq!(supervisor.stop_all().await, 0);
}

#[tokio::test]
async fn autostart_starts_tenants_with_enabled_rules() {
    let h = harness(vec![]);
    let mut other = slow_response_rule("x", 0, &[]);
    other.tenant_id = "tenant-b".to_string();
    let mut disabled = slow_response_rule("y", 0, &[]);
    disabled.tenant_id = "tenant-c".to_string();
    disabled.enabled = false;
    h.rules.set(vec![slow_response_rule("r1", 0, &[]), other, disabled]);

    let supervisor = Supervisor::new(h.engine.clone(), fast_settings());
    assert_eq!(supervisor.autostart().await.unwrap(), 2);
    let status = supervisor.status().await;
    assert_eq!(status.running_tenants, vec!["tenant-a", "tenant-b"]);
    assert_eq!(status.interval_secs, 0);
    supervisor.stop_all().await;
}

#[tokio::test]
async fn loop_survives_failed_and_panicking_sweeps() {
    let h = harness(vec![]);
    h.rules.set(vec![slow_response_rule("r1", 0, &[])]);
    h.probes.add_probe("p1");
    h.probes.set_response_time("p1", Some(600));

    let supervisor = Supervisor::new(h.engine.clone(), fast_settings());
    h.rules.listing_fails.store(true, Ordering::SeqCst);
    supervisor.start_monitoring(TENANT).await;
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(supervisor.is_running(TENANT).await);
    assert_eq!(h.probes.reads(), 0);

    h.rules.listing_fails.store(false, Ordering::SeqCst);
    h.probes.panic_on_read.store(true, Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(200)).await;
    let reads_while_panicking = h.probes.reads();
    assert!(reads_while_panicking >= 2);
    assert!(supervisor.is_running(TENANT).await);
    assert!(h.incidents.all().is_empty());

    h.probes.panic_on_read.store(false, Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(h.probes.reads() > reads_while_panicking);
    assert!(supervisor.is_running(TENANT).await);
    assert_eq!(open_incidents(&h).len(), 1);

    assert!(supervisor.stop_monitoring(TENANT).await);
}

#[tokio::test]
async fn overrunning_sweep_is_aborted_before_restart() {
    let h = harness(vec![]);
    h.rules.set(vec![slow_response_rule("r1", 0, &[])]);
    h.probes.add_probe("p1");
    h.probes.set_response_time("p1", Some(600));
    *h.probes.delay.lock().unwrap() = Duration::from_secs(5);

    let settings = LoopSettings {
        evaluation_interval: Duration::from_millis(50),
        cleanup_interval: Duration::from_secs(1),
        stop_timeout: Duration::from_millis(400),
    };
    let supervisor = Arc::new(Supervisor::new(h.engine.clone(), settings));
    supervisor.start_monitoring(TENANT).await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(h.probes.reads(), 1);

    let stopping = {
        let supervisor = supervisor.clone();
        tokio::spawn(async move { supervisor.stop_monitoring(TENANT).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    // status does not wait for the loop being stopped
    let status = tokio::time::timeout(Duration::from_millis(100), supervisor.status())
        .await
        .unwrap();
    assert!(status.running_tenants.is_empty());

    let started = Instant::now();
    assert!(stopping.await.unwrap());
    assert!(started.elapsed() < Duration::from_secs(1));

    // the interrupted sample read never completes into an incident
    *h.probes.delay.lock().unwrap() = Duration::ZERO;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(h.incidents.all().is_empty());
    assert_eq!(h.probes.reads(), 1);

    assert!(!supervisor.start_monitoring(TENANT).await);
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(open_incidents(&h).len(), 1);
    supervisor.stop_all().await;
}
