use crate::store::incident::IncidentFilter;
use crate::store::{HostRecord, MonitorStore, ProbeRecord};
use chrono::{Duration, Utc};
use opsmon_alert::error::AlertError;
use opsmon_alert::incident::IncidentStore;
use opsmon_alert::source::RuleSource;
use opsmon_common::types::{
    AlertRule, AttemptStatus, HostSnapshot, IncidentDraft, IncidentStatus, NotificationAttempt,
    NotificationChannelConfig, ProbeResult, Severity, TargetKind, Transition,
};
use opsmon_notify::dispatcher::{AttemptLog, ChannelSource};
use rust_decimal::Decimal;
use std::sync::Arc;
use tempfile::TempDir;

fn dec(s: &str) -> Decimal {
    s.parse().unwrap()
}

async fn setup() -> (TempDir, Arc<MonitorStore>) {
    let dir = TempDir::new().unwrap();
    let url = format!("sqlite://{}?mode=rwc", dir.path().join("opsmon.db").display());
    let store = MonitorStore::new(&url).await.unwrap();
    (dir, Arc::new(store))
}

fn rule(id: &str, tenant: &str, enabled: bool) -> AlertRule {
    AlertRule {
        id: id.into(),
        tenant_id: tenant.into(),
        name: format!("rule {id}"),
        target_kind: TargetKind::Probe,
        target_selector: Some("api-*".into()),
        metric: "response_time".into(),
        operator: ">".into(),
        threshold: dec("500.25"),
        consecutive_failures: 3,
        silence_secs: 600,
        severity: Severity::Critical,
        channel_ids: vec!["c2".into(), "c1".into()],
        enabled,
    }
}

fn draft(rule_id: &str, target_id: &str, observed: &str) -> IncidentDraft {
    IncidentDraft {
        tenant_id: "t1".into(),
        rule_id: rule_id.into(),
        rule_name: "latency".into(),
        target_id: target_id.into(),
        target_name: "api-health".into(),
        target_kind: TargetKind::Probe,
        metric: "response_time".into(),
        severity: Severity::Warning,
        observed_value: Some(dec(observed)),
        threshold_value: dec("500"),
        message: format!("observed {observed}"),
    }
}

#[tokio::test]
async fn rules_round_trip_with_exact_threshold() {
    let (_dir, store) = setup().await;
    store.save_rule(&rule("r1", "t1", true)).await.unwrap();

    let loaded = store.get_rule("r1").await.unwrap().unwrap();
    assert_eq!(loaded.threshold, dec("500.25"));
    assert_eq!(loaded.channel_ids, vec!["c2", "c1"]);
    assert_eq!(loaded.target_selector.as_deref(), Some("api-*"));
    assert_eq!(loaded.silence_secs, 600);
    assert_eq!(loaded.severity, Severity::Critical);
}

#[tokio::test]
async fn save_rule_overwrites_existing_id() {
    let (_dir, store) = setup().await;
    store.save_rule(&rule("r1", "t1", true)).await.unwrap();
    let mut changed = rule("r1", "t1", true);
    changed.threshold = dec("900");
    store.save_rule(&changed).await.unwrap();

    let rules = store.list_enabled_rules("t1").await.unwrap();
    assert_eq!(rules.len(), 1);
    assert_eq!(rules[0].threshold, dec("900"));
}

#[tokio::test]
async fn enabled_rules_are_tenant_scoped() {
    let (_dir, store) = setup().await;
    store.save_rule(&rule("r1", "t1", true)).await.unwrap();
    store.save_rule(&rule("r2", "t1", false)).await.unwrap();
    store.save_rule(&rule("r3", "t2", true)).await.unwrap();

    let t1 = store.list_enabled_rules("t1").await.unwrap();
    assert_eq!(t1.iter().map(|r| r.id.as_str()).collect::<Vec<_>>(), vec!["r1"]);
    assert_eq!(store.list_monitored_tenants().await.unwrap(), vec!["t1", "t2"]);

    store.save_rule(&rule("r3", "t2", false)).await.unwrap();
    assert_eq!(store.list_monitored_tenants().await.unwrap(), vec!["t1"]);
    // disabled rules stay readable
    assert!(store.get_rule("r2").await.unwrap().is_some());
}

#[tokio::test]
async fn channels_listed_per_tenant() {
    let (_dir, store) = setup().await;
    for (id, tenant, enabled) in [("c1", "t1", true), ("c2", "t1", false), ("c3", "t2", true)] {
        store
            .save_channel(&NotificationChannelConfig {
                id: id.into(),
                tenant_id: tenant.into(),
                name: id.into(),
                channel_type: "webhook".into(),
                config: serde_json::json!({"url": "http://localhost/hook"}),
                enabled,
            })
            .await
            .unwrap();
    }
    let channels = store.list_channels("t1").await.unwrap();
    assert_eq!(channels.len(), 2);
    assert!(channels.iter().any(|c| c.id == "c2" && !c.enabled));
    assert_eq!(channels[0].config["url"], "http://localhost/hook");
}

#[tokio::test]
async fn latest_sample_respects_staleness() {
    let (_dir, store) = setup().await;
    store
        .save_probe(&ProbeRecord {
            id: "p1".into(),
            tenant_id: "t1".into(),
            name: "api-health".into(),
            probe_type: "http".into(),
            endpoint: "https://api.example.com/health".into(),
            enabled: true,
        })
        .await
        .unwrap();
    store
        .save_host(&HostRecord {
            id: "h1".into(),
            tenant_id: "t1".into(),
            name: "web-01".into(),
            address: None,
            enabled: true,
        })
        .await
        .unwrap();

    let domains = store.target_domains(300);
    let probes = domains.get(TargetKind::Probe).unwrap();
    let hosts = domains.get(TargetKind::Host).unwrap();

    let probe_targets = probes.resolver.list_targets("t1").await.unwrap();
    assert_eq!(probe_targets.len(), 1);
    let probe = &probe_targets[0];
    assert!(probes.samples.latest_sample(probe).await.unwrap().is_none());

    store
        .insert_probe_result(&ProbeResult {
            probe_id: "p1".into(),
            success: true,
            response_time_ms: Some(dec("120")),
            status_code: Some(200),
            error: None,
            checked_at: Utc::now() - Duration::seconds(900),
        })
        .await
        .unwrap();
    assert!(probes.samples.latest_sample(probe).await.unwrap().is_none());

    store
        .insert_probe_result(&ProbeResult {
            probe_id: "p1".into(),
            success: false,
            response_time_ms: None,
            status_code: None,
            error: Some("timeout".into()),
            checked_at: Utc::now(),
        })
        .await
        .unwrap();
    let sample = probes.samples.latest_sample(probe).await.unwrap().unwrap();
    assert!(!sample.is_success());

    let host = &hosts.resolver.list_targets("t1").await.unwrap()[0];
    store
        .insert_host_snapshot(&HostSnapshot {
            host_id: "h1".into(),
            cpu_percent: Some(dec("97.5")),
            memory_percent: Some(dec("40")),
            disk_percent: None,
            load_avg: None,
            collected_at: Utc::now(),
        })
        .await
        .unwrap();
    let sample = hosts.samples.latest_sample(host).await.unwrap().unwrap();
    match sample {
        opsmon_common::types::Sample::Host(s) => {
            assert_eq!(s.cpu_percent, Some(dec("97.5")));
            assert_eq!(s.disk_percent, None);
        }
        other => panic!("unexpected sample {other:?}"),
    }
}

#[tokio::test]
async fn disabled_probes_are_not_targets() {
    let (_dir, store) = setup().await;
    let mut probe = ProbeRecord {
        id: "p1".into(),
        tenant_id: "t1".into(),
        name: "api".into(),
        probe_type: "tcp".into(),
        endpoint: "10.0.0.1:443".into(),
        enabled: true,
    };
    store.save_probe(&probe).await.unwrap();
    assert_eq!(store.list_probes("t1").await.unwrap().len(), 1);

    probe.enabled = false;
    store.save_probe(&probe).await.unwrap();
    assert!(store.list_probes("t1").await.unwrap().is_empty());
}

#[tokio::test]
async fn open_or_refresh_keeps_single_open_incident() {
    let (_dir, store) = setup().await;
    let t0 = Utc::now();

    let first = store.open_or_refresh(&draft("r1", "p1", "600"), t0).await.unwrap();
    assert!(first.is_new());
    let second = store
        .open_or_refresh(&draft("r1", "p1", "750.5"), t0 + Duration::seconds(60))
        .await
        .unwrap();
    assert!(!second.is_new());
    assert_eq!(second.incident().id, first.incident().id);

    let stored = store.get(&first.incident().id).await.unwrap().unwrap();
    assert_eq!(stored.observed_value, Some(dec("750.5")));
    assert_eq!(stored.trigger_count, 2);
    assert_eq!(stored.first_triggered_at.timestamp(), t0.timestamp());

    let filter = IncidentFilter {
        tenant_id: Some("t1".into()),
        ..Default::default()
    };
    assert_eq!(store.count_incidents(&filter).await.unwrap(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_opens_do_not_duplicate() {
    let (_dir, store) = setup().await;
    let now = Utc::now();
    let mut handles = Vec::new();
    for _ in 0..8 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            store.open_or_refresh(&draft("r1", "p1", "600"), now).await
        }));
    }
    let mut opened = 0;
    let mut refreshed = 0;
    for h in handles {
        let outcome = h.await.unwrap().unwrap();
        if outcome.is_new() {
            opened += 1;
        } else {
            refreshed += 1;
        }
    }
    assert_eq!(opened, 1);
    assert_eq!(refreshed, 7);

    let open = store
        .list_incidents(
            &IncidentFilter {
                status: Some(IncidentStatus::Active),
                ..Default::default()
            },
            100,
            0,
        )
        .await
        .unwrap();
    assert_eq!(open.len(), 1);
    assert_eq!(open[0].trigger_count, 8);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_writers_across_targets_all_succeed() {
    let (_dir, store) = setup().await;
    let now = Utc::now();
    let mut handles = Vec::new();
    for i in 0..16 {
        let store = store.clone();
        let target = if i % 2 == 0 { "p1" } else { "p2" };
        handles.push(tokio::spawn(async move {
            let outcome = store.open_or_refresh(&draft("r1", target, "600"), now).await?;
            store.mark_notified(&outcome.incident().id, now).await?;
            Ok::<_, AlertError>(outcome.is_new())
        }));
    }
    let mut opened = 0;
    for h in handles {
        if h.await.unwrap().unwrap() {
            opened += 1;
        }
    }
    assert_eq!(opened, 2);

    let open = store.list_open_for_rule("r1").await.unwrap();
    assert_eq!(open.len(), 2);
    assert!(open.iter().all(|i| i.trigger_count == 8 && i.last_notified_at.is_some()));

    // operator transitions racing the sweep writers
    let refresh = draft("r1", &open[1].target_id, "700");
    let (a, b) = tokio::join!(
        store.transition(&open[0].id, &Transition::Resolve, now),
        store.open_or_refresh(&refresh, now),
    );
    assert_eq!(a.unwrap().status, IncidentStatus::Resolved);
    assert!(!b.unwrap().is_new());
}

#[tokio::test]
async fn transitions_persist_and_reject_illegal_moves() {
    let (_dir, store) = setup().await;
    let opened = store
        .open_or_refresh(&draft("r1", "p1", "600"), Utc::now())
        .await
        .unwrap()
        .into_incident();

    let acked = store
        .transition(&opened.id, &Transition::Acknowledge { user_id: "u1".into() }, Utc::now())
        .await
        .unwrap();
    assert_eq!(acked.status, IncidentStatus::Acknowledged);

    // acknowledged incidents still count as open
    assert!(store.find_open("r1", "p1").await.unwrap().is_some());

    let resolved = store
        .transition(&opened.id, &Transition::Resolve, Utc::now())
        .await
        .unwrap();
    assert!(resolved.resolved_at.is_some());

    let err = store
        .transition(&opened.id, &Transition::Ignore, Utc::now())
        .await
        .unwrap_err();
    assert!(matches!(err, AlertError::IllegalTransition(_)));

    let stored = store.get(&opened.id).await.unwrap().unwrap();
    assert_eq!(stored.status, IncidentStatus::Resolved);
    assert_eq!(stored.acknowledged_by.as_deref(), Some("u1"));

    let err = store
        .transition("nope", &Transition::Resolve, Utc::now())
        .await
        .unwrap_err();
    assert!(matches!(err, AlertError::IncidentNotFound(_)));
}

#[tokio::test]
async fn resolved_incident_is_not_reopened() {
    let (_dir, store) = setup().await;
    let first = store
        .open_or_refresh(&draft("r1", "p1", "600"), Utc::now())
        .await
        .unwrap()
        .into_incident();
    store
        .transition(&first.id, &Transition::Resolve, Utc::now())
        .await
        .unwrap();

    let second = store
        .open_or_refresh(&draft("r1", "p1", "600"), Utc::now())
        .await
        .unwrap();
    assert!(second.is_new());
    assert_ne!(second.incident().id, first.id);
    assert_eq!(store.list_open_for_rule("r1").await.unwrap().len(), 1);
}

#[tokio::test]
async fn mark_notified_and_attempts() {
    let (_dir, store) = setup().await;
    let incident = store
        .open_or_refresh(&draft("r1", "p1", "600"), Utc::now())
        .await
        .unwrap()
        .into_incident();
    let at = Utc::now();
    store.mark_notified(&incident.id, at).await.unwrap();
    let stored = store.get(&incident.id).await.unwrap().unwrap();
    assert_eq!(
        stored.last_notified_at.map(|t| t.timestamp_millis()),
        Some(at.timestamp_millis())
    );

    for (channel, status) in [("c1", AttemptStatus::Failed), ("c2", AttemptStatus::Sent)] {
        store
            .record_attempt(&NotificationAttempt {
                id: opsmon_common::id::next_id(),
                tenant_id: "t1".into(),
                incident_id: incident.id.clone(),
                rule_id: "r1".into(),
                channel_id: channel.into(),
                channel_name: channel.into(),
                channel_type: "webhook".into(),
                status,
                detail: None,
                duration_ms: 12,
                created_at: Utc::now(),
            })
            .await
            .unwrap();
    }
    let attempts = store.list_attempts_for_incident(&incident.id).await.unwrap();
    assert_eq!(attempts.len(), 2);
    assert_eq!(attempts[0].channel_id, "c1");
    assert_eq!(attempts[0].status, AttemptStatus::Failed);
    assert_eq!(attempts[1].status, AttemptStatus::Sent);
}
