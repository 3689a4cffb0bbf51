#![allow(dead_code)]

use anyhow::Result;
use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use chrono::Utc;
use opsmon_common::types::{AlertRule, ProbeResult, Severity, TargetKind};
use opsmon_server::app;
use opsmon_server::config::{DatabaseConfig, MonitorConfig, ServerConfig};
use opsmon_server::state::AppState;
use opsmon_storage::store::ProbeRecord;
use opsmon_storage::MonitorStore;
use rust_decimal::Decimal;
use serde_json::Value;
use std::sync::Arc;
use tempfile::TempDir;
use tower::util::ServiceExt;

pub const TENANT: &str = "tenant-a";

pub struct TestContext {
    pub temp_dir: TempDir,
    pub state: AppState,
    pub app: axum::Router,
}

pub async fn build_test_context() -> Result<TestContext> {
    opsmon_common::id::init(1, 1);

    let temp_dir = tempfile::tempdir()?;
    let url = format!(
        "sqlite://{}?mode=rwc",
        temp_dir.path().join("opsmon.db").display()
    );
    let store = Arc::new(MonitorStore::new(&url).await?);

    let config = ServerConfig {
        http_port: 0,
        database: DatabaseConfig { url },
        monitor: MonitorConfig {
            evaluation_interval_secs: 3600,
            autostart: false,
            ..MonitorConfig::default()
        },
    };
    let state = AppState::new(store, config);
    let app = app::build_http_app(state.clone());

    Ok(TestContext {
        temp_dir,
        state,
        app,
    })
}

pub async fn request_json(
    app: &axum::Router,
    method: &str,
    uri: &str,
    body: Option<Value>,
) -> (StatusCode, Value, Option<String>) {
    let req = Request::builder()
        .method(method)
        .uri(uri)
        .header("Content-Type", "application/json")
        .body(Body::from(body.unwrap_or(Value::Null).to_string()))
        .expect("request should build");

    let resp = app
        .clone()
        .oneshot(req)
        .await
        .expect("request should succeed");
    let status = resp.status();
    let trace_header = resp
        .headers()
        .get("X-Trace-Id")
        .and_then(|v| v.to_str().ok())
        .map(String::from);
    let bytes = to_bytes(resp.into_body(), usize::MAX)
        .await
        .expect("body should read");
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, json, trace_header)
}

pub fn assert_ok_envelope(body: &Value) {
    assert_eq!(body["err_code"], 0, "unexpected envelope: {body}");
    assert_eq!(body["err_msg"], "success");
    assert!(body["trace_id"].as_str().is_some_and(|t| t.len() == 16));
}

pub fn slow_api_rule(id: &str) -> AlertRule {
    AlertRule {
        id: id.to_string(),
        tenant_id: TENANT.to_string(),
        name: format!("slow api {id}"),
        target_kind: TargetKind::Probe,
        target_selector: None,
        metric: "response_time".to_string(),
        operator: ">".to_string(),
        threshold: Decimal::from(500),
        consecutive_failures: 1,
        silence_secs: 600,
        severity: Severity::Critical,
        channel_ids: Vec::new(),
        enabled: true,
    }
}

/// Registers probe `probe_id` with one fresh result of `response_ms`.
pub async fn probe_with_response(store: &MonitorStore, probe_id: &str, response_ms: i64) -> Result<()> {
    store
        .save_probe(&ProbeRecord {
            id: probe_id.to_string(),
            tenant_id: TENANT.to_string(),
            name: format!("{probe_id}-health"),
            probe_type: "http".to_string(),
            endpoint: "https://api.example.com/health".to_string(),
            enabled: true,
        })
        .await?;
    store
        .insert_probe_result(&ProbeResult {
            probe_id: probe_id.to_string(),
            success: true,
            response_time_ms: Some(Decimal::from(response_ms)),
            status_code: Some(200),
            error: None,
            checked_at: Utc::now(),
        })
        .await?;
    Ok(())
}
