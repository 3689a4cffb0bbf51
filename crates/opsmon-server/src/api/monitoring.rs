use crate::api::incidents::IncidentResponse;
use crate::api::{alert_error_response, success_response};
use crate::logging::TraceId;
use crate::monitor::{ManualStatus, MonitorStatus};
use crate::state::AppState;
use axum::extract::{Extension, Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::Serialize;
use utoipa::ToSchema;
use utoipa_axum::{router::OpenApiRouter, routes};

#[derive(Serialize, ToSchema)]
pub struct TenantLoopResponse {
    pub tenant_id: String,
    /// Whether a loop is running after the call.
    pub running: bool,
    /// Whether a loop was running before the call (start replaces it, stop ends it).
    pub was_running: bool,
}

#[derive(Serialize, ToSchema)]
pub struct EvaluateRuleResponse {
    /// `ok`, or `disabled` when the rule is switched off and nothing was evaluated.
    pub status: String,
    /// Incidents opened or refreshed by this evaluation.
    pub triggered_incidents: Vec<IncidentResponse>,
}

/// Running tenant loops, sweep interval and hysteresis cache size.
#[utoipa::path(
    get,
    path = "/v1/monitoring/status",
    tag = "Monitoring",
    responses(
        (status = 200, description = "Monitoring status", body = MonitorStatus)
    )
)]
async fn monitoring_status(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    success_response(StatusCode::OK, &trace_id, state.supervisor.status().await)
}

/// Starts (or restarts) the tenant's monitoring loop.
#[utoipa::path(
    post,
    path = "/v1/monitoring/tenants/{tenant_id}/start",
    tag = "Monitoring",
    params(("tenant_id" = String, Path, description = "Tenant id")),
    responses(
        (status = 200, description = "Loop started", body = TenantLoopResponse)
    )
)]
async fn start_monitoring(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    Path(tenant_id): Path<String>,
) -> impl IntoResponse {
    let was_running = state.supervisor.start_monitoring(&tenant_id).await;
    tracing::info!(tenant_id = %tenant_id, restarted = was_running, "Monitoring started via API");
    success_response(
        StatusCode::OK,
        &trace_id,
        TenantLoopResponse {
            tenant_id,
            running: true,
            was_running,
        },
    )
}

/// Stops the tenant's monitoring loop and waits for it to exit.
#[utoipa::path(
    post,
    path = "/v1/monitoring/tenants/{tenant_id}/stop",
    tag = "Monitoring",
    params(("tenant_id" = String, Path, description = "Tenant id")),
    responses(
        (status = 200, description = "Loop stopped", body = TenantLoopResponse)
    )
)]
async fn stop_monitoring(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    Path(tenant_id): Path<String>,
) -> impl IntoResponse {
    let was_running = state.supervisor.stop_monitoring(&tenant_id).await;
    tracing::info!(tenant_id = %tenant_id, was_running, "Monitoring stopped via API");
    success_response(
        StatusCode::OK,
        &trace_id,
        TenantLoopResponse {
            tenant_id,
            running: false,
            was_running,
        },
    )
}

/// Evaluates one rule now, through the same pipeline as the scheduled sweep.
#[utoipa::path(
    post,
    path = "/v1/alerts/rules/{id}/evaluate",
    tag = "Alerts",
    params(("id" = String, Path, description = "Alert rule id")),
    responses(
        (status = 200, description = "Evaluation result", body = EvaluateRuleResponse),
        (status = 404, description = "Rule not found", body = crate::api::ApiError)
    )
)]
async fn evaluate_rule(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.engine().evaluate_rule_once(&id).await {
        Ok(result) => {
            let status = match result.status {
                ManualStatus::Ok => "ok",
                ManualStatus::Disabled => "disabled",
            };
            success_response(
                StatusCode::OK,
                &trace_id,
                EvaluateRuleResponse {
                    status: status.to_string(),
                    triggered_incidents: result
                        .triggered_incidents
                        .into_iter()
                        .map(IncidentResponse::from)
                        .collect(),
                },
            )
        }
        Err(e) => alert_error_response(&trace_id, &e),
    }
}

pub fn monitoring_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(monitoring_status))
        .routes(routes!(start_monitoring))
        .routes(routes!(stop_monitoring))
        .routes(routes!(evaluate_rule))
}
