use crate::api::pagination::{self, deserialize_optional_u64};
use crate::api::{
    alert_error_response, error_response, storage_error_response, success_paginated_response,
    success_response,
};
use crate::logging::TraceId;
use crate::state::AppState;
use axum::extract::{Extension, Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use chrono::{DateTime, Utc};
use opsmon_common::types::{Incident, IncidentStatus, NotificationAttempt};
use opsmon_storage::store::incident::IncidentFilter;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use utoipa_axum::{router::OpenApiRouter, routes};

#[derive(Serialize, ToSchema)]
pub struct IncidentResponse {
    pub id: String,
    pub tenant_id: String,
    pub rule_id: String,
    pub rule_name: String,
    pub target_id: String,
    pub target_name: String,
    /// `host` or `probe`
    pub target_kind: String,
    pub metric: String,
    pub severity: String,
    /// `active`, `acknowledged`, `ignored` or `resolved`
    pub status: String,
    /// Decimal string.
    pub observed_value: Option<String>,
    pub threshold_value: String,
    pub message: String,
    pub trigger_count: i64,
    pub first_triggered_at: DateTime<Utc>,
    pub last_triggered_at: DateTime<Utc>,
    pub last_notified_at: Option<DateTime<Utc>>,
    pub acknowledged_at: Option<DateTime<Utc>>,
    pub acknowledged_by: Option<String>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Incident> for IncidentResponse {
    fn from(i: Incident) -> Self {
        Self {
            target_kind: i.target_kind.to_string(),
            severity: i.severity.to_string(),
            status: i.status.to_string(),
            observed_value: i.observed_value.map(|v| v.normalize().to_string()),
            threshold_value: i.threshold_value.normalize().to_string(),
            id: i.id,
            tenant_id: i.tenant_id,
            rule_id: i.rule_id,
            rule_name: i.rule_name,
            target_id: i.target_id,
            target_name: i.target_name,
            metric: i.metric,
            message: i.message,
            trigger_count: i.trigger_count,
            first_triggered_at: i.first_triggered_at,
            last_triggered_at: i.last_triggered_at,
            last_notified_at: i.last_notified_at,
            acknowledged_at: i.acknowledged_at,
            acknowledged_by: i.acknowledged_by,
            resolved_at: i.resolved_at,
            created_at: i.created_at,
            updated_at: i.updated_at,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct NotificationAttemptResponse {
    pub id: String,
    pub channel_id: String,
    pub channel_name: String,
    pub channel_type: String,
    /// `sent` or `failed`
    pub status: String,
    pub detail: Option<String>,
    pub duration_ms: i64,
    pub created_at: DateTime<Utc>,
}

impl From<NotificationAttempt> for NotificationAttemptResponse {
    fn from(a: NotificationAttempt) -> Self {
        Self {
            status: a.status.as_str().to_string(),
            id: a.id,
            channel_id: a.channel_id,
            channel_name: a.channel_name,
            channel_type: a.channel_type,
            detail: a.detail,
            duration_ms: a.duration_ms,
            created_at: a.created_at,
        }
    }
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
struct ListIncidentsParams {
    #[param(required = false)]
    tenant_id: Option<String>,
    /// `active`, `acknowledged`, `ignored` or `resolved`
    #[param(required = false)]
    status: Option<String>,
    #[param(required = false)]
    rule_id: Option<String>,
    /// Page size (default 20, max 1000)
    #[param(required = false)]
    #[serde(default, deserialize_with = "deserialize_optional_u64")]
    limit: Option<u64>,
    #[param(required = false)]
    #[serde(default, deserialize_with = "deserialize_optional_u64")]
    offset: Option<u64>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct AcknowledgeRequest {
    pub user_id: String,
}

/// Incidents, newest first.
#[utoipa::path(
    get,
    path = "/v1/alerts/incidents",
    tag = "Incidents",
    params(ListIncidentsParams),
    responses(
        (status = 200, description = "Paginated incidents", body = Vec<IncidentResponse>),
        (status = 400, description = "Unknown status filter", body = crate::api::ApiError)
    )
)]
async fn list_incidents(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    Query(params): Query<ListIncidentsParams>,
) -> impl IntoResponse {
    let status = match params.status.as_deref().map(str::parse::<IncidentStatus>) {
        None => None,
        Some(Ok(s)) => Some(s),
        Some(Err(e)) => {
            return error_response(StatusCode::BAD_REQUEST, &trace_id, "bad_request", &e);
        }
    };
    let filter = IncidentFilter {
        tenant_id: params.tenant_id,
        status,
        rule_id: params.rule_id,
    };
    let limit = pagination::resolve_limit(params.limit);
    let offset = pagination::resolve_offset(params.offset);

    let total = match state.store.count_incidents(&filter).await {
        Ok(total) => total,
        Err(e) => return storage_error_response(&trace_id, &e, "Failed to count incidents"),
    };
    match state.store.list_incidents(&filter, limit, offset).await {
        Ok(incidents) => success_paginated_response(
            StatusCode::OK,
            &trace_id,
            incidents.into_iter().map(IncidentResponse::from).collect(),
            total,
            limit as usize,
            offset as usize,
        ),
        Err(e) => storage_error_response(&trace_id, &e, "Failed to list incidents"),
    }
}

/// Incident detail.
#[utoipa::path(
    get,
    path = "/v1/alerts/incidents/{id}",
    tag = "Incidents",
    params(("id" = String, Path, description = "Incident id")),
    responses(
        (status = 200, description = "Incident", body = IncidentResponse),
        (status = 404, description = "Incident not found", body = crate::api::ApiError)
    )
)]
async fn get_incident(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.engine().incidents().get(&id).await {
        Ok(incident) => success_response(StatusCode::OK, &trace_id, IncidentResponse::from(incident)),
        Err(e) => alert_error_response(&trace_id, &e),
    }
}

/// Notification attempts recorded for an incident, oldest first.
#[utoipa::path(
    get,
    path = "/v1/alerts/incidents/{id}/notifications",
    tag = "Incidents",
    params(("id" = String, Path, description = "Incident id")),
    responses(
        (status = 200, description = "Notification attempts", body = Vec<NotificationAttemptResponse>),
        (status = 404, description = "Incident not found", body = crate::api::ApiError)
    )
)]
async fn incident_notifications(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    if let Err(e) = state.engine().incidents().get(&id).await {
        return alert_error_response(&trace_id, &e);
    }
    match state.store.list_attempts_for_incident(&id).await {
        Ok(attempts) => success_response(
            StatusCode::OK,
            &trace_id,
            attempts
                .into_iter()
                .map(NotificationAttemptResponse::from)
                .collect::<Vec<_>>(),
        ),
        Err(e) => storage_error_response(&trace_id, &e, "Failed to list notification attempts"),
    }
}

/// Acknowledges an active incident. Acknowledged incidents stay open but are not re-notified.
#[utoipa::path(
    post,
    path = "/v1/alerts/incidents/{id}/acknowledge",
    tag = "Incidents",
    params(("id" = String, Path, description = "Incident id")),
    request_body = AcknowledgeRequest,
    responses(
        (status = 200, description = "Incident acknowledged", body = IncidentResponse),
        (status = 400, description = "Missing user_id", body = crate::api::ApiError),
        (status = 404, description = "Incident not found", body = crate::api::ApiError),
        (status = 409, description = "Transition not allowed", body = crate::api::ApiError)
    )
)]
async fn acknowledge_incident(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<AcknowledgeRequest>,
) -> impl IntoResponse {
    let user_id = req.user_id.trim();
    if user_id.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, &trace_id, "bad_request", "user_id is required");
    }
    match state.engine().incidents().acknowledge(&id, user_id).await {
        Ok(incident) => success_response(StatusCode::OK, &trace_id, IncidentResponse::from(incident)),
        Err(e) => alert_error_response(&trace_id, &e),
    }
}

/// Closes an open incident as ignored.
#[utoipa::path(
    post,
    path = "/v1/alerts/incidents/{id}/ignore",
    tag = "Incidents",
    params(("id" = String, Path, description = "Incident id")),
    responses(
        (status = 200, description = "Incident ignored", body = IncidentResponse),
        (status = 404, description = "Incident not found", body = crate::api::ApiError),
        (status = 409, description = "Transition not allowed", body = crate::api::ApiError)
    )
)]
async fn ignore_incident(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.engine().incidents().ignore(&id).await {
        Ok(incident) => success_response(StatusCode::OK, &trace_id, IncidentResponse::from(incident)),
        Err(e) => alert_error_response(&trace_id, &e),
    }
}

/// Resolves an open incident.
#[utoipa::path(
    post,
    path = "/v1/alerts/incidents/{id}/resolve",
    tag = "Incidents",
    params(("id" = String, Path, description = "Incident id")),
    responses(
        (status = 200, description = "Incident resolved", body = IncidentResponse),
        (status = 404, description = "Incident not found", body = crate::api::ApiError),
        (status = 409, description = "Transition not allowed", body = crate::api::ApiError)
    )
)]
async fn resolve_incident(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.engine().incidents().resolve(&id).await {
        Ok(incident) => success_response(StatusCode::OK, &trace_id, IncidentResponse::from(incident)),
        Err(e) => alert_error_response(&trace_id, &e),
    }
}

pub fn incident_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(list_incidents))
        .routes(routes!(get_incident))
        .routes(routes!(incident_notifications))
        .routes(routes!(acknowledge_incident))
        .routes(routes!(ignore_incident))
        .routes(routes!(resolve_incident))
}
