use crate::state::AppState;
use crate::{api, logging};
use axum::middleware;
use axum::routing::get;
use axum::{Json, Router};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "opsmon API",
        description = "Alert evaluation and notification control API",
    ),
    tags(
        (name = "Health", description = "Liveness"),
        (name = "Monitoring", description = "Tenant monitoring loops"),
        (name = "Alerts", description = "Alert rule evaluation"),
        (name = "Incidents", description = "Incident lifecycle and notification audit")
    )
)]
struct ApiDoc;

pub fn build_http_app(state: AppState) -> Router {
    let (router, api_spec) = api::routes().split_for_parts();

    let mut spec = ApiDoc::openapi();
    spec.merge(api_spec);
    let spec = Arc::new(spec);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    router
        .with_state(state)
        .route(
            "/v1/openapi.json",
            get(move || {
                let spec = spec.clone();
                async move { Json(spec.as_ref().clone()) }
            }),
        )
        .layer(cors)
        .layer(middleware::from_fn(logging::request_logging))
}
