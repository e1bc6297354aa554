use crate::infra::{ApiService, AppState};
use aid_dispatch::workflows::distribution::{distribution_router, StatusUpdate};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Extension;
use axum::Json;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::warn;

pub(crate) fn with_operational_routes(service: Arc<ApiService>) -> axum::Router {
    distribution_router(service)
        .route("/health", axum::routing::get(healthcheck))
        .route("/ready", axum::routing::get(readiness_endpoint))
        .route("/metrics", axum::routing::get(metrics_endpoint))
        .route(
            "/api/v1/deliveries/events",
            axum::routing::post(delivery_event_endpoint),
        )
}

pub(crate) async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(std::sync::atomic::Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

/// Field tracking webhook. Updates are queued for the status feed and applied in order.
pub(crate) async fn delivery_event_endpoint(
    Extension(state): Extension<AppState>,
    Json(update): Json<StatusUpdate>,
) -> Response {
    let job_id = update.job_id.clone();
    match state.status_feed.try_send(update) {
        Ok(()) => (StatusCode::ACCEPTED, Json(json!({ "status": "queued" }))).into_response(),
        Err(TrySendError::Full(_)) => {
            warn!(job = %job_id, "status feed is saturated");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "error": "status feed is saturated, retry later" })),
            )
                .into_response()
        }
        Err(TrySendError::Closed(_)) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "error": "status feed is shutting down" })),
        )
            .into_response(),
    }
}
