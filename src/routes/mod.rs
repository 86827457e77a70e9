pub mod context;
pub mod devices;
pub mod health;
pub mod jobs;
pub mod metrics;
pub mod webhooks;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{OriginalUri, Query};
use axum::http::Method;
use axum::response::Response;
use axum::routing::{get, post};
use axum::{middleware, Json, Router};
use garde::Validate;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::app_state::AppState;
use crate::error::OrchestratorError;
use context::{request_id_middleware, ApiContext};

/// Request bodies are small JSON documents.
const BODY_LIMIT_BYTES: usize = 1024 * 1024;

/// Build the HTTP API. `/metrics` is mounted only when a recorder handle is given.
pub fn router(state: AppState, prometheus: Option<Arc<PrometheusHandle>>) -> Router {
    let api = Router::new()
        .route("/health", get(health::health_check))
        .route("/ready", get(health::readiness))
        .route("/api/v1/jobs", post(jobs::create_job).get(jobs::list_jobs))
        .route(
            "/api/v1/jobs/{job_id}",
            get(jobs::get_job)
                .patch(jobs::update_job)
                .delete(jobs::delete_job),
        )
        .route("/api/v1/devices", get(devices::list_devices))
        .route("/api/v1/devices/register", post(devices::register_device))
        .route(
            "/api/v1/devices/{device_id}",
            get(devices::get_device)
                .patch(devices::update_device)
                .delete(devices::delete_device),
        )
        .route(
            "/api/v1/webhooks/classification",
            post(webhooks::classification_callback),
        )
        .route("/api/v1/webhooks/device-event", post(webhooks::device_event))
        .fallback(not_found)
        .with_state(state);

    let api = match prometheus {
        Some(handle) => api.route(
            "/metrics",
            get(metrics::prometheus_metrics).with_state(handle),
        ),
        None => api,
    };

    api.layer(middleware::from_fn(request_id_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(RequestBodyLimitLayer::new(BODY_LIMIT_BYTES))
}

async fn not_found(ctx: ApiContext, method: Method, uri: OriginalUri) -> Response {
    ctx.fail(OrchestratorError::NotFound(format!(
        "no route for {} {}",
        method,
        uri.0.path()
    )))
}

/// Unwrap a JSON body and run its field rules.
pub(crate) fn validated_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, OrchestratorError>
where
    T: Validate,
    T::Context: Default,
{
    let Json(body) = payload.map_err(|e| OrchestratorError::Validation(e.body_text()))?;
    body.validate()
        .map_err(|report| OrchestratorError::Validation(report.to_string()))?;
    Ok(body)
}

pub(crate) fn query_params<T>(query: Result<Query<T>, QueryRejection>) -> Result<T, OrchestratorError> {
    query
        .map(|Query(q)| q)
        .map_err(|e| OrchestratorError::Validation(e.body_text()))
}
