use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Response;
use axum::Json;
use chrono::Utc;

use super::context::ApiContext;
use super::validated_body;
use crate::app_state::AppState;
use crate::error::OrchestratorError;
use crate::models::api::{
    CallbackAck, ClassificationCallbackRequest, DeviceEventAck, DeviceEventRequest,
};

/// POST /api/v1/webhooks/classification
///
/// Redeliveries and callbacks for unknown jobs are acknowledged with 200 so the
/// producer stops retrying.
pub async fn classification_callback(
    ctx: ApiContext,
    State(state): State<AppState>,
    payload: Result<Json<ClassificationCallbackRequest>, JsonRejection>,
) -> Response {
    let result = async {
        let req = validated_body(payload)?;
        tracing::info!(job_id = %req.job_id, status = %req.status, "Classification callback received");
        let outcome = state
            .orchestrator
            .handle_classification_callback(&req.job_id, &req.status, req.classification, req.error)
            .await?;
        Ok::<_, OrchestratorError>(CallbackAck {
            job_id: req.job_id,
            received: true,
            outcome,
            processed_at: Utc::now(),
        })
    }
    .await;
    ctx.respond(StatusCode::OK, result)
}

/// POST /api/v1/webhooks/device-event
pub async fn device_event(
    ctx: ApiContext,
    State(state): State<AppState>,
    payload: Result<Json<DeviceEventRequest>, JsonRejection>,
) -> Response {
    let result = async {
        let req = validated_body(payload)?;
        tracing::info!(device_id = %req.device_id, event_type = %req.event_type, "Device event received");
        let outcome = state
            .orchestrator
            .record_device_event(&req.device_id, &req.event_type, req.data)
            .await?;
        Ok::<_, OrchestratorError>(DeviceEventAck::new(outcome, Utc::now()))
    }
    .await;
    ctx.respond(StatusCode::OK, result)
}
