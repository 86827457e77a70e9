use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::Response;
use axum::Json;
use chrono::Utc;
use std::str::FromStr;

use super::context::ApiContext;
use super::{query_params, validated_body};
use crate::app_state::AppState;
use crate::error::OrchestratorError;
use crate::models::api::{
    DeviceView, ListDevicesQuery, ListDevicesResponse, RegisterDeviceRequest,
    RegisterDeviceResponse,
};
use crate::models::device::DeviceStatus;

/// POST /api/v1/devices/register
///
/// The credential is returned in this response only; it is never stored.
pub async fn register_device(
    ctx: ApiContext,
    State(state): State<AppState>,
    payload: Result<Json<RegisterDeviceRequest>, JsonRejection>,
) -> Response {
    let result = async {
        let req = validated_body(payload)?;
        let registration = state.orchestrator.register_device(req).await?;
        Ok::<_, OrchestratorError>(RegisterDeviceResponse::from(registration))
    }
    .await;
    ctx.respond(StatusCode::CREATED, result)
}

/// GET /api/v1/devices/{device_id}
pub async fn get_device(
    ctx: ApiContext,
    State(state): State<AppState>,
    Path(device_id): Path<String>,
) -> Response {
    let result = state
        .orchestrator
        .get_device(&device_id)
        .await
        .map(|device| DeviceView::new(device, Utc::now()));
    ctx.respond(StatusCode::OK, result)
}

/// GET /api/v1/devices
pub async fn list_devices(
    ctx: ApiContext,
    State(state): State<AppState>,
    query: Result<Query<ListDevicesQuery>, QueryRejection>,
) -> Response {
    let result = async {
        let q = query_params(query)?;
        let status = match q.status.as_deref().filter(|s| !s.is_empty()) {
            Some(s) => Some(DeviceStatus::from_str(s).map_err(|_| {
                OrchestratorError::Validation(format!("unknown device status '{}'", s))
            })?),
            None => None,
        };

        let (devices, total, limit, offset) = state
            .orchestrator
            .list_devices(status, q.limit, q.offset)
            .await?;
        let now = Utc::now();
        Ok::<_, OrchestratorError>(ListDevicesResponse {
            devices: devices
                .into_iter()
                .map(|device| DeviceView::new(device, now))
                .collect(),
            total,
            limit,
            offset,
        })
    }
    .await;
    ctx.respond(StatusCode::OK, result)
}

/// PATCH /api/v1/devices/{device_id}
pub async fn update_device(ctx: ApiContext, Path(device_id): Path<String>) -> Response {
    ctx.fail(OrchestratorError::NotImplemented(format!(
        "updating device {} is not supported",
        device_id
    )))
}

/// DELETE /api/v1/devices/{device_id}
pub async fn delete_device(ctx: ApiContext, Path(device_id): Path<String>) -> Response {
    ctx.fail(OrchestratorError::NotImplemented(format!(
        "deleting device {} is not supported",
        device_id
    )))
}
