use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::app_state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
    pub timestamp: DateTime<Utc>,
    pub uptime_secs: i64,
    pub checks: HealthChecks,
}

#[derive(Serialize)]
pub struct HealthChecks {
    pub store: ComponentHealth,
}

#[derive(Serialize)]
pub struct ComponentHealth {
    pub status: String,
    pub latency_ms: Option<u64>,
}

async fn check_store(state: &AppState) -> ComponentHealth {
    let start = std::time::Instant::now();
    match state.orchestrator.health_check().await {
        Ok(()) => ComponentHealth {
            status: "ok".to_string(),
            latency_ms: Some(start.elapsed().as_millis() as u64),
        },
        Err(e) => {
            tracing::warn!(error = %e, "Store health check failed");
            ComponentHealth {
                status: "error".to_string(),
                latency_ms: None,
            }
        }
    }
}

/// GET /health: liveness plus store status.
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let store = check_store(&state).await;

    let healthy = store.status == "ok";
    let status_code = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let now = Utc::now();
    let response = HealthResponse {
        status: if healthy { "healthy" } else { "degraded" }.to_string(),
        service: state.service.name.clone(),
        version: state.service.version.clone(),
        timestamp: now,
        uptime_secs: (now - state.service.started_at).num_seconds(),
        checks: HealthChecks { store },
    };

    (status_code, Json(response))
}

#[derive(Serialize)]
pub struct ReadinessResponse {
    pub ready: bool,
}

/// GET /ready: 200 once the store answers.
pub async fn readiness(State(state): State<AppState>) -> (StatusCode, Json<ReadinessResponse>) {
    let ready = check_store(&state).await.status == "ok";
    let status_code = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status_code, Json(ReadinessResponse { ready }))
}
