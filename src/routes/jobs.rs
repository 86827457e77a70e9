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
    CreateJobRequest, CreateJobResponse, JobView, ListJobsQuery, ListJobsResponse,
};
use crate::models::job::JobStatus;

/// POST /api/v1/jobs
pub async fn create_job(
    ctx: ApiContext,
    State(state): State<AppState>,
    payload: Result<Json<CreateJobRequest>, JsonRejection>,
) -> Response {
    let result = async {
        let req = validated_body(payload)?;
        let created = state.orchestrator.create_job(&req.device_id, req.metadata).await?;
        Ok::<_, OrchestratorError>(CreateJobResponse::from(created))
    }
    .await;
    ctx.respond(StatusCode::CREATED, result)
}

/// GET /api/v1/jobs/{job_id}
pub async fn get_job(
    ctx: ApiContext,
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Response {
    let result = state
        .orchestrator
        .get_job(&job_id)
        .await
        .map(|job| JobView::new(job, Utc::now()));
    ctx.respond(StatusCode::OK, result)
}

/// GET /api/v1/jobs
pub async fn list_jobs(
    ctx: ApiContext,
    State(state): State<AppState>,
    query: Result<Query<ListJobsQuery>, QueryRejection>,
) -> Response {
    let result = async {
        let q = query_params(query)?;
        let status = q
            .status
            .as_deref()
            .filter(|s| !s.is_empty())
            .map(|s| {
                JobStatus::from_str(s)
                    .map_err(|_| OrchestratorError::Validation(format!("unknown job status '{}'", s)))
            })
            .transpose()?;

        let (jobs, total, limit, offset) = state
            .orchestrator
            .list_jobs(q.device_id, status, q.limit, q.offset)
            .await?;
        let now = Utc::now();
        Ok::<_, OrchestratorError>(ListJobsResponse {
            jobs: jobs.into_iter().map(|job| JobView::new(job, now)).collect(),
            total,
            limit,
            offset,
        })
    }
    .await;
    ctx.respond(StatusCode::OK, result)
}

/// PATCH /api/v1/jobs/{job_id}
pub async fn update_job(ctx: ApiContext, Path(job_id): Path<String>) -> Response {
    ctx.fail(OrchestratorError::NotImplemented(format!(
        "updating job {} is not supported",
        job_id
    )))
}

/// DELETE /api/v1/jobs/{job_id}
pub async fn delete_job(ctx: ApiContext, Path(job_id): Path<String>) -> Response {
    ctx.fail(OrchestratorError::NotImplemented(format!(
        "deleting job {} is not supported",
        job_id
    )))
}
