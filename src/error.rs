use axum::http::StatusCode;

use crate::db::RepositoryError;
use crate::models::job::{JobError, JobStatus};
use crate::services::storage::StorageError;
use crate::services::trust::TrustError;

/// Errors surfaced by the orchestration service.
#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("invalid input: {0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("invalid status transition from {from} to {to}")]
    InvalidTransition { from: JobStatus, to: JobStatus },

    #[error("{0}")]
    NotImplemented(String),

    #[error("{0} timed out")]
    Timeout(&'static str),

    #[error("storage failure: {0}")]
    Storage(String),

    #[error("trust issuer failure: {0}")]
    TrustIssuer(String),
}

impl OrchestratorError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) | Self::InvalidTransition { .. } => StatusCode::CONFLICT,
            Self::NotImplemented(_) => StatusCode::NOT_IMPLEMENTED,
            Self::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            Self::Storage(_) | Self::TrustIssuer(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable code placed in the error envelope.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "INVALID_INPUT",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Conflict(_) | Self::InvalidTransition { .. } => "CONFLICT",
            Self::NotImplemented(_) => "NOT_IMPLEMENTED",
            Self::Timeout(_) => "TIMEOUT",
            Self::Storage(_) | Self::TrustIssuer(_) => "INTERNAL_ERROR",
        }
    }

    /// Message safe to return to callers. Collaborator detail stays in the logs.
    pub fn public_message(&self) -> String {
        match self {
            Self::Storage(_) | Self::TrustIssuer(_) => "Internal server error".to_string(),
            Self::Timeout(_) => "Upstream dependency timed out".to_string(),
            other => other.to_string(),
        }
    }

    pub fn is_server_error(&self) -> bool {
        self.status_code().is_server_error()
    }
}

impl From<RepositoryError> for OrchestratorError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::Conflict(msg) => Self::Conflict(msg),
            other => Self::Storage(other.to_string()),
        }
    }
}

impl From<StorageError> for OrchestratorError {
    fn from(err: StorageError) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<TrustError> for OrchestratorError {
    fn from(err: TrustError) -> Self {
        Self::TrustIssuer(err.to_string())
    }
}

impl From<JobError> for OrchestratorError {
    fn from(err: JobError) -> Self {
        match err {
            JobError::InvalidTransition { from, to } => Self::InvalidTransition { from, to },
            other => Self::Validation(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_and_statuses() {
        let cases = [
            (OrchestratorError::Validation("x".into()), StatusCode::BAD_REQUEST, "INVALID_INPUT"),
            (OrchestratorError::NotFound("x".into()), StatusCode::NOT_FOUND, "NOT_FOUND"),
            (OrchestratorError::Conflict("x".into()), StatusCode::CONFLICT, "CONFLICT"),
            (
                OrchestratorError::NotImplemented("x".into()),
                StatusCode::NOT_IMPLEMENTED,
                "NOT_IMPLEMENTED",
            ),
            (OrchestratorError::Timeout("job store"), StatusCode::GATEWAY_TIMEOUT, "TIMEOUT"),
        ];
        for (err, status, code) in cases {
            assert_eq!(err.status_code(), status);
            assert_eq!(err.code(), code);
        }
    }

    #[test]
    fn test_internal_detail_is_not_public() {
        let err = OrchestratorError::Storage("connection refused to 10.0.0.4:5432".into());
        assert!(err.is_server_error());
        assert!(!err.public_message().contains("10.0.0.4"));
    }

    #[test]
    fn test_job_error_mapping() {
        let err: OrchestratorError = JobError::InvalidTransition {
            from: JobStatus::Completed,
            to: JobStatus::Processing,
        }
        .into();
        assert!(matches!(err, OrchestratorError::InvalidTransition { .. }));
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
    }
}
