//! Request ids and the JSON response envelope shared by every API route.

use axum::body::Body;
use axum::extract::FromRequestParts;
use axum::http::header::HeaderName;
use axum::http::request::Parts;
use axum::http::{HeaderMap, HeaderValue, Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::convert::Infallible;
use std::sync::Arc;
use uuid::Uuid;

use crate::app_state::{AppState, ServiceInfo};
use crate::error::OrchestratorError;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Correlation id for one request, echoed back in the response header and envelope.
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

fn generate_request_id() -> String {
    let id = Uuid::new_v4().simple().to_string();
    format!("req_{}", &id[..8])
}

fn request_id_from_headers(headers: &HeaderMap) -> Option<String> {
    headers
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty() && v.len() <= 128)
        .map(str::to_string)
}

/// Attach a request id to the request and echo it on the response.
pub async fn request_id_middleware(mut req: Request<Body>, next: Next) -> Response {
    let request_id = request_id_from_headers(req.headers()).unwrap_or_else(generate_request_id);
    req.extensions_mut().insert(RequestId(request_id.clone()));

    let mut response = next.run(req).await;
    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response
            .headers_mut()
            .insert(HeaderName::from_static(REQUEST_ID_HEADER), value);
    }
    response
}

#[derive(Debug, Serialize)]
pub struct ResponseMetadata {
    pub timestamp: DateTime<Utc>,
    pub request_id: String,
    pub service: String,
    pub version: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
pub struct Envelope<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
    pub metadata: ResponseMetadata,
}

/// Per-request context used to build enveloped responses.
#[derive(Debug, Clone)]
pub struct ApiContext {
    pub request_id: String,
    service: Arc<ServiceInfo>,
}

impl FromRequestParts<AppState> for ApiContext {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let request_id = match parts.extensions.get::<RequestId>() {
            Some(id) => id.0.clone(),
            None => request_id_from_headers(&parts.headers).unwrap_or_else(generate_request_id),
        };
        Ok(Self {
            request_id,
            service: state.service.clone(),
        })
    }
}

impl ApiContext {
    fn metadata(&self) -> ResponseMetadata {
        ResponseMetadata {
            timestamp: Utc::now(),
            request_id: self.request_id.clone(),
            service: self.service.name.clone(),
            version: self.service.version.clone(),
        }
    }

    pub fn ok<T: Serialize>(&self, status: StatusCode, data: T) -> Response {
        let body = Envelope {
            success: true,
            data: Some(data),
            error: None,
            metadata: self.metadata(),
        };
        (status, Json(body)).into_response()
    }

    pub fn fail(&self, err: OrchestratorError) -> Response {
        if err.is_server_error() {
            tracing::error!(request_id = %self.request_id, error = %err, "Request failed");
        } else {
            tracing::debug!(request_id = %self.request_id, error = %err, "Request rejected");
        }

        let details = match &err {
            OrchestratorError::InvalidTransition { from, to } => {
                Some(serde_json::json!({ "from": from, "to": to }))
            }
            _ => None,
        };
        let body: Envelope<()> = Envelope {
            success: false,
            data: None,
            error: Some(ErrorBody {
                code: err.code(),
                message: err.public_message(),
                details,
            }),
            metadata: self.metadata(),
        };
        (err.status_code(), Json(body)).into_response()
    }

    /// Envelope a service result, using `status` on success.
    pub fn respond<T: Serialize>(
        &self,
        status: StatusCode,
        result: Result<T, OrchestratorError>,
    ) -> Response {
        match result {
            Ok(data) => self.ok(status, data),
            Err(err) => self.fail(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_request_id_format() {
        let id = generate_request_id();
        assert!(id.starts_with("req_"));
        assert_eq!(id.len(), 12);
    }

    #[test]
    fn test_header_request_id_is_trimmed_and_bounded() {
        let mut headers = HeaderMap::new();
        headers.insert(REQUEST_ID_HEADER, HeaderValue::from_static("  abc-123 "));
        assert_eq!(request_id_from_headers(&headers).as_deref(), Some("abc-123"));

        let long = "x".repeat(200);
        headers.insert(REQUEST_ID_HEADER, HeaderValue::from_str(&long).unwrap());
        assert!(request_id_from_headers(&headers).is_none());
    }
}
