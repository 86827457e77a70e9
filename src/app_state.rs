use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::services::orchestrator::Orchestrator;

/// Name and version reported in every response envelope.
#[derive(Debug, Clone)]
pub struct ServiceInfo {
    pub name: String,
    pub version: String,
    pub started_at: DateTime<Utc>,
}

impl ServiceInfo {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            started_at: Utc::now(),
        }
    }
}

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub service: Arc<ServiceInfo>,
}

impl AppState {
    pub fn new(orchestrator: Orchestrator, service: ServiceInfo) -> Self {
        Self {
            orchestrator: Arc::new(orchestrator),
            service: Arc::new(service),
        }
    }
}
