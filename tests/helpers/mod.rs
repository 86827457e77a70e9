//! Fake collaborators and builders shared by the integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{Request, Response, StatusCode};
use axum::Router;
use chrono::{Duration as ChronoDuration, Utc};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use smart_bin_orchestrator::app_state::{AppState, ServiceInfo};
use smart_bin_orchestrator::db::memory::{MemoryDeviceRepository, MemoryJobRepository};
use smart_bin_orchestrator::db::{JobRepository, RepositoryError};
use smart_bin_orchestrator::models::api::DeviceCredential;
use smart_bin_orchestrator::models::classification::Classification;
use smart_bin_orchestrator::models::decision::{Decision, DecisionError};
use smart_bin_orchestrator::models::job::{Job, JobFilter, JobStatus};
use smart_bin_orchestrator::routes;
use smart_bin_orchestrator::services::decision::{self, DecisionEngine};
use smart_bin_orchestrator::services::orchestrator::{Orchestrator, OrchestratorSettings};
use smart_bin_orchestrator::services::storage::{StorageError, UploadGrant, UploadGrantIssuer};
use smart_bin_orchestrator::services::trust::{TrustError, TrustIssuer};

pub const TEST_BUCKET_URL: &str = "https://storage.test/smart-bin-test-images";

/// Upload grant issuer that signs nothing and can be told to fail or stall.
#[derive(Default)]
pub struct FakePresigner {
    pub fail: bool,
    pub delay: Option<Duration>,
    pub issued: AtomicUsize,
}

impl FakePresigner {
    pub fn failing() -> Self {
        Self { fail: true, ..Self::default() }
    }

    pub fn stalled(delay: Duration) -> Self {
        Self { delay: Some(delay), ..Self::default() }
    }

    pub fn issued(&self) -> usize {
        self.issued.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl UploadGrantIssuer for FakePresigner {
    async fn issue_put_grant(&self, storage_key: &str, ttl: Duration) -> Result<UploadGrant, StorageError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail {
            return Err(StorageError::Issuer("presigner unavailable".to_string()));
        }
        self.issued.fetch_add(1, Ordering::SeqCst);
        Ok(UploadGrant {
            url: format!("{}/{}?X-Amz-Expires={}", TEST_BUCKET_URL, storage_key, ttl.as_secs()),
            expires_at: Utc::now() + ChronoDuration::from_std(ttl).unwrap(),
        })
    }
}

#[derive(Default)]
pub struct FakeTrustIssuer {
    pub fail: bool,
}

#[async_trait]
impl TrustIssuer for FakeTrustIssuer {
    async fn issue_identity(&self, device_id: &str) -> Result<DeviceCredential, TrustError> {
        if self.fail {
            return Err(TrustError::Issuer("certificate authority unavailable".to_string()));
        }
        let now = Utc::now();
        Ok(DeviceCredential {
            token: format!("test-token-{}", device_id),
            issued_at: now,
            expires_at: now + ChronoDuration::days(365),
        })
    }
}

/// Runs the real rules after a delay.
pub struct SlowDecisionEngine(pub Duration);

#[async_trait]
impl DecisionEngine for SlowDecisionEngine {
    async fn decide(&self, _job: &Job, classification: &Classification) -> Result<Decision, DecisionError> {
        tokio::time::sleep(self.0).await;
        Ok(decision::decide(classification))
    }
}

pub struct FailingDecisionEngine;

#[async_trait]
impl DecisionEngine for FailingDecisionEngine {
    async fn decide(&self, _job: &Job, _classification: &Classification) -> Result<Decision, DecisionError> {
        Err(DecisionError::Engine("rules unavailable".to_string()))
    }
}

/// In-memory job store whose next `failures` status-checked writes error out.
pub struct FlakyJobRepository {
    pub inner: MemoryJobRepository,
    failures: AtomicUsize,
}

impl FlakyJobRepository {
    pub fn new(failures: usize) -> Self {
        Self {
            inner: MemoryJobRepository::new(),
            failures: AtomicUsize::new(failures),
        }
    }
}

#[async_trait]
impl JobRepository for FlakyJobRepository {
    async fn get(&self, job_id: &str) -> Result<Option<Job>, RepositoryError> {
        self.inner.get(job_id).await
    }

    async fn insert(&self, job: &Job) -> Result<(), RepositoryError> {
        self.inner.insert(job).await
    }

    async fn update_if_status(&self, job: &Job, expected: JobStatus) -> Result<bool, RepositoryError> {
        let should_fail = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if should_fail {
            return Err(RepositoryError::Database(sqlx::Error::PoolTimedOut));
        }
        self.inner.update_if_status(job, expected).await
    }

    async fn query(&self, filter: &JobFilter) -> Result<(Vec<Job>, u64), RepositoryError> {
        self.inner.query(filter).await
    }

    async fn health_check(&self) -> Result<(), RepositoryError> {
        self.inner.health_check().await
    }
}

/// An orchestrator over a [`FlakyJobRepository`].
pub fn flaky_orchestrator(failures: usize) -> (Orchestrator, Arc<FlakyJobRepository>) {
    let jobs = Arc::new(FlakyJobRepository::new(failures));
    let orchestrator = Orchestrator::new(
        test_settings(),
        jobs.clone(),
        Arc::new(MemoryDeviceRepository::new()),
        Arc::new(FakePresigner::default()),
        Arc::new(FakeTrustIssuer::default()),
    );
    (orchestrator, jobs)
}

pub fn test_settings() -> OrchestratorSettings {
    OrchestratorSettings {
        upload_grant_ttl: Duration::from_secs(900),
        collaborator_timeout: Duration::from_millis(200),
        decision_timeout: Duration::from_millis(200),
    }
}

/// An orchestrator over in-memory stores, with handles on everything behind it.
pub struct Harness {
    pub orchestrator: Arc<Orchestrator>,
    pub jobs: Arc<MemoryJobRepository>,
    pub devices: Arc<MemoryDeviceRepository>,
    pub presigner: Arc<FakePresigner>,
}

pub struct HarnessBuilder {
    presigner: FakePresigner,
    trust: FakeTrustIssuer,
    engine: Option<Arc<dyn DecisionEngine>>,
    settings: OrchestratorSettings,
}

impl HarnessBuilder {
    pub fn presigner(mut self, presigner: FakePresigner) -> Self {
        self.presigner = presigner;
        self
    }

    pub fn trust(mut self, trust: FakeTrustIssuer) -> Self {
        self.trust = trust;
        self
    }

    pub fn decision_engine(mut self, engine: Arc<dyn DecisionEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    pub fn build(self) -> Harness {
        let jobs = Arc::new(MemoryJobRepository::new());
        let devices = Arc::new(MemoryDeviceRepository::new());
        let presigner = Arc::new(self.presigner);

        let mut orchestrator = Orchestrator::new(
            self.settings,
            jobs.clone(),
            devices.clone(),
            presigner.clone(),
            Arc::new(self.trust),
        );
        if let Some(engine) = self.engine {
            orchestrator = orchestrator.with_decision_engine(engine);
        }

        Harness {
            orchestrator: Arc::new(orchestrator),
            jobs,
            devices,
            presigner,
        }
    }
}

pub fn harness() -> Harness {
    builder().build()
}

pub fn builder() -> HarnessBuilder {
    HarnessBuilder {
        presigner: FakePresigner::default(),
        trust: FakeTrustIssuer::default(),
        engine: None,
        settings: test_settings(),
    }
}

impl Harness {
    pub fn app(&self) -> Router {
        let state = AppState {
            orchestrator: self.orchestrator.clone(),
            service: Arc::new(ServiceInfo::new("orchestrator", "test")),
        };
        routes::router(state, None)
    }
}

pub fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn empty_request(method: &str, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

/// Read a response as `(status, json body)`.
pub async fn read_json(response: Response<Body>) -> (StatusCode, serde_json::Value) {
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
    (status, body)
}
