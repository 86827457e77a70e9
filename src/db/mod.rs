use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::time::Duration;

use crate::models::device::{Device, DeviceFilter, DeviceStatus, TelemetryUpdate};
use crate::models::job::{Job, JobFilter, JobStatus};

pub mod device_queries;
pub mod job_queries;
pub mod memory;

/// Initialize PostgreSQL connection pool
pub async fn init_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(20)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .connect(database_url)
        .await
}

/// Run database migrations
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| sqlx::Error::Migrate(Box::new(e)))
}

/// Job persistence.
///
/// Writes to an existing job are conditional on the status the writer read, so two
/// concurrent read-modify-write cycles on one job cannot both succeed.
#[async_trait]
pub trait JobRepository: Send + Sync {
    async fn get(&self, job_id: &str) -> Result<Option<Job>, RepositoryError>;

    /// Insert a new job. Fails with [`RepositoryError::Conflict`] if the id exists.
    async fn insert(&self, job: &Job) -> Result<(), RepositoryError>;

    /// Replace the stored job only if its status is still `expected`.
    ///
    /// Returns `false` when another writer changed the job first.
    async fn update_if_status(&self, job: &Job, expected: JobStatus) -> Result<bool, RepositoryError>;

    /// Matching jobs (newest first, paginated) and the unpaginated total.
    async fn query(&self, filter: &JobFilter) -> Result<(Vec<Job>, u64), RepositoryError>;

    async fn health_check(&self) -> Result<(), RepositoryError>;
}

/// Device persistence. Mutations are single atomic operations per device.
#[async_trait]
pub trait DeviceRepository: Send + Sync {
    async fn get(&self, device_id: &str) -> Result<Option<Device>, RepositoryError>;

    /// Insert a new device. Fails with [`RepositoryError::Conflict`] if the id exists.
    async fn insert(&self, device: &Device) -> Result<(), RepositoryError>;

    async fn query(&self, filter: &DeviceFilter) -> Result<(Vec<Device>, u64), RepositoryError>;

    /// Merge telemetry and mark the device seen. `None` if the device is unknown.
    async fn apply_telemetry(
        &self,
        device_id: &str,
        update: &TelemetryUpdate,
        seen_at: DateTime<Utc>,
    ) -> Result<Option<Device>, RepositoryError>;

    /// Add to the job and error counters. `None` if the device is unknown.
    async fn increment_counters(
        &self,
        device_id: &str,
        jobs: i64,
        errors: i64,
        now: DateTime<Utc>,
    ) -> Result<Option<Device>, RepositoryError>;

    /// Change status only if the device is currently in `expected`.
    async fn set_status_if(
        &self,
        device_id: &str,
        expected: DeviceStatus,
        status: DeviceStatus,
        reason: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<bool, RepositoryError>;

    async fn health_check(&self) -> Result<(), RepositoryError>;
}

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("{0}")]
    Conflict(String),

    #[error("corrupt record: {0}")]
    Corrupt(String),
}
