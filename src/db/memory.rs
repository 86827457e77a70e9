//! In-memory repositories for development mode and tests.
//!
//! Conditional writes run under the map's write lock, which gives the same per-key
//! compare-and-swap semantics as the Postgres implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::{DeviceRepository, JobRepository, RepositoryError};
use crate::models::device::{Device, DeviceFilter, DeviceStatus, TelemetryUpdate};
use crate::models::job::{Job, JobFilter, JobStatus};

#[derive(Default)]
pub struct MemoryJobRepository {
    jobs: RwLock<HashMap<String, Job>>,
}

impl MemoryJobRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.jobs.read().await.is_empty()
    }
}

fn page<T>(mut items: Vec<T>, limit: i64, offset: i64) -> (Vec<T>, u64) {
    let total = items.len() as u64;
    let offset = usize::try_from(offset.max(0)).unwrap_or(usize::MAX);
    let limit = usize::try_from(limit.max(0)).unwrap_or(usize::MAX);
    let page = if offset >= items.len() {
        Vec::new()
    } else {
        items.drain(offset..).take(limit).collect()
    };
    (page, total)
}

#[async_trait]
impl JobRepository for MemoryJobRepository {
    async fn get(&self, job_id: &str) -> Result<Option<Job>, RepositoryError> {
        Ok(self.jobs.read().await.get(job_id).cloned())
    }

    async fn insert(&self, job: &Job) -> Result<(), RepositoryError> {
        let mut jobs = self.jobs.write().await;
        if jobs.contains_key(&job.job_id) {
            return Err(RepositoryError::Conflict(format!("job {} already exists", job.job_id)));
        }
        jobs.insert(job.job_id.clone(), job.clone());
        Ok(())
    }

    async fn update_if_status(&self, job: &Job, expected: JobStatus) -> Result<bool, RepositoryError> {
        let mut jobs = self.jobs.write().await;
        match jobs.get_mut(&job.job_id) {
            Some(stored) if stored.status == expected => {
                *stored = job.clone();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn query(&self, filter: &JobFilter) -> Result<(Vec<Job>, u64), RepositoryError> {
        let jobs = self.jobs.read().await;
        let mut matching: Vec<Job> = jobs
            .values()
            .filter(|j| filter.device_id.as_deref().map_or(true, |d| j.device_id == d))
            .filter(|j| filter.status.map_or(true, |s| j.status == s))
            .cloned()
            .collect();
        matching.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.job_id.cmp(&b.job_id))
        });
        Ok(page(matching, filter.limit, filter.offset))
    }

    async fn health_check(&self) -> Result<(), RepositoryError> {
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryDeviceRepository {
    devices: RwLock<HashMap<String, Device>>,
}

impl MemoryDeviceRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DeviceRepository for MemoryDeviceRepository {
    async fn get(&self, device_id: &str) -> Result<Option<Device>, RepositoryError> {
        Ok(self.devices.read().await.get(device_id).cloned())
    }

    async fn insert(&self, device: &Device) -> Result<(), RepositoryError> {
        let mut devices = self.devices.write().await;
        if devices.contains_key(&device.device_id) {
            return Err(RepositoryError::Conflict(format!(
                "device {} already exists",
                device.device_id
            )));
        }
        devices.insert(device.device_id.clone(), device.clone());
        Ok(())
    }

    async fn query(&self, filter: &DeviceFilter) -> Result<(Vec<Device>, u64), RepositoryError> {
        let devices = self.devices.read().await;
        let mut matching: Vec<Device> = devices
            .values()
            .filter(|d| filter.status.map_or(true, |s| d.status == s))
            .cloned()
            .collect();
        matching.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.device_id.cmp(&b.device_id))
        });
        Ok(page(matching, filter.limit, filter.offset))
    }

    async fn apply_telemetry(
        &self,
        device_id: &str,
        update: &TelemetryUpdate,
        seen_at: DateTime<Utc>,
    ) -> Result<Option<Device>, RepositoryError> {
        let mut devices = self.devices.write().await;
        Ok(devices.get_mut(device_id).map(|device| {
            device.apply_telemetry(update, seen_at);
            device.clone()
        }))
    }

    async fn increment_counters(
        &self,
        device_id: &str,
        jobs: i64,
        errors: i64,
        now: DateTime<Utc>,
    ) -> Result<Option<Device>, RepositoryError> {
        let mut devices = self.devices.write().await;
        Ok(devices.get_mut(device_id).map(|device| {
            device.total_jobs += jobs;
            device.total_errors += errors;
            device.updated_at = now;
            device.clone()
        }))
    }

    async fn set_status_if(
        &self,
        device_id: &str,
        expected: DeviceStatus,
        status: DeviceStatus,
        reason: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let mut devices = self.devices.write().await;
        match devices.get_mut(device_id) {
            Some(device) if device.status == expected => {
                device.status = status;
                device.status_reason = reason.map(str::to_string);
                device.updated_at = now;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn health_check(&self) -> Result<(), RepositoryError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::device::DeviceType;
    use crate::models::Metadata;
    use chrono::Duration;

    fn job(id: &str, device: &str, offset_secs: i64) -> Job {
        Job::new(
            id.to_string(),
            device.to_string(),
            format!("uploads/{}/{}.jpg", device, id),
            Metadata::new(),
            Utc::now() + Duration::seconds(offset_secs),
        )
    }

    #[tokio::test]
    async fn test_insert_conflicts_on_duplicate_id() {
        let repo = MemoryJobRepository::new();
        repo.insert(&job("job_a", "bin-01", 0)).await.unwrap();
        let err = repo.insert(&job("job_a", "bin-02", 0)).await.unwrap_err();
        assert!(matches!(err, RepositoryError::Conflict(_)));
        assert_eq!(repo.get("job_a").await.unwrap().unwrap().device_id, "bin-01");
    }

    #[tokio::test]
    async fn test_update_if_status_is_compare_and_swap() {
        let repo = MemoryJobRepository::new();
        let original = job("job_a", "bin-01", 0);
        repo.insert(&original).await.unwrap();

        let mut first = original.clone();
        first.transition_to(JobStatus::Processing, Utc::now()).unwrap();
        assert!(repo.update_if_status(&first, JobStatus::Pending).await.unwrap());

        let mut stale = original.clone();
        stale.fail("late writer", Utc::now()).unwrap();
        assert!(!repo.update_if_status(&stale, JobStatus::Pending).await.unwrap());

        let stored = repo.get("job_a").await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Processing);
    }

    #[tokio::test]
    async fn test_query_filters_and_paginates_newest_first() {
        let repo = MemoryJobRepository::new();
        for (i, device) in ["bin-01", "bin-02", "bin-01", "bin-01"].iter().enumerate() {
            repo.insert(&job(&format!("job_{}", i), device, i as i64)).await.unwrap();
        }

        let filter = JobFilter {
            device_id: Some("bin-01".to_string()),
            status: None,
            limit: 2,
            offset: 0,
        };
        let (jobs, total) = repo.query(&filter).await.unwrap();
        assert_eq!(total, 3);
        assert_eq!(
            jobs.iter().map(|j| j.job_id.as_str()).collect::<Vec<_>>(),
            vec!["job_3", "job_2"]
        );

        let (rest, _) = repo.query(&JobFilter { offset: 2, ..filter.clone() }).await.unwrap();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].job_id, "job_0");

        let (beyond, total) = repo.query(&JobFilter { offset: 10, ..filter }).await.unwrap();
        assert!(beyond.is_empty());
        assert_eq!(total, 3);
    }

    #[tokio::test]
    async fn test_device_counters_and_conditional_status() {
        let repo = MemoryDeviceRepository::new();
        let device = Device::new("bin-01".to_string(), DeviceType::SmartBinV1, Utc::now());
        repo.insert(&device).await.unwrap();

        let updated = repo
            .increment_counters("bin-01", 1, 1, Utc::now())
            .await
            .unwrap()
            .unwrap();
        assert_eq!((updated.total_jobs, updated.total_errors), (1, 1));
        assert!(repo.increment_counters("ghost", 1, 0, Utc::now()).await.unwrap().is_none());

        assert!(!repo
            .set_status_if("bin-01", DeviceStatus::Maintenance, DeviceStatus::Error, None, Utc::now())
            .await
            .unwrap());
        assert!(repo
            .set_status_if("bin-01", DeviceStatus::Active, DeviceStatus::Error, Some("errors"), Utc::now())
            .await
            .unwrap());
        let stored = repo.get("bin-01").await.unwrap().unwrap();
        assert_eq!(stored.status, DeviceStatus::Error);
        assert_eq!(stored.status_reason.as_deref(), Some("errors"));
    }
}
