use chrono::Utc;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::db::{DeviceRepository, JobRepository};
use crate::error::OrchestratorError;
use crate::models::api::{
    CallbackOutcome, CreatedJob, DeviceEventOutcome, DeviceRegistration, RegisterDeviceRequest,
};
use crate::models::classification::{Classification, ClassificationError};
use crate::models::device::{Device, DeviceFilter, DeviceStatus, TelemetryUpdate, ERROR_THRESHOLD};
use crate::models::job::{Job, JobError, JobFilter, JobStatus};
use crate::models::{validate_device_id, Metadata};
use crate::services::decision::{DecisionEngine, RuleDecisionEngine};
use crate::services::storage::{image_key, UploadGrantIssuer};
use crate::services::trust::TrustIssuer;

pub const DEFAULT_PAGE_LIMIT: i64 = 10;
pub const MAX_PAGE_LIMIT: i64 = 100;

/// Upper bound on re-reads when a callback loses the status check to a non-terminal write.
const MAX_CALLBACK_ATTEMPTS: u32 = 4;

pub const EVENT_IMAGE_CAPTURED: &str = "image_captured";
pub const EVENT_DEVICE_STATUS: &str = "device_status";
pub const EVENT_ERROR: &str = "error";
pub const EVENT_UPLOAD_STARTED: &str = "upload_started";
pub const EVENT_UPLOAD_COMPLETED: &str = "upload_completed";

/// Explicit settings for the orchestrator, built once at startup.
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub upload_grant_ttl: Duration,
    pub collaborator_timeout: Duration,
    pub decision_timeout: Duration,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            upload_grant_ttl: Duration::from_secs(15 * 60),
            collaborator_timeout: Duration::from_secs(5),
            decision_timeout: Duration::from_secs(10),
        }
    }
}

/// Callback status reported by the classification service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CallbackStatus {
    Completed,
    Failed,
}

/// Clamp pagination to `0..=MAX_PAGE_LIMIT` and a non-negative offset.
pub fn clamp_page(limit: Option<i64>, offset: Option<i64>) -> (i64, i64) {
    let limit = limit.unwrap_or(DEFAULT_PAGE_LIMIT).clamp(0, MAX_PAGE_LIMIT);
    let offset = offset.unwrap_or(0).max(0);
    (limit, offset)
}

fn new_job_id() -> String {
    format!("job_{}", Uuid::new_v4().simple())
}

fn new_event_id() -> String {
    format!("evt_{}", Uuid::new_v4().simple())
}

/// Coordinates the job lifecycle between devices, storage and the classification callback.
pub struct Orchestrator {
    jobs: Arc<dyn JobRepository>,
    devices: Arc<dyn DeviceRepository>,
    uploads: Arc<dyn UploadGrantIssuer>,
    trust: Arc<dyn TrustIssuer>,
    decisions: Arc<dyn DecisionEngine>,
    settings: OrchestratorSettings,
}

impl Orchestrator {
    pub fn new(
        settings: OrchestratorSettings,
        jobs: Arc<dyn JobRepository>,
        devices: Arc<dyn DeviceRepository>,
        uploads: Arc<dyn UploadGrantIssuer>,
        trust: Arc<dyn TrustIssuer>,
    ) -> Self {
        Self {
            jobs,
            devices,
            uploads,
            trust,
            decisions: Arc::new(RuleDecisionEngine),
            settings,
        }
    }

    /// Replace the rule-based decision step.
    pub fn with_decision_engine(mut self, engine: Arc<dyn DecisionEngine>) -> Self {
        self.decisions = engine;
        self
    }

    /// Run a collaborator call under the configured timeout.
    async fn bounded<T, E, F>(&self, what: &'static str, fut: F) -> Result<T, OrchestratorError>
    where
        F: Future<Output = Result<T, E>>,
        E: Into<OrchestratorError>,
    {
        match tokio::time::timeout(self.settings.collaborator_timeout, fut).await {
            Ok(result) => result.map_err(Into::into),
            Err(_) => {
                tracing::warn!(collaborator = what, "Collaborator call timed out");
                Err(OrchestratorError::Timeout(what))
            }
        }
    }

    // ---- jobs ----

    /// Create a job and the upload grant for its image.
    ///
    /// Nothing is persisted unless the grant was issued.
    pub async fn create_job(
        &self,
        device_id: &str,
        metadata: Metadata,
    ) -> Result<CreatedJob, OrchestratorError> {
        validate_device_id(device_id).map_err(OrchestratorError::Validation)?;

        if let Some(device) = self.bounded("device store", self.devices.get(device_id)).await? {
            if device.status == DeviceStatus::Decommissioned {
                return Err(OrchestratorError::Validation(format!(
                    "device {} is decommissioned",
                    device_id
                )));
            }
        }

        let job_id = new_job_id();
        let key = image_key(device_id, &job_id);

        let grant = self
            .bounded(
                "upload grant issuer",
                self.uploads.issue_put_grant(&key, self.settings.upload_grant_ttl),
            )
            .await?;

        let job = Job::new(job_id, device_id.to_string(), key, metadata, Utc::now());
        self.bounded("job store", self.jobs.insert(&job)).await?;

        metrics::counter!("jobs_created_total").increment(1);
        tracing::info!(
            job_id = %job.job_id,
            device_id = %job.device_id,
            image_key = %job.image_key,
            "Job created"
        );

        Ok(CreatedJob {
            job,
            upload_url: grant.url,
            upload_expires_at: grant.expires_at,
        })
    }

    pub async fn get_job(&self, job_id: &str) -> Result<Job, OrchestratorError> {
        self.bounded("job store", self.jobs.get(job_id))
            .await?
            .ok_or_else(|| OrchestratorError::NotFound(format!("job {} not found", job_id)))
    }

    pub async fn list_jobs(
        &self,
        device_id: Option<String>,
        status: Option<JobStatus>,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> Result<(Vec<Job>, u64, i64, i64), OrchestratorError> {
        let (limit, offset) = clamp_page(limit, offset);
        let filter = JobFilter {
            device_id: device_id.filter(|d| !d.is_empty()),
            status,
            limit,
            offset,
        };
        let (jobs, total) = self.bounded("job store", self.jobs.query(&filter)).await?;
        Ok((jobs, total, limit, offset))
    }

    /// Apply a classification callback.
    ///
    /// Delivery is at-least-once: unknown jobs, terminal jobs and lost races are acknowledged
    /// without effect. Besides store failures, only an unknown `status` is an error. A
    /// malformed `classification` fails the job.
    pub async fn handle_classification_callback(
        &self,
        job_id: &str,
        status: &str,
        classification: Option<serde_json::Value>,
        error_detail: Option<String>,
    ) -> Result<CallbackOutcome, OrchestratorError> {
        let kind = match status {
            "completed" => CallbackStatus::Completed,
            "failed" => CallbackStatus::Failed,
            other => {
                return Err(OrchestratorError::Validation(format!(
                    "unknown callback status '{}'",
                    other
                )))
            }
        };

        let outcome = self
            .process_callback(job_id, kind, classification, error_detail)
            .await?;

        metrics::counter!("classification_callbacks_total", "outcome" => outcome.label())
            .increment(1);
        tracing::info!(job_id = %job_id, status = %status, outcome = outcome.label(), "Classification callback handled");

        Ok(outcome)
    }

    async fn process_callback(
        &self,
        job_id: &str,
        kind: CallbackStatus,
        classification: Option<serde_json::Value>,
        error_detail: Option<String>,
    ) -> Result<CallbackOutcome, OrchestratorError> {
        let classification = classification.map(Classification::from_payload);
        let error_detail = error_detail
            .filter(|e| !e.trim().is_empty())
            .unwrap_or_else(|| "classification failed".to_string());
        if kind == CallbackStatus::Failed {
            tracing::warn!(job_id = %job_id, error = %error_detail, "Classification failed");
        }

        // A miss on the status check is retried against the fresh job until it is terminal.
        for attempt in 1..=MAX_CALLBACK_ATTEMPTS {
            let Some(job) = self.bounded("job store", self.jobs.get(job_id)).await? else {
                tracing::info!(job_id = %job_id, "Callback for unknown job acknowledged");
                return Ok(CallbackOutcome::UnknownJob);
            };

            if job.is_terminal() {
                if attempt == 1 {
                    return Ok(CallbackOutcome::AlreadyTerminal { status: job.status });
                }
                tracing::info!(job_id = %job_id, status = %job.status, "Job finished concurrently, callback discarded");
                return Ok(CallbackOutcome::Superseded);
            }

            let expected = job.status;
            let mut next = job.clone();
            let applied = match kind {
                CallbackStatus::Failed => next.fail(error_detail.clone(), Utc::now()),
                CallbackStatus::Completed => self.complete_job(&mut next, classification.clone()).await,
            };

            if let Err(e) = applied {
                tracing::warn!(job_id = %job_id, error = %e, "Callback cannot apply to job");
                return Ok(CallbackOutcome::Rejected { reason: e.to_string() });
            }

            match self
                .bounded("job store", self.jobs.update_if_status(&next, expected))
                .await
            {
                Ok(true) => {}
                Ok(false) => {
                    tracing::info!(job_id = %job_id, attempt, "Job changed concurrently, reapplying callback");
                    continue;
                }
                Err(e) if next.status == JobStatus::Completed => {
                    tracing::error!(job_id = %job_id, error = %e, "Failed to persist completed job, marking failed");
                    let mut failed = job;
                    if failed.fail("failed to persist classification result", Utc::now()).is_err() {
                        return Err(e);
                    }
                    match self
                        .bounded("job store", self.jobs.update_if_status(&failed, expected))
                        .await
                    {
                        Ok(true) => next = failed,
                        _ => return Err(e),
                    }
                }
                Err(e) => return Err(e),
            }

            self.record_job_finished(&next).await;
            return Ok(CallbackOutcome::Applied { status: next.status });
        }

        tracing::warn!(job_id = %job_id, attempts = MAX_CALLBACK_ATTEMPTS, "Callback lost every write race, discarded");
        Ok(CallbackOutcome::Superseded)
    }

    /// Attach the classification, run the decision step, and finish the job.
    ///
    /// Bad payloads and decision failures fail the job rather than leaving it in flight.
    async fn complete_job(
        &self,
        job: &mut Job,
        classification: Option<Result<Classification, ClassificationError>>,
    ) -> Result<(), JobError> {
        let classification = match classification {
            None => return job.fail("completed callback carried no classification", Utc::now()),
            Some(Err(e)) => {
                tracing::warn!(job_id = %job.job_id, error = %e, "Malformed classification payload");
                return job.fail(format!("invalid classification payload: {}", e), Utc::now());
            }
            Some(Ok(classification)) => classification,
        };

        if job.status != JobStatus::Processing {
            job.transition_to(JobStatus::Processing, Utc::now())?;
        }
        job.attach_classification(classification.clone(), Utc::now())?;

        let decided = tokio::time::timeout(
            self.settings.decision_timeout,
            self.decisions.decide(job, &classification),
        )
        .await;

        let failure = match decided {
            Ok(Ok(decision)) => match decision.validate() {
                Ok(()) => {
                    tracing::info!(
                        job_id = %job.job_id,
                        label = %classification.label,
                        confidence = classification.confidence,
                        action = %decision.action,
                        rule = %decision.rule_applied,
                        "Decision produced"
                    );
                    job.attach_decision(decision, Utc::now())?;
                    return job.transition_to(JobStatus::Completed, Utc::now());
                }
                Err(e) => format!("decision step failed: {}", e),
            },
            Ok(Err(e)) => format!("decision step failed: {}", e),
            Err(_) => "decision step timed out".to_string(),
        };

        tracing::warn!(job_id = %job.job_id, error = %failure, "Decision step failed");
        job.fail(failure, Utc::now())
    }

    async fn record_job_finished(&self, job: &Job) {
        let failed = job.status == JobStatus::Failed;
        if failed {
            metrics::counter!("jobs_failed_total").increment(1);
        } else if let Some(decision) = &job.decision {
            metrics::counter!("jobs_completed_total", "action" => decision.action.as_ref().to_string())
                .increment(1);
        }
        if let Some(duration) = job.processing_duration(Utc::now()) {
            metrics::histogram!("job_processing_seconds")
                .record(duration.num_milliseconds() as f64 / 1000.0);
        }

        let errors = if failed { 1 } else { 0 };
        match self
            .bounded(
                "device store",
                self.devices
                    .increment_counters(&job.device_id, 1, errors, Utc::now()),
            )
            .await
        {
            Ok(Some(_)) => {}
            Ok(None) => {
                tracing::debug!(device_id = %job.device_id, "Job owner is not a registered device")
            }
            Err(e) => {
                tracing::warn!(device_id = %job.device_id, error = %e, "Failed to update device counters")
            }
        }
    }

    // ---- devices ----

    pub async fn register_device(
        &self,
        request: RegisterDeviceRequest,
    ) -> Result<DeviceRegistration, OrchestratorError> {
        validate_device_id(&request.device_id).map_err(OrchestratorError::Validation)?;

        if self
            .bounded("device store", self.devices.get(&request.device_id))
            .await?
            .is_some()
        {
            return Err(OrchestratorError::Conflict(format!(
                "device {} already exists",
                request.device_id
            )));
        }

        let credential = self
            .bounded("trust issuer", self.trust.issue_identity(&request.device_id))
            .await?;

        let mut device = Device::new(request.device_id, request.device_type, Utc::now());
        device.serial_number = request.serial_number;
        device.location = request.location;
        device.bin_type = request.bin_type;
        device.capacity = request.capacity;
        device.metadata = request.metadata;

        self.bounded("device store", self.devices.insert(&device)).await?;

        metrics::counter!("devices_registered_total").increment(1);
        tracing::info!(
            device_id = %device.device_id,
            device_type = %device.device_type,
            "Device registered"
        );

        Ok(DeviceRegistration { device, credential })
    }

    pub async fn get_device(&self, device_id: &str) -> Result<Device, OrchestratorError> {
        self.bounded("device store", self.devices.get(device_id))
            .await?
            .ok_or_else(|| OrchestratorError::NotFound(format!("device {} not found", device_id)))
    }

    pub async fn list_devices(
        &self,
        status: Option<DeviceStatus>,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> Result<(Vec<Device>, u64, i64, i64), OrchestratorError> {
        let (limit, offset) = clamp_page(limit, offset);
        let filter = DeviceFilter { status, limit, offset };
        let (devices, total) = self.bounded("device store", self.devices.query(&filter)).await?;
        Ok((devices, total, limit, offset))
    }

    /// Route a device event. Unknown event types are acknowledged and ignored.
    pub async fn record_device_event(
        &self,
        device_id: &str,
        event_type: &str,
        payload: Metadata,
    ) -> Result<DeviceEventOutcome, OrchestratorError> {
        validate_device_id(device_id).map_err(OrchestratorError::Validation)?;

        let mut outcome = DeviceEventOutcome {
            event_id: new_event_id(),
            event_type: event_type.to_string(),
            ignored: false,
            created_job: None,
            job: None,
            device: None,
        };

        match event_type {
            EVENT_IMAGE_CAPTURED => {
                outcome.created_job = Some(self.create_job(device_id, payload).await?);
            }
            EVENT_DEVICE_STATUS => {
                let update = TelemetryUpdate::from_payload(&payload)
                    .map_err(|e| OrchestratorError::Validation(e.to_string()))?;
                let device = self
                    .bounded(
                        "device store",
                        self.devices.apply_telemetry(device_id, &update, Utc::now()),
                    )
                    .await?
                    .ok_or_else(|| {
                        OrchestratorError::NotFound(format!("device {} not found", device_id))
                    })?;
                tracing::info!(
                    device_id = %device_id,
                    battery_level = ?device.battery_level,
                    fill_level = ?device.fill_level,
                    needs_maintenance = device.needs_maintenance(),
                    "Device telemetry updated"
                );
                outcome.device = Some(device);
            }
            EVENT_ERROR => {
                tracing::error!(device_id = %device_id, data = ?payload, "Device error reported");
                let device = self.record_device_error(device_id).await?;
                outcome.device = Some(device);
            }
            EVENT_UPLOAD_STARTED | EVENT_UPLOAD_COMPLETED => {
                let to = if event_type == EVENT_UPLOAD_STARTED {
                    JobStatus::Uploading
                } else {
                    JobStatus::Processing
                };
                let (job, applied) = self.advance_upload(device_id, &payload, to).await?;
                outcome.ignored = !applied;
                outcome.job = Some(job);
            }
            other => {
                tracing::warn!(device_id = %device_id, event_type = %other, "Unknown device event type");
                outcome.ignored = true;
            }
        }

        let label = if outcome.ignored && outcome.job.is_none() { "unknown" } else { event_type };
        metrics::counter!("device_events_total", "event_type" => label.to_string()).increment(1);

        Ok(outcome)
    }

    async fn record_device_error(&self, device_id: &str) -> Result<Device, OrchestratorError> {
        let mut device = self
            .bounded(
                "device store",
                self.devices.increment_counters(device_id, 0, 1, Utc::now()),
            )
            .await?
            .ok_or_else(|| OrchestratorError::NotFound(format!("device {} not found", device_id)))?;

        if device.total_errors > ERROR_THRESHOLD && device.status == DeviceStatus::Active {
            let reason = format!("error count {} exceeded threshold {}", device.total_errors, ERROR_THRESHOLD);
            let flipped = self
                .bounded(
                    "device store",
                    self.devices.set_status_if(
                        device_id,
                        DeviceStatus::Active,
                        DeviceStatus::Error,
                        Some(reason.as_str()),
                        Utc::now(),
                    ),
                )
                .await?;
            if flipped {
                tracing::warn!(device_id = %device_id, total_errors = device.total_errors, "Device moved to error status");
                device.status = DeviceStatus::Error;
                device.status_reason = Some(reason);
            }
        }
        Ok(device)
    }

    /// Move a job along the upload path. Returns the job and whether it changed.
    ///
    /// Illegal or lost transitions are acknowledged, not raised.
    async fn advance_upload(
        &self,
        device_id: &str,
        payload: &Metadata,
        to: JobStatus,
    ) -> Result<(Job, bool), OrchestratorError> {
        let job_id = payload
            .get("job_id")
            .and_then(|v| v.as_str())
            .filter(|id| !id.is_empty())
            .ok_or_else(|| OrchestratorError::Validation("job_id is required".to_string()))?;

        let job = self.get_job(job_id).await?;
        if job.device_id != device_id {
            return Err(OrchestratorError::Validation(format!(
                "job {} does not belong to device {}",
                job_id, device_id
            )));
        }

        let expected = job.status;
        let mut next = job.clone();
        if let Err(e) = next.transition_to(to, Utc::now()) {
            tracing::warn!(job_id = %job_id, error = %e, "Upload event ignored");
            return Ok((job, false));
        }

        if self
            .bounded("job store", self.jobs.update_if_status(&next, expected))
            .await?
        {
            tracing::info!(job_id = %job_id, status = %to, "Job upload progressed");
            Ok((next, true))
        } else {
            let current = self.get_job(job_id).await?;
            Ok((current, false))
        }
    }

    pub async fn health_check(&self) -> Result<(), OrchestratorError> {
        self.bounded("job store", self.jobs.health_check()).await?;
        self.bounded("device store", self.devices.health_check()).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_page_defaults_and_bounds() {
        assert_eq!(clamp_page(None, None), (DEFAULT_PAGE_LIMIT, 0));
        assert_eq!(clamp_page(Some(-5), Some(-1)), (0, 0));
        assert_eq!(clamp_page(Some(500), Some(20)), (MAX_PAGE_LIMIT, 20));
        assert_eq!(clamp_page(Some(0), None), (0, 0));
    }

    #[test]
    fn test_generated_ids_are_unique_and_prefixed() {
        let a = new_job_id();
        let b = new_job_id();
        assert!(a.starts_with("job_"));
        assert_ne!(a, b);
        assert!(new_event_id().starts_with("evt_"));
    }
}
