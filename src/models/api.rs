use chrono::{DateTime, Utc};
use garde::Validate;
use serde::{Deserialize, Serialize};

use super::device::{BinType, Device, DeviceStatus, DeviceType, Location};
use super::job::{Job, JobStatus};
use super::Metadata;

fn device_id_rule(value: &str, _ctx: &()) -> garde::Result {
    super::validate_device_id(value).map_err(garde::Error::new)
}

/// POST /api/v1/jobs body.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateJobRequest {
    #[garde(custom(device_id_rule))]
    pub device_id: String,

    /// Capture time as reported by the device; informational only.
    #[garde(length(max = 64))]
    pub timestamp: Option<String>,

    #[garde(skip)]
    #[serde(default)]
    pub metadata: Metadata,
}

/// A persisted job together with the upload grant issued for it.
#[derive(Debug, Clone)]
pub struct CreatedJob {
    pub job: Job,
    pub upload_url: String,
    pub upload_expires_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct CreateJobResponse {
    pub job_id: String,
    pub device_id: String,
    pub status: JobStatus,
    pub image_key: String,
    pub upload_url: String,
    pub upload_expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl From<CreatedJob> for CreateJobResponse {
    fn from(created: CreatedJob) -> Self {
        Self {
            job_id: created.job.job_id,
            device_id: created.job.device_id,
            status: created.job.status,
            image_key: created.job.image_key,
            upload_url: created.upload_url,
            upload_expires_at: created.upload_expires_at,
            created_at: created.job.created_at,
        }
    }
}

/// Query string for GET /api/v1/jobs.
#[derive(Debug, Default, Deserialize)]
pub struct ListJobsQuery {
    pub device_id: Option<String>,
    pub status: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Query string for GET /api/v1/devices.
#[derive(Debug, Default, Deserialize)]
pub struct ListDevicesQuery {
    pub status: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Job as returned to clients, with derived fields.
#[derive(Debug, Serialize)]
pub struct JobView {
    #[serde(flatten)]
    pub job: Job,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processing_duration_ms: Option<i64>,
}

impl JobView {
    pub fn new(job: Job, now: DateTime<Utc>) -> Self {
        let processing_duration_ms = job.processing_duration(now).map(|d| d.num_milliseconds());
        Self { job, processing_duration_ms }
    }
}

#[derive(Debug, Serialize)]
pub struct ListJobsResponse {
    pub jobs: Vec<JobView>,
    pub total: u64,
    pub limit: i64,
    pub offset: i64,
}

/// POST /api/v1/devices/register body.
#[derive(Debug, Deserialize, Validate)]
pub struct RegisterDeviceRequest {
    #[garde(custom(device_id_rule))]
    pub device_id: String,

    #[garde(skip)]
    pub device_type: DeviceType,

    #[garde(length(min = 1, max = 128))]
    pub serial_number: Option<String>,

    #[garde(skip)]
    pub location: Option<Location>,

    #[garde(skip)]
    pub bin_type: Option<BinType>,

    #[garde(range(min = 0))]
    pub capacity: Option<i32>,

    #[garde(skip)]
    #[serde(default)]
    pub metadata: Metadata,
}

/// A registered device and the identity credential issued to it.
#[derive(Debug, Clone)]
pub struct DeviceRegistration {
    pub device: Device,
    pub credential: DeviceCredential,
}

/// Identity artifact handed to a device once, at registration.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceCredential {
    pub token: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct RegisterDeviceResponse {
    pub device_id: String,
    pub device_type: DeviceType,
    pub status: DeviceStatus,
    pub certificate: String,
    pub certificate_expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl From<DeviceRegistration> for RegisterDeviceResponse {
    fn from(reg: DeviceRegistration) -> Self {
        Self {
            device_id: reg.device.device_id,
            device_type: reg.device.device_type,
            status: reg.device.status,
            certificate: reg.credential.token,
            certificate_expires_at: reg.credential.expires_at,
            created_at: reg.device.created_at,
        }
    }
}

/// Device as returned to clients, with derived health fields.
#[derive(Debug, Serialize)]
pub struct DeviceView {
    #[serde(flatten)]
    pub device: Device,
    pub display_name: String,
    pub online: bool,
    pub needs_maintenance: bool,
    pub battery_status: &'static str,
    pub fill_status: &'static str,
    pub has_good_signal: bool,
}

impl DeviceView {
    pub fn new(device: Device, now: DateTime<Utc>) -> Self {
        Self {
            display_name: device.display_name(),
            online: device.is_online(now),
            needs_maintenance: device.needs_maintenance(),
            battery_status: device.battery_status(),
            fill_status: device.fill_status(),
            has_good_signal: device.has_good_signal(),
            device,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ListDevicesResponse {
    pub devices: Vec<DeviceView>,
    pub total: u64,
    pub limit: i64,
    pub offset: i64,
}

/// POST /api/v1/webhooks/classification body.
#[derive(Debug, Deserialize, Validate)]
pub struct ClassificationCallbackRequest {
    #[garde(length(min = 1, max = 128))]
    pub job_id: String,

    #[garde(length(min = 1, max = 32))]
    pub status: String,

    /// Parsed by the orchestrator so a malformed result fails the job instead of the request.
    #[garde(skip)]
    pub classification: Option<serde_json::Value>,

    #[garde(skip)]
    pub error: Option<String>,
}

/// How a classification callback was handled. Every variant is acknowledged to the producer.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CallbackOutcome {
    /// The job moved to a terminal state.
    Applied { status: JobStatus },
    /// No such job on this instance; nothing changed.
    UnknownJob,
    /// The job was already terminal; redelivery ignored.
    AlreadyTerminal { status: JobStatus },
    /// A concurrent writer finished the job first; this write was discarded.
    Superseded,
    /// The callback could not legally apply to the job in its current state.
    Rejected { reason: String },
}

impl CallbackOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            CallbackOutcome::Applied { .. } => "applied",
            CallbackOutcome::UnknownJob => "unknown_job",
            CallbackOutcome::AlreadyTerminal { .. } => "already_terminal",
            CallbackOutcome::Superseded => "superseded",
            CallbackOutcome::Rejected { .. } => "rejected",
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CallbackAck {
    pub job_id: String,
    pub received: bool,
    #[serde(flatten)]
    pub outcome: CallbackOutcome,
    pub processed_at: DateTime<Utc>,
}

/// POST /api/v1/webhooks/device-event body.
#[derive(Debug, Deserialize, Validate)]
pub struct DeviceEventRequest {
    #[garde(length(min = 1, max = 64))]
    pub event_type: String,

    #[garde(custom(device_id_rule))]
    pub device_id: String,

    #[garde(length(max = 64))]
    pub timestamp: Option<String>,

    #[garde(skip)]
    #[serde(default)]
    pub data: Metadata,
}

/// What a device event did.
#[derive(Debug, Clone)]
pub struct DeviceEventOutcome {
    pub event_id: String,
    pub event_type: String,
    pub ignored: bool,
    pub created_job: Option<CreatedJob>,
    pub job: Option<Job>,
    pub device: Option<Device>,
}

#[derive(Debug, Serialize)]
pub struct DeviceEventAck {
    pub event_id: String,
    pub event_type: String,
    pub received: bool,
    pub ignored: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_job: Option<CreateJobResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_status: Option<JobStatus>,
    pub processed_at: DateTime<Utc>,
}

impl DeviceEventAck {
    pub fn new(outcome: DeviceEventOutcome, now: DateTime<Utc>) -> Self {
        Self {
            event_id: outcome.event_id,
            event_type: outcome.event_type,
            received: true,
            ignored: outcome.ignored,
            created_job: outcome.created_job.map(CreateJobResponse::from),
            job_status: outcome.job.map(|job| job.status),
            processed_at: now,
        }
    }
}
