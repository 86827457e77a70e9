use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

use super::classification::Classification;
use super::decision::Decision;
use super::Metadata;

/// Lifecycle state of a classification job.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, EnumString, Display, AsRefStr, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Uploading,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    /// Legal successor states. Completed and Failed have none.
    pub const fn allowed_transitions(self) -> &'static [JobStatus] {
        match self {
            JobStatus::Pending => &[JobStatus::Uploading, JobStatus::Processing, JobStatus::Failed],
            JobStatus::Uploading => &[JobStatus::Processing, JobStatus::Failed],
            JobStatus::Processing => &[JobStatus::Completed, JobStatus::Failed],
            JobStatus::Completed | JobStatus::Failed => &[],
        }
    }

    pub fn can_transition_to(self, to: JobStatus) -> bool {
        self.allowed_transitions().contains(&to)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

/// One end-to-end classification task for a single captured image.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Job {
    pub job_id: String,
    pub device_id: String,
    pub status: JobStatus,
    pub image_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub classification: Option<Classification>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decision: Option<Decision>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Metadata::is_empty")]
    pub metadata: Metadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processing_started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    pub fn new(
        job_id: String,
        device_id: String,
        image_key: String,
        metadata: Metadata,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            job_id,
            device_id,
            status: JobStatus::Pending,
            image_key,
            classification: None,
            decision: None,
            error_message: None,
            metadata,
            created_at: now,
            updated_at: now,
            processing_started_at: None,
            completed_at: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn is_pending(&self) -> bool {
        self.status == JobStatus::Pending
    }

    pub fn is_processing(&self) -> bool {
        self.status == JobStatus::Processing
    }

    pub fn has_classification(&self) -> bool {
        self.classification.is_some()
    }

    pub fn has_decision(&self) -> bool {
        self.decision.is_some()
    }

    /// Move to any state except Failed, which needs a message (see [`Job::fail`]).
    ///
    /// On error the job is left untouched.
    pub fn transition_to(&mut self, to: JobStatus, now: DateTime<Utc>) -> Result<(), JobError> {
        if to == JobStatus::Failed {
            return Err(JobError::MissingErrorMessage);
        }
        self.check_transition(to)?;
        self.apply(to, now);
        Ok(())
    }

    /// Move to Failed with a non-empty error message.
    pub fn fail(&mut self, message: impl Into<String>, now: DateTime<Utc>) -> Result<(), JobError> {
        let message = message.into();
        if message.trim().is_empty() {
            return Err(JobError::MissingErrorMessage);
        }
        self.check_transition(JobStatus::Failed)?;
        self.error_message = Some(message);
        self.apply(JobStatus::Failed, now);
        Ok(())
    }

    /// Set the classification. Only legal while Processing and only once.
    pub fn attach_classification(
        &mut self,
        classification: Classification,
        now: DateTime<Utc>,
    ) -> Result<(), JobError> {
        if self.status != JobStatus::Processing {
            return Err(JobError::NotProcessing(self.status));
        }
        if self.classification.is_some() {
            return Err(JobError::ClassificationAlreadySet);
        }
        self.classification = Some(classification);
        self.updated_at = now;
        Ok(())
    }

    /// Set the decision. Requires a classification and only happens once.
    pub fn attach_decision(&mut self, decision: Decision, now: DateTime<Utc>) -> Result<(), JobError> {
        if self.classification.is_none() {
            return Err(JobError::DecisionWithoutClassification);
        }
        if self.decision.is_some() {
            return Err(JobError::DecisionAlreadySet);
        }
        self.decision = Some(decision);
        self.updated_at = now;
        Ok(())
    }

    /// Time spent in processing, measured up to completion or `now`.
    pub fn processing_duration(&self, now: DateTime<Utc>) -> Option<Duration> {
        let started = self.processing_started_at?;
        Some(self.completed_at.unwrap_or(now) - started)
    }

    fn check_transition(&self, to: JobStatus) -> Result<(), JobError> {
        if self.status.can_transition_to(to) {
            Ok(())
        } else {
            Err(JobError::InvalidTransition { from: self.status, to })
        }
    }

    fn apply(&mut self, to: JobStatus, now: DateTime<Utc>) {
        self.status = to;
        self.updated_at = now;
        match to {
            JobStatus::Processing => self.processing_started_at = Some(now),
            JobStatus::Completed | JobStatus::Failed => self.completed_at = Some(now),
            JobStatus::Pending | JobStatus::Uploading => {}
        }
    }
}

/// Filter for job listings.
#[derive(Debug, Clone, Default)]
pub struct JobFilter {
    pub device_id: Option<String>,
    pub status: Option<JobStatus>,
    pub limit: i64,
    pub offset: i64,
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum JobError {
    #[error("invalid status transition from {from} to {to}")]
    InvalidTransition { from: JobStatus, to: JobStatus },

    #[error("failing a job requires a non-empty error message")]
    MissingErrorMessage,

    #[error("job is {0}, classification can only be attached while processing")]
    NotProcessing(JobStatus),

    #[error("classification already attached")]
    ClassificationAlreadySet,

    #[error("decision requires a classification")]
    DecisionWithoutClassification,

    #[error("decision already attached")]
    DecisionAlreadySet,
}
