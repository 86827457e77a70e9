use serde::Deserialize;
use std::time::Duration;

use crate::services::orchestrator::OrchestratorSettings;
use crate::services::storage::MAX_GRANT_TTL_SECS;
use crate::services::trust::MIN_SECRET_LEN;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Server bind address (e.g., "0.0.0.0:8080").
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    #[serde(default = "default_app_env")]
    pub app_env: String,

    /// Reported in response metadata.
    #[serde(default = "default_service_name")]
    pub service_name: String,

    #[serde(default = "default_service_version")]
    pub service_version: String,

    /// PostgreSQL connection string. Without it, state lives in memory.
    #[serde(default)]
    pub database_url: Option<String>,

    /// Bucket that receives device images.
    pub s3_bucket_images: String,

    /// S3-compatible endpoint URL
    pub s3_endpoint: String,

    #[serde(default = "default_s3_region")]
    pub s3_region: String,

    pub s3_access_key: String,

    pub s3_secret_key: String,

    /// Path-style addressing, needed by most local S3 emulators.
    #[serde(default)]
    pub s3_path_style: bool,

    /// Lifetime of presigned upload URLs.
    #[serde(default = "default_presigned_url_expiry_secs")]
    pub presigned_url_expiry_secs: u64,

    #[serde(default = "default_collaborator_timeout_ms")]
    pub collaborator_timeout_ms: u64,

    #[serde(default = "default_decision_timeout_ms")]
    pub decision_timeout_ms: u64,

    /// HMAC secret for device identity tokens.
    pub device_token_secret: String,

    #[serde(default = "default_device_token_ttl_secs")]
    pub device_token_ttl_secs: u64,
}

fn default_bind_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_app_env() -> String {
    "development".to_string()
}

fn default_service_name() -> String {
    "orchestrator".to_string()
}

fn default_service_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

fn default_s3_region() -> String {
    "us-east-1".to_string()
}

fn default_presigned_url_expiry_secs() -> u64 {
    900
}

fn default_collaborator_timeout_ms() -> u64 {
    5_000
}

fn default_decision_timeout_ms() -> u64 {
    10_000
}

fn default_device_token_ttl_secs() -> u64 {
    365 * 24 * 60 * 60
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let config: Self = envy::from_env()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.presigned_url_expiry_secs == 0 || self.presigned_url_expiry_secs > MAX_GRANT_TTL_SECS {
            return Err(ConfigError::Invalid(format!(
                "PRESIGNED_URL_EXPIRY_SECS must be within 1..={}",
                MAX_GRANT_TTL_SECS
            )));
        }
        if self.collaborator_timeout_ms == 0 || self.decision_timeout_ms == 0 {
            return Err(ConfigError::Invalid("timeouts must be positive".to_string()));
        }
        if self.device_token_secret.len() < MIN_SECRET_LEN {
            return Err(ConfigError::Invalid(format!(
                "DEVICE_TOKEN_SECRET must be at least {} bytes",
                MIN_SECRET_LEN
            )));
        }
        if self.device_token_ttl_secs == 0 {
            return Err(ConfigError::Invalid("DEVICE_TOKEN_TTL_SECS must be positive".to_string()));
        }
        Ok(())
    }

    pub fn is_development(&self) -> bool {
        self.app_env == "development"
    }

    pub fn orchestrator_settings(&self) -> OrchestratorSettings {
        OrchestratorSettings {
            upload_grant_ttl: Duration::from_secs(self.presigned_url_expiry_secs),
            collaborator_timeout: Duration::from_millis(self.collaborator_timeout_ms),
            decision_timeout: Duration::from_millis(self.decision_timeout_ms),
        }
    }

    pub fn device_token_ttl(&self) -> chrono::Duration {
        let secs = i64::try_from(self.device_token_ttl_secs).unwrap_or(i64::MAX);
        chrono::Duration::seconds(secs.min(i64::MAX / 1000))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read environment: {0}")]
    Env(#[from] envy::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
