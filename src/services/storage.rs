use async_trait::async_trait;
use chrono::{DateTime, Utc};
use s3::creds::Credentials;
use s3::{Bucket, Region};
use std::time::Duration;

/// S3 refuses presigned URLs valid for longer than seven days.
pub const MAX_GRANT_TTL_SECS: u64 = 7 * 24 * 60 * 60;

/// Time-bounded permission to upload a single object.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadGrant {
    pub url: String,
    pub expires_at: DateTime<Utc>,
}

/// Issues upload grants scoped to one storage key.
#[async_trait]
pub trait UploadGrantIssuer: Send + Sync {
    async fn issue_put_grant(&self, storage_key: &str, ttl: Duration) -> Result<UploadGrant, StorageError>;
}

/// Deterministic storage key for a job's image.
pub fn image_key(device_id: &str, job_id: &str) -> String {
    format!("uploads/{}/{}.jpg", device_id, job_id)
}

/// Presigns PUT URLs against an S3-compatible bucket.
pub struct S3Presigner {
    bucket: Box<Bucket>,
}

impl S3Presigner {
    pub fn new(
        bucket_name: &str,
        region: &str,
        endpoint: &str,
        access_key: &str,
        secret_key: &str,
        path_style: bool,
    ) -> Result<Self, StorageError> {
        let region = Region::Custom {
            region: region.to_string(),
            endpoint: endpoint.to_string(),
        };

        let credentials =
            Credentials::new(Some(access_key), Some(secret_key), None, None, None)
                .map_err(|e| StorageError::Config(e.to_string()))?;

        let bucket = Bucket::new(bucket_name, region, credentials)
            .map_err(|e| StorageError::Config(e.to_string()))?;

        let bucket = if path_style { bucket.with_path_style() } else { bucket };

        Ok(Self { bucket })
    }
}

#[async_trait]
impl UploadGrantIssuer for S3Presigner {
    async fn issue_put_grant(&self, storage_key: &str, ttl: Duration) -> Result<UploadGrant, StorageError> {
        let secs = ttl.as_secs();
        if secs == 0 || secs > MAX_GRANT_TTL_SECS {
            return Err(StorageError::InvalidTtl(secs));
        }
        let expires_at = Utc::now()
            + chrono::Duration::from_std(ttl).map_err(|_| StorageError::InvalidTtl(secs))?;

        // secs <= MAX_GRANT_TTL_SECS, fits in u32.
        let url = self
            .bucket
            .presign_put(storage_key, secs as u32, None, None)
            .await
            .map_err(StorageError::S3)?;

        Ok(UploadGrant { url, expires_at })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("S3 operation failed: {0}")]
    S3(#[from] s3::error::S3Error),

    #[error("Storage configuration error: {0}")]
    Config(String),

    #[error("Upload grant TTL of {0}s is outside 1..=604800")]
    InvalidTtl(u64),

    #[error("Upload grant issuance failed: {0}")]
    Issuer(String),
}
