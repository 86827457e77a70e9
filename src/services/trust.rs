use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};

use crate::models::api::DeviceCredential;

/// Minimum HMAC secret length accepted for signing device credentials.
pub const MIN_SECRET_LEN: usize = 32;

const DEVICE_SCOPE: &str = "device";

/// Issues identity credentials to newly registered devices.
#[async_trait]
pub trait TrustIssuer: Send + Sync {
    async fn issue_identity(&self, device_id: &str) -> Result<DeviceCredential, TrustError>;
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DeviceClaims {
    pub sub: String,
    pub iss: String,
    pub scope: String,
    pub iat: i64,
    pub exp: i64,
}

/// Signs device identity tokens (HS256).
pub struct JwtTrustIssuer {
    issuer: String,
    ttl: Duration,
    encoding_key: EncodingKey,
}

impl JwtTrustIssuer {
    pub fn new(issuer: &str, secret: &str, ttl: Duration) -> Result<Self, TrustError> {
        if secret.len() < MIN_SECRET_LEN {
            return Err(TrustError::WeakSecret(MIN_SECRET_LEN));
        }
        if ttl <= Duration::zero() {
            return Err(TrustError::InvalidTtl);
        }
        Ok(Self {
            issuer: issuer.to_string(),
            ttl,
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
        })
    }

    fn sign(&self, device_id: &str, now: DateTime<Utc>) -> Result<DeviceCredential, TrustError> {
        let expires_at = now + self.ttl;
        let claims = DeviceClaims {
            sub: device_id.to_string(),
            iss: self.issuer.clone(),
            scope: DEVICE_SCOPE.to_string(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(TrustError::Jwt)?;

        Ok(DeviceCredential {
            token,
            issued_at: now,
            expires_at,
        })
    }

}

#[async_trait]
impl TrustIssuer for JwtTrustIssuer {
    async fn issue_identity(&self, device_id: &str) -> Result<DeviceCredential, TrustError> {
        self.sign(device_id, Utc::now())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TrustError {
    #[error("Device token secret must be at least {0} bytes")]
    WeakSecret(usize),

    #[error("Device token TTL must be positive")]
    InvalidTtl,

    #[error("Token error: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),

    #[error("Identity issuance failed: {0}")]
    Issuer(String),
}
