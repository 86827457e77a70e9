pub mod api;
pub mod classification;
pub mod decision;
pub mod device;
pub mod job;

/// Free-form, forward-compatible payload: string keys over JSON values.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

pub const MAX_DEVICE_ID_LEN: usize = 128;

/// Device ids are 1-128 characters of `[A-Za-z0-9_.:-]`.
pub fn validate_device_id(device_id: &str) -> Result<(), String> {
    if device_id.is_empty() {
        return Err("device_id is required".to_string());
    }
    if device_id.len() > MAX_DEVICE_ID_LEN {
        return Err(format!("device_id exceeds {} characters", MAX_DEVICE_ID_LEN));
    }
    if let Some(c) = device_id
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | ':')))
    {
        return Err(format!("device_id contains invalid character '{}'", c));
    }
    Ok(())
}
