use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

use super::Metadata;

/// A device counts as online when it was seen within this window.
pub const ONLINE_WINDOW_SECS: i64 = 5 * 60;

/// Cumulative error count above which a device needs maintenance.
pub const ERROR_THRESHOLD: i64 = 10;

pub const LOW_BATTERY_PERCENT: i32 = 20;
pub const FULL_BIN_PERCENT: i32 = 90;
pub const GOOD_SIGNAL_DBM: i32 = -70;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, EnumString, Display, AsRefStr, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DeviceStatus {
    Active,
    Inactive,
    Maintenance,
    Error,
    Decommissioned,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, EnumString, Display, AsRefStr, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DeviceType {
    SmartBinV1,
    SmartBinV2,
    SmartBinIndustrial,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, EnumString, Display, AsRefStr, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum BinType {
    Recyclable,
    Organic,
    General,
    Mixed,
}

/// Where a device is installed.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Location {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub building: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub floor: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub area: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
}

/// A physical capture unit. Jobs reference it by id only.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Device {
    pub device_id: String,
    pub device_type: DeviceType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serial_number: Option<String>,
    pub status: DeviceStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bin_type: Option<BinType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capacity: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub battery_level: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fill_level: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signal_strength: Option<i32>,
    #[serde(default, skip_serializing_if = "Metadata::is_empty")]
    pub metadata: Metadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_seen: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub total_jobs: i64,
    #[serde(default)]
    pub total_errors: i64,
}

impl Device {
    pub fn new(device_id: String, device_type: DeviceType, now: DateTime<Utc>) -> Self {
        Self {
            device_id,
            device_type,
            serial_number: None,
            status: DeviceStatus::Active,
            status_reason: None,
            location: None,
            bin_type: None,
            capacity: None,
            battery_level: None,
            fill_level: None,
            signal_strength: None,
            metadata: Metadata::new(),
            last_seen: None,
            created_at: now,
            updated_at: now,
            total_jobs: 0,
            total_errors: 0,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == DeviceStatus::Active
    }

    pub fn is_online(&self, now: DateTime<Utc>) -> bool {
        self.last_seen
            .is_some_and(|seen| now - seen < Duration::seconds(ONLINE_WINDOW_SECS))
    }

    pub fn needs_maintenance(&self) -> bool {
        self.status == DeviceStatus::Maintenance
            || self.battery_level.is_some_and(|b| b < LOW_BATTERY_PERCENT)
            || self.fill_level.is_some_and(|f| f > FULL_BIN_PERCENT)
            || self.total_errors > ERROR_THRESHOLD
    }

    pub fn battery_status(&self) -> &'static str {
        match self.battery_level {
            None => "unknown",
            Some(level) if level > 80 => "high",
            Some(level) if level > 40 => "medium",
            Some(level) if level > 20 => "low",
            Some(_) => "critical",
        }
    }

    pub fn fill_status(&self) -> &'static str {
        match self.fill_level {
            None => "unknown",
            Some(level) if level < 30 => "empty",
            Some(level) if level < 70 => "half_full",
            Some(level) if level < 90 => "almost_full",
            Some(_) => "full",
        }
    }

    pub fn has_good_signal(&self) -> bool {
        self.signal_strength.is_some_and(|s| s > GOOD_SIGNAL_DBM)
    }

    pub fn display_name(&self) -> String {
        match self.location.as_ref().and_then(|l| l.area.as_deref()) {
            Some(area) if !area.is_empty() => format!("{} - {}", area, self.device_id),
            _ => self.device_id.clone(),
        }
    }

    /// Merge telemetry. Absent fields keep their current value. A decommissioned device
    /// keeps its status.
    pub fn apply_telemetry(&mut self, update: &TelemetryUpdate, now: DateTime<Utc>) {
        if let Some(battery) = update.battery_level {
            self.battery_level = Some(battery);
        }
        if let Some(fill) = update.fill_level {
            self.fill_level = Some(fill);
        }
        if let Some(signal) = update.signal_strength {
            self.signal_strength = Some(signal);
        }
        // Decommissioning is only undone by an operator, never by telemetry.
        if self.status != DeviceStatus::Decommissioned {
            if let Some(status) = update.status {
                self.status = status;
            }
            if let Some(reason) = &update.status_reason {
                self.status_reason = Some(reason.clone());
            }
        }
        if let Some(location) = &update.location {
            self.location = Some(location.clone());
        }
        self.last_seen = Some(now);
        self.updated_at = now;
    }
}

/// Telemetry reported by a `device_status` event. Each field is independently optional.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TelemetryUpdate {
    pub battery_level: Option<i32>,
    pub fill_level: Option<i32>,
    pub signal_strength: Option<i32>,
    pub status: Option<DeviceStatus>,
    pub status_reason: Option<String>,
    pub location: Option<Location>,
}

impl TelemetryUpdate {
    /// Extract telemetry fields from a device event payload.
    ///
    /// Missing or null keys stay `None`; present keys must be well typed and in range.
    pub fn from_payload(payload: &Metadata) -> Result<Self, TelemetryError> {
        let battery_level = percent_field(payload, "battery_level")?;
        let fill_level = percent_field(payload, "fill_level")?;
        let signal_strength = int_field(payload, "signal_strength")?;

        let status = match string_field(payload, "status")? {
            Some(raw) => Some(
                raw.parse::<DeviceStatus>()
                    .map_err(|_| TelemetryError::InvalidField("status"))?,
            ),
            None => None,
        };
        let status_reason = string_field(payload, "status_reason")?.map(str::to_string);

        let location = match payload.get("location") {
            None | Some(serde_json::Value::Null) => None,
            Some(value) => Some(
                serde_json::from_value(value.clone())
                    .map_err(|_| TelemetryError::InvalidField("location"))?,
            ),
        };

        Ok(Self {
            battery_level,
            fill_level,
            signal_strength,
            status,
            status_reason,
            location,
        })
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

fn int_field(payload: &Metadata, key: &'static str) -> Result<Option<i32>, TelemetryError> {
    match payload.get(key) {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(value) => value
            .as_i64()
            .and_then(|v| i32::try_from(v).ok())
            .map(Some)
            .ok_or(TelemetryError::InvalidField(key)),
    }
}

fn percent_field(payload: &Metadata, key: &'static str) -> Result<Option<i32>, TelemetryError> {
    match int_field(payload, key)? {
        Some(v) if !(0..=100).contains(&v) => Err(TelemetryError::OutOfRange(key, v)),
        other => Ok(other),
    }
}

fn string_field<'a>(
    payload: &'a Metadata,
    key: &'static str,
) -> Result<Option<&'a str>, TelemetryError> {
    match payload.get(key) {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(value) => value
            .as_str()
            .map(Some)
            .ok_or(TelemetryError::InvalidField(key)),
    }
}

/// Filter for device listings.
#[derive(Debug, Clone, Default)]
pub struct DeviceFilter {
    pub status: Option<DeviceStatus>,
    pub limit: i64,
    pub offset: i64,
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum TelemetryError {
    #[error("telemetry field '{0}' has the wrong type")]
    InvalidField(&'static str),

    #[error("telemetry field '{0}' value {1} is outside 0..=100")]
    OutOfRange(&'static str, i32),
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
    }

    fn device() -> Device {
        Device::new("smart-bin-001".to_string(), DeviceType::SmartBinV1, now())
    }

    fn payload(value: serde_json::Value) -> Metadata {
        match value {
            serde_json::Value::Object(map) => map,
            _ => panic!("payload must be an object"),
        }
    }

    #[test]
    fn test_online_window() {
        let mut d = device();
        assert!(!d.is_online(now()));

        d.last_seen = Some(now() - Duration::minutes(2));
        assert!(d.is_online(now()));

        d.last_seen = Some(now() - Duration::minutes(5));
        assert!(!d.is_online(now()));
    }

    #[test]
    fn test_needs_maintenance_triggers() {
        let mut d = device();
        assert!(!d.needs_maintenance());

        d.battery_level = Some(19);
        assert!(d.needs_maintenance());
        d.battery_level = Some(20);
        assert!(!d.needs_maintenance());

        d.fill_level = Some(91);
        assert!(d.needs_maintenance());
        d.fill_level = Some(90);
        assert!(!d.needs_maintenance());

        d.total_errors = 11;
        assert!(d.needs_maintenance());
        d.total_errors = 10;
        assert!(!d.needs_maintenance());

        d.status = DeviceStatus::Maintenance;
        assert!(d.needs_maintenance());
    }

    #[test]
    fn test_battery_and_fill_bands() {
        let mut d = device();
        assert_eq!(d.battery_status(), "unknown");
        assert_eq!(d.fill_status(), "unknown");

        for (level, expected) in [(81, "high"), (80, "medium"), (41, "medium"), (21, "low"), (20, "critical")] {
            d.battery_level = Some(level);
            assert_eq!(d.battery_status(), expected, "battery {level}");
        }
        for (level, expected) in [(0, "empty"), (30, "half_full"), (70, "almost_full"), (90, "full")] {
            d.fill_level = Some(level);
            assert_eq!(d.fill_status(), expected, "fill {level}");
        }
    }

    #[test]
    fn test_signal_and_display_name() {
        let mut d = device();
        assert!(!d.has_good_signal());
        d.signal_strength = Some(-60);
        assert!(d.has_good_signal());
        d.signal_strength = Some(-70);
        assert!(!d.has_good_signal());

        assert_eq!(d.display_name(), "smart-bin-001");
        d.location = Some(Location { area: Some("Cafeteria".to_string()), ..Default::default() });
        assert_eq!(d.display_name(), "Cafeteria - smart-bin-001");
    }

    #[test]
    fn test_telemetry_merge_leaves_absent_fields() {
        let mut d = device();
        d.battery_level = Some(75);
        d.fill_level = Some(40);

        let update = TelemetryUpdate::from_payload(&payload(json!({
            "fill_level": 55,
            "battery_level": null
        })))
        .unwrap();
        d.apply_telemetry(&update, now());

        assert_eq!(d.battery_level, Some(75));
        assert_eq!(d.fill_level, Some(55));
        assert_eq!(d.signal_strength, None);
        assert_eq!(d.last_seen, Some(now()));
    }

    #[test]
    fn test_telemetry_cannot_revive_decommissioned_device() {
        let mut d = device();
        d.status = DeviceStatus::Decommissioned;
        d.status_reason = Some("retired".to_string());

        let update = TelemetryUpdate::from_payload(&payload(json!({
            "status": "active",
            "status_reason": "rebooted",
            "battery_level": 90
        })))
        .unwrap();
        d.apply_telemetry(&update, now());

        assert_eq!(d.status, DeviceStatus::Decommissioned);
        assert_eq!(d.status_reason.as_deref(), Some("retired"));
        assert_eq!(d.battery_level, Some(90));
        assert_eq!(d.last_seen, Some(now()));
    }

    #[test]
    fn test_telemetry_zero_is_not_unknown() {
        let update = TelemetryUpdate::from_payload(&payload(json!({ "fill_level": 0 }))).unwrap();
        assert_eq!(update.fill_level, Some(0));
        assert!(!update.is_empty());
    }

    #[test]
    fn test_telemetry_rejects_bad_values() {
        assert_eq!(
            TelemetryUpdate::from_payload(&payload(json!({ "battery_level": 130 }))),
            Err(TelemetryError::OutOfRange("battery_level", 130))
        );
        assert_eq!(
            TelemetryUpdate::from_payload(&payload(json!({ "signal_strength": "weak" }))),
            Err(TelemetryError::InvalidField("signal_strength"))
        );
        assert_eq!(
            TelemetryUpdate::from_payload(&payload(json!({ "status": "sleeping" }))),
            Err(TelemetryError::InvalidField("status"))
        );
    }

    #[test]
    fn test_telemetry_ignores_unknown_keys() {
        let update =
            TelemetryUpdate::from_payload(&payload(json!({ "firmware": "2.1.0", "temp_c": 31 })))
                .unwrap();
        assert!(update.is_empty());
    }
}
