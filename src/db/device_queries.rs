use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{PgPool, Row};

use super::{DeviceRepository, RepositoryError};
use crate::models::device::{BinType, Device, DeviceFilter, DeviceStatus, DeviceType, Location, TelemetryUpdate};
use crate::models::Metadata;

const DEVICE_COLUMNS: &str = "device_id, device_type, serial_number, status, status_reason, \
     location, bin_type, capacity, battery_level, fill_level, signal_strength, metadata, \
     last_seen, created_at, updated_at, total_jobs, total_errors";

/// PostgreSQL-backed device registry.
#[derive(Clone)]
pub struct PgDeviceRepository {
    pool: PgPool,
}

impl PgDeviceRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn parse_column<T: std::str::FromStr>(column: &str, raw: &str) -> Result<T, RepositoryError> {
    raw.parse::<T>()
        .map_err(|_| RepositoryError::Corrupt(format!("unknown {} '{}'", column, raw)))
}

fn device_from_row(r: &PgRow) -> Result<Device, RepositoryError> {
    let device_type: String = r.try_get("device_type")?;
    let status: String = r.try_get("status")?;
    let bin_type: Option<String> = r.try_get("bin_type")?;
    let location: Option<Json<Location>> = r.try_get("location")?;
    let metadata: Json<Metadata> = r.try_get("metadata")?;

    Ok(Device {
        device_id: r.try_get("device_id")?,
        device_type: parse_column::<DeviceType>("device_type", &device_type)?,
        serial_number: r.try_get("serial_number")?,
        status: parse_column::<DeviceStatus>("status", &status)?,
        status_reason: r.try_get("status_reason")?,
        location: location.map(|l| l.0),
        bin_type: bin_type
            .as_deref()
            .map(|b| parse_column::<BinType>("bin_type", b))
            .transpose()?,
        capacity: r.try_get("capacity")?,
        battery_level: r.try_get("battery_level")?,
        fill_level: r.try_get("fill_level")?,
        signal_strength: r.try_get("signal_strength")?,
        metadata: metadata.0,
        last_seen: r.try_get("last_seen")?,
        created_at: r.try_get("created_at")?,
        updated_at: r.try_get("updated_at")?,
        total_jobs: r.try_get("total_jobs")?,
        total_errors: r.try_get("total_errors")?,
    })
}

#[async_trait]
impl DeviceRepository for PgDeviceRepository {
    async fn get(&self, device_id: &str) -> Result<Option<Device>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {} FROM devices WHERE device_id = $1", DEVICE_COLUMNS))
            .bind(device_id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(device_from_row).transpose()
    }

    async fn insert(&self, device: &Device) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r#"
            INSERT INTO devices (device_id, device_type, serial_number, status, status_reason,
                                 location, bin_type, capacity, battery_level, fill_level,
                                 signal_strength, metadata, last_seen, created_at, updated_at,
                                 total_jobs, total_errors)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            "#,
        )
        .bind(&device.device_id)
        .bind(device.device_type.as_ref())
        .bind(device.serial_number.as_deref())
        .bind(device.status.as_ref())
        .bind(device.status_reason.as_deref())
        .bind(device.location.as_ref().map(Json))
        .bind(device.bin_type.map(|b| b.as_ref().to_string()))
        .bind(device.capacity)
        .bind(device.battery_level)
        .bind(device.fill_level)
        .bind(device.signal_strength)
        .bind(Json(&device.metadata))
        .bind(device.last_seen)
        .bind(device.created_at)
        .bind(device.updated_at)
        .bind(device.total_jobs)
        .bind(device.total_errors)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => Err(
                RepositoryError::Conflict(format!("device {} already exists", device.device_id)),
            ),
            Err(e) => Err(e.into()),
        }
    }

    async fn query(&self, filter: &DeviceFilter) -> Result<(Vec<Device>, u64), RepositoryError> {
        let status = filter.status.map(|s| s.as_ref().to_string());

        let rows = sqlx::query(&format!(
            r#"
            SELECT {}
            FROM devices
            WHERE ($1::text IS NULL OR status = $1)
            ORDER BY created_at DESC, device_id
            LIMIT $2 OFFSET $3
            "#,
            DEVICE_COLUMNS
        ))
        .bind(status.as_deref())
        .bind(filter.limit)
        .bind(filter.offset)
        .fetch_all(&self.pool)
        .await?;

        let total: i64 = sqlx::query(
            "SELECT COUNT(*) AS total FROM devices WHERE ($1::text IS NULL OR status = $1)",
        )
        .bind(status.as_deref())
        .fetch_one(&self.pool)
        .await?
        .try_get("total")?;

        let devices = rows.iter().map(device_from_row).collect::<Result<Vec<_>, _>>()?;
        Ok((devices, total.max(0) as u64))
    }

    async fn apply_telemetry(
        &self,
        device_id: &str,
        update: &TelemetryUpdate,
        seen_at: DateTime<Utc>,
    ) -> Result<Option<Device>, RepositoryError> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE devices
            SET battery_level = COALESCE($2, battery_level),
                fill_level = COALESCE($3, fill_level),
                signal_strength = COALESCE($4, signal_strength),
                status = CASE WHEN status = 'decommissioned' THEN status ELSE COALESCE($5, status) END,
                status_reason = CASE WHEN status = 'decommissioned' THEN status_reason ELSE COALESCE($6, status_reason) END,
                location = COALESCE($7, location),
                last_seen = $8,
                updated_at = $8
            WHERE device_id = $1
            RETURNING {}
            "#,
            DEVICE_COLUMNS
        ))
        .bind(device_id)
        .bind(update.battery_level)
        .bind(update.fill_level)
        .bind(update.signal_strength)
        .bind(update.status.map(|s| s.as_ref().to_string()))
        .bind(update.status_reason.as_deref())
        .bind(update.location.as_ref().map(Json))
        .bind(seen_at)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(device_from_row).transpose()
    }

    async fn increment_counters(
        &self,
        device_id: &str,
        jobs: i64,
        errors: i64,
        now: DateTime<Utc>,
    ) -> Result<Option<Device>, RepositoryError> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE devices
            SET total_jobs = total_jobs + $2,
                total_errors = total_errors + $3,
                updated_at = $4
            WHERE device_id = $1
            RETURNING {}
            "#,
            DEVICE_COLUMNS
        ))
        .bind(device_id)
        .bind(jobs)
        .bind(errors)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(device_from_row).transpose()
    }

    async fn set_status_if(
        &self,
        device_id: &str,
        expected: DeviceStatus,
        status: DeviceStatus,
        reason: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            r#"
            UPDATE devices
            SET status = $3, status_reason = $4, updated_at = $5
            WHERE device_id = $1 AND status = $2
            "#,
        )
        .bind(device_id)
        .bind(expected.as_ref())
        .bind(status.as_ref())
        .bind(reason)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn health_check(&self) -> Result<(), RepositoryError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
