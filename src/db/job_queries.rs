use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{PgPool, Row};

use super::{JobRepository, RepositoryError};
use crate::models::classification::Classification;
use crate::models::decision::Decision;
use crate::models::job::{Job, JobFilter, JobStatus};
use crate::models::Metadata;

const JOB_COLUMNS: &str = "job_id, device_id, status, image_key, classification, decision, \
     error_message, metadata, created_at, updated_at, processing_started_at, completed_at";

/// PostgreSQL-backed job store.
#[derive(Clone)]
pub struct PgJobRepository {
    pool: PgPool,
}

impl PgJobRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn job_from_row(r: &PgRow) -> Result<Job, RepositoryError> {
    let status_str: String = r.try_get("status")?;
    let status = status_str
        .parse::<JobStatus>()
        .map_err(|_| RepositoryError::Corrupt(format!("unknown job status '{}'", status_str)))?;

    let classification: Option<Json<Classification>> = r.try_get("classification")?;
    let decision: Option<Json<Decision>> = r.try_get("decision")?;
    let metadata: Json<Metadata> = r.try_get("metadata")?;

    Ok(Job {
        job_id: r.try_get("job_id")?,
        device_id: r.try_get("device_id")?,
        status,
        image_key: r.try_get("image_key")?,
        classification: classification.map(|c| c.0),
        decision: decision.map(|d| d.0),
        error_message: r.try_get("error_message")?,
        metadata: metadata.0,
        created_at: r.try_get("created_at")?,
        updated_at: r.try_get("updated_at")?,
        processing_started_at: r.try_get("processing_started_at")?,
        completed_at: r.try_get("completed_at")?,
    })
}

#[async_trait]
impl JobRepository for PgJobRepository {
    async fn get(&self, job_id: &str) -> Result<Option<Job>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {} FROM jobs WHERE job_id = $1", JOB_COLUMNS))
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(job_from_row).transpose()
    }

    async fn insert(&self, job: &Job) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r#"
            INSERT INTO jobs (job_id, device_id, status, image_key, classification, decision,
                              error_message, metadata, created_at, updated_at,
                              processing_started_at, completed_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(&job.job_id)
        .bind(&job.device_id)
        .bind(job.status.as_ref())
        .bind(&job.image_key)
        .bind(job.classification.as_ref().map(Json))
        .bind(job.decision.as_ref().map(Json))
        .bind(job.error_message.as_deref())
        .bind(Json(&job.metadata))
        .bind(job.created_at)
        .bind(job.updated_at)
        .bind(job.processing_started_at)
        .bind(job.completed_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => Err(
                RepositoryError::Conflict(format!("job {} already exists", job.job_id)),
            ),
            Err(e) => Err(e.into()),
        }
    }

    async fn update_if_status(&self, job: &Job, expected: JobStatus) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET status = $2,
                classification = $3,
                decision = $4,
                error_message = $5,
                updated_at = $6,
                processing_started_at = $7,
                completed_at = $8
            WHERE job_id = $1 AND status = $9
            "#,
        )
        .bind(&job.job_id)
        .bind(job.status.as_ref())
        .bind(job.classification.as_ref().map(Json))
        .bind(job.decision.as_ref().map(Json))
        .bind(job.error_message.as_deref())
        .bind(job.updated_at)
        .bind(job.processing_started_at)
        .bind(job.completed_at)
        .bind(expected.as_ref())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn query(&self, filter: &JobFilter) -> Result<(Vec<Job>, u64), RepositoryError> {
        let status = filter.status.map(|s| s.as_ref().to_string());

        let rows = sqlx::query(&format!(
            r#"
            SELECT {}
            FROM jobs
            WHERE ($1::text IS NULL OR device_id = $1)
              AND ($2::text IS NULL OR status = $2)
            ORDER BY created_at DESC, job_id
            LIMIT $3 OFFSET $4
            "#,
            JOB_COLUMNS
        ))
        .bind(filter.device_id.as_deref())
        .bind(status.as_deref())
        .bind(filter.limit)
        .bind(filter.offset)
        .fetch_all(&self.pool)
        .await?;

        let total: i64 = sqlx::query(
            r#"
            SELECT COUNT(*) AS total
            FROM jobs
            WHERE ($1::text IS NULL OR device_id = $1)
              AND ($2::text IS NULL OR status = $2)
            "#,
        )
        .bind(filter.device_id.as_deref())
        .bind(status.as_deref())
        .fetch_one(&self.pool)
        .await?
        .try_get("total")?;

        let jobs = rows.iter().map(job_from_row).collect::<Result<Vec<_>, _>>()?;
        Ok((jobs, total.max(0) as u64))
    }

    async fn health_check(&self) -> Result<(), RepositoryError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
