use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::models::job::{AnalysisJob, JobStatus};

const JOB_COLUMNS: &str = "id, request_id, status, result_data, result_geojson, \
     satellite_image_url, super_resolution_image_url, super_resolution_tif_url, \
     result_archive_url, result_geojson_url, bounds, result_finalized, \
     created_at, updated_at";

/// Parse a status column leniently. An unrecognized value maps to
/// CREATED so one bad row cannot break listing, but loudly: silent
/// fallback would disguise corruption as a re-dispatchable job.
fn status_from_column(raw: &str) -> JobStatus {
    raw.parse().unwrap_or_else(|_| {
        tracing::warn!(status = raw, "Unrecognized job status in row; treating as CREATED");
        JobStatus::Created
    })
}

fn job_from_row(row: &PgRow) -> Result<AnalysisJob, sqlx::Error> {
    let status_str: String = row.try_get("status")?;
    let status = status_from_column(&status_str);

    Ok(AnalysisJob {
        id: row.try_get("id")?,
        request_id: row.try_get("request_id")?,
        status,
        result_data: row.try_get("result_data")?,
        result_geojson: row.try_get("result_geojson")?,
        satellite_image_url: row.try_get("satellite_image_url")?,
        super_resolution_image_url: row.try_get("super_resolution_image_url")?,
        super_resolution_tif_url: row.try_get("super_resolution_tif_url")?,
        result_archive_url: row.try_get("result_archive_url")?,
        result_geojson_url: row.try_get("result_geojson_url")?,
        bounds: row.try_get("bounds")?,
        result_finalized: row.try_get("result_finalized")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

/// Insert a new job for a request; starts in CREATED.
pub async fn create_job(pool: &PgPool, request_id: Uuid) -> Result<AnalysisJob, sqlx::Error> {
    let row = sqlx::query(&format!(
        r#"
        INSERT INTO jobs (request_id)
        VALUES ($1)
        RETURNING {JOB_COLUMNS}
        "#
    ))
    .bind(request_id)
    .fetch_one(pool)
    .await?;

    job_from_row(&row)
}

/// Get a job by ID
pub async fn get_job(pool: &PgPool, job_id: i64) -> Result<Option<AnalysisJob>, sqlx::Error> {
    let row = sqlx::query(&format!(
        r#"
        SELECT {JOB_COLUMNS}
        FROM jobs
        WHERE id = $1
        "#
    ))
    .bind(job_id)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(job_from_row).transpose()
}

/// Jobs of one request in submission order (ascending id).
pub async fn jobs_for_request(
    pool: &PgPool,
    request_id: Uuid,
) -> Result<Vec<AnalysisJob>, sqlx::Error> {
    let rows = sqlx::query(&format!(
        r#"
        SELECT {JOB_COLUMNS}
        FROM jobs
        WHERE request_id = $1
        ORDER BY id ASC
        "#
    ))
    .bind(request_id)
    .fetch_all(pool)
    .await?;

    rows.iter().map(job_from_row).collect()
}

/// Update job status
pub async fn update_job_status(
    pool: &PgPool,
    job_id: i64,
    status: JobStatus,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE jobs
        SET status = $1, updated_at = NOW()
        WHERE id = $2
        "#,
    )
    .bind(status.to_string())
    .bind(job_id)
    .execute(pool)
    .await?;

    Ok(())
}

/// Write a reply outcome onto its job row in one UPDATE.
pub async fn save_reply_outcome(pool: &PgPool, job: &AnalysisJob) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE jobs
        SET status = $1,
            result_data = $2,
            result_geojson = $3,
            super_resolution_image_url = $4,
            super_resolution_tif_url = $5,
            result_archive_url = $6,
            result_geojson_url = $7,
            bounds = $8,
            updated_at = NOW()
        WHERE id = $9
        "#,
    )
    .bind(job.status.to_string())
    .bind(&job.result_data)
    .bind(&job.result_geojson)
    .bind(&job.super_resolution_image_url)
    .bind(&job.super_resolution_tif_url)
    .bind(&job.result_archive_url)
    .bind(&job.result_geojson_url)
    .bind(&job.bounds)
    .bind(job.id)
    .execute(pool)
    .await?;

    Ok(())
}

/// Set or clear the finalized flag, returning the updated job.
pub async fn set_finalized(
    pool: &PgPool,
    job_id: i64,
    finalized: bool,
) -> Result<Option<AnalysisJob>, sqlx::Error> {
    let row = sqlx::query(&format!(
        r#"
        UPDATE jobs
        SET result_finalized = $1, updated_at = NOW()
        WHERE id = $2
        RETURNING {JOB_COLUMNS}
        "#
    ))
    .bind(finalized)
    .bind(job_id)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(job_from_row).transpose()
}

/// Whether any job of the request already carries the finalized flag.
pub async fn any_finalized_for_request(
    pool: &PgPool,
    request_id: Uuid,
) -> Result<bool, sqlx::Error> {
    let row = sqlx::query(
        r#"
        SELECT EXISTS(
            SELECT 1 FROM jobs
            WHERE request_id = $1 AND result_finalized = TRUE
        ) AS finalized
        "#,
    )
    .bind(request_id)
    .fetch_one(pool)
    .await?;

    row.try_get("finalized")
}

/// The finalized job of a request, if one exists.
pub async fn finalized_job_for_request(
    pool: &PgPool,
    request_id: Uuid,
) -> Result<Option<AnalysisJob>, sqlx::Error> {
    let row = sqlx::query(&format!(
        r#"
        SELECT {JOB_COLUMNS}
        FROM jobs
        WHERE request_id = $1 AND result_finalized = TRUE
        LIMIT 1
        "#
    ))
    .bind(request_id)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(job_from_row).transpose()
}

/// Delete a job. Permitted regardless of the finalized flag.
pub async fn delete_job(pool: &PgPool, job_id: i64) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM jobs WHERE id = $1")
        .bind(job_id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

/// The slice of job persistence the reply listener needs. Kept narrow so
/// reply handling can be tested against an in-memory store.
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn get_job(&self, job_id: i64) -> Result<Option<AnalysisJob>, sqlx::Error>;
    async fn save_reply_outcome(&self, job: &AnalysisJob) -> Result<(), sqlx::Error>;
}

#[async_trait]
impl JobStore for PgPool {
    async fn get_job(&self, job_id: i64) -> Result<Option<AnalysisJob>, sqlx::Error> {
        get_job(self, job_id).await
    }

    async fn save_reply_outcome(&self, job: &AnalysisJob) -> Result<(), sqlx::Error> {
        save_reply_outcome(self, job).await
    }
}

/// The finalize bookkeeping the finalize endpoint needs, as a seam so
/// the exclusivity rule can be tested against an in-memory store.
#[async_trait]
pub trait FinalizeStore: Send + Sync {
    async fn any_finalized_for_request(&self, request_id: Uuid) -> Result<bool, sqlx::Error>;
    async fn set_finalized(
        &self,
        job_id: i64,
        finalized: bool,
    ) -> Result<Option<AnalysisJob>, sqlx::Error>;
}

#[async_trait]
impl FinalizeStore for PgPool {
    async fn any_finalized_for_request(&self, request_id: Uuid) -> Result<bool, sqlx::Error> {
        any_finalized_for_request(self, request_id).await
    }

    async fn set_finalized(
        &self,
        job_id: i64,
        finalized: bool,
    ) -> Result<Option<AnalysisJob>, sqlx::Error> {
        set_finalized(self, job_id, finalized).await
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FinalizeError {
    #[error("A job result has already been finalized for this request")]
    AlreadyFinalized,

    #[error("Job not found")]
    NotFound,

    #[error("Database error: {0}")]
    Db(#[from] sqlx::Error),
}

/// Mark one job's result as the authoritative answer for its request.
///
/// At most one job per request may carry the finalized flag; while any
/// job of the request holds it, a further finalize attempt is refused
/// without touching the flag holder. The check counts the target job
/// itself, so re-finalizing an already-finalized job is refused too.
pub async fn finalize_exclusively(
    store: &dyn FinalizeStore,
    request_id: Uuid,
    job_id: i64,
) -> Result<AnalysisJob, FinalizeError> {
    if store.any_finalized_for_request(request_id).await? {
        return Err(FinalizeError::AlreadyFinalized);
    }

    store
        .set_finalized(job_id, true)
        .await?
        .ok_or(FinalizeError::NotFound)
}
