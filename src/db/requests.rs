use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::models::api::{CreateRequestDto, UpdateRequestDto};
use crate::models::request::{AnalysisRequest, RequestStatus};

const REQUEST_COLUMNS: &str = "id, username, email, company_name, phone_number, \
     geo_json, message, status, created_at, updated_at";

/// Lenient status parse; unrecognized values map to PENDING with a
/// warning so a bad row shows up in the logs instead of passing as new.
fn status_from_column(raw: &str) -> RequestStatus {
    raw.parse().unwrap_or_else(|_| {
        tracing::warn!(status = raw, "Unrecognized request status in row; treating as PENDING");
        RequestStatus::Pending
    })
}

fn request_from_row(row: &PgRow) -> Result<AnalysisRequest, sqlx::Error> {
    let status_str: String = row.try_get("status")?;
    let status = status_from_column(&status_str);

    Ok(AnalysisRequest {
        id: row.try_get("id")?,
        username: row.try_get("username")?,
        email: row.try_get("email")?,
        company_name: row.try_get("company_name")?,
        phone_number: row.try_get("phone_number")?,
        geo_json: row.try_get("geo_json")?,
        message: row.try_get("message")?,
        status,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

/// Insert a new request; starts in PENDING.
pub async fn create_request(
    pool: &PgPool,
    dto: &CreateRequestDto,
) -> Result<AnalysisRequest, sqlx::Error> {
    let row = sqlx::query(&format!(
        r#"
        INSERT INTO requests (username, email, company_name, phone_number, geo_json, message)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING {REQUEST_COLUMNS}
        "#
    ))
    .bind(&dto.username)
    .bind(&dto.email)
    .bind(&dto.company_name)
    .bind(&dto.phone_number)
    .bind(&dto.geo_json)
    .bind(&dto.message)
    .fetch_one(pool)
    .await?;

    request_from_row(&row)
}

/// Get a request by ID
pub async fn get_request(
    pool: &PgPool,
    request_id: Uuid,
) -> Result<Option<AnalysisRequest>, sqlx::Error> {
    let row = sqlx::query(&format!(
        r#"
        SELECT {REQUEST_COLUMNS}
        FROM requests
        WHERE id = $1
        "#
    ))
    .bind(request_id)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(request_from_row).transpose()
}

/// All requests, newest first.
pub async fn list_requests(pool: &PgPool) -> Result<Vec<AnalysisRequest>, sqlx::Error> {
    let rows = sqlx::query(&format!(
        r#"
        SELECT {REQUEST_COLUMNS}
        FROM requests
        ORDER BY created_at DESC
        "#
    ))
    .fetch_all(pool)
    .await?;

    rows.iter().map(request_from_row).collect()
}

/// Partially update a request; absent fields keep their current value.
pub async fn update_request(
    pool: &PgPool,
    request_id: Uuid,
    dto: &UpdateRequestDto,
) -> Result<Option<AnalysisRequest>, sqlx::Error> {
    let row = sqlx::query(&format!(
        r#"
        UPDATE requests
        SET username = COALESCE($2, username),
            email = COALESCE($3, email),
            company_name = COALESCE($4, company_name),
            phone_number = COALESCE($5, phone_number),
            geo_json = COALESCE($6, geo_json),
            message = COALESCE($7, message),
            status = COALESCE($8, status),
            updated_at = NOW()
        WHERE id = $1
        RETURNING {REQUEST_COLUMNS}
        "#
    ))
    .bind(request_id)
    .bind(&dto.username)
    .bind(&dto.email)
    .bind(&dto.company_name)
    .bind(&dto.phone_number)
    .bind(&dto.geo_json)
    .bind(&dto.message)
    .bind(dto.status.map(|s| s.to_string()))
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(request_from_row).transpose()
}

/// Delete a request; its jobs go with it (FK cascade).
pub async fn delete_request(pool: &PgPool, request_id: Uuid) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM requests WHERE id = $1")
        .bind(request_id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

/// Count requests, optionally restricted to one status.
pub async fn count_requests(
    pool: &PgPool,
    status: Option<RequestStatus>,
) -> Result<i64, sqlx::Error> {
    let row = match status {
        Some(status) => {
            sqlx::query("SELECT COUNT(*) AS count FROM requests WHERE status = $1")
                .bind(status.to_string())
                .fetch_one(pool)
                .await?
        }
        None => {
            sqlx::query("SELECT COUNT(*) AS count FROM requests")
                .fetch_one(pool)
                .await?
        }
    };

    row.try_get("count")
}
