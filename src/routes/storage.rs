use axum::extract::{Multipart, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use crate::app_state::AppState;
use crate::routes::ApiError;
use crate::services::storage::ObjectStore;

#[derive(Debug, Deserialize)]
pub struct ObjectQuery {
    pub bucket: String,
    pub key: String,
}

/// POST /api/v1/storage/upload — multipart upload (bucket + file); the
/// object lands under a uuid-prefixed key, which is returned.
pub async fn upload_object(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    let mut bucket: Option<String> = None;
    let mut file: Option<(String, String, Vec<u8>)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(e.to_string()))?
    {
        if field.name() == Some("bucket") {
            let value = field
                .text()
                .await
                .map_err(|e| ApiError::BadRequest(e.to_string()))?;
            bucket = Some(value);
        } else if field.name() == Some("file") {
            let file_name = field.file_name().unwrap_or("upload").to_string();
            let content_type = field
                .content_type()
                .unwrap_or("application/octet-stream")
                .to_string();
            let data = field
                .bytes()
                .await
                .map_err(|e| ApiError::BadRequest(e.to_string()))?;
            file = Some((file_name, content_type, data.to_vec()));
        }
    }

    let bucket = bucket.ok_or_else(|| ApiError::BadRequest("Missing bucket field".to_string()))?;
    let (file_name, content_type, data) =
        file.ok_or_else(|| ApiError::BadRequest("Missing file field".to_string()))?;

    let key = state
        .storage
        .upload(&bucket, &file_name, &data, &content_type)
        .await?;
    tracing::info!(%bucket, %key, size = data.len(), "Stored object");

    Ok((StatusCode::CREATED, Json(json!({ "bucket": bucket, "key": key }))))
}

/// GET /api/v1/storage/read?bucket=&key= — object content as text.
pub async fn read_object(
    State(state): State<AppState>,
    Query(query): Query<ObjectQuery>,
) -> Result<String, ApiError> {
    Ok(state.storage.read_text(&query.bucket, &query.key).await?)
}

/// DELETE /api/v1/storage/delete?bucket=&key=
pub async fn delete_object(
    State(state): State<AppState>,
    Query(query): Query<ObjectQuery>,
) -> Result<StatusCode, ApiError> {
    state.storage.delete(&query.bucket, &query.key).await?;
    tracing::info!(bucket = %query.bucket, key = %query.key, "Deleted object");
    Ok(StatusCode::NO_CONTENT)
}
