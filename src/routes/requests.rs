use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use garde::Validate;
use uuid::Uuid;

use crate::app_state::AppState;
use crate::db::{jobs, requests};
use crate::messaging::broker::JobPayload;
use crate::models::api::{
    CreateRequestDto, EmailRequestDto, JobDto, RequestDto, SendEmailDto, SuperResolutionDto,
    UpdateRequestDto,
};
use crate::models::job::{AnalysisJob, JobStatus};
use crate::models::request::{AnalysisRequest, RequestStatus};
use crate::routes::ApiError;

/// GET /api/v1/requests — all requests with their jobs, newest first.
pub async fn list_requests(
    State(state): State<AppState>,
) -> Result<Json<Vec<RequestDto>>, ApiError> {
    let requests = requests::list_requests(&state.db).await?;

    let mut dtos = Vec::with_capacity(requests.len());
    for request in &requests {
        let jobs = jobs::jobs_for_request(&state.db, request.id).await?;
        dtos.push(RequestDto::from_request(request, &jobs));
    }
    Ok(Json(dtos))
}

/// POST /api/v1/requests — create a new analysis request.
pub async fn create_request(
    State(state): State<AppState>,
    Json(dto): Json<CreateRequestDto>,
) -> Result<(StatusCode, Json<RequestDto>), ApiError> {
    dto.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let request = requests::create_request(&state.db, &dto).await?;
    tracing::info!(request_id = %request.id, username = %request.username, "Created analysis request");

    Ok((StatusCode::CREATED, Json(RequestDto::from_request(&request, &[]))))
}

/// GET /api/v1/requests/{id}
pub async fn get_request(
    State(state): State<AppState>,
    Path(request_id): Path<Uuid>,
) -> Result<Json<RequestDto>, ApiError> {
    let request = find_request(&state, request_id).await?;
    let jobs = jobs::jobs_for_request(&state.db, request.id).await?;
    Ok(Json(RequestDto::from_request(&request, &jobs)))
}

/// PUT /api/v1/requests/{id} — partial update of profile fields/status.
pub async fn update_request(
    State(state): State<AppState>,
    Path(request_id): Path<Uuid>,
    Json(dto): Json<UpdateRequestDto>,
) -> Result<Json<RequestDto>, ApiError> {
    dto.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let request = requests::update_request(&state.db, request_id, &dto)
        .await?
        .ok_or(ApiError::NotFound("Request"))?;
    let jobs = jobs::jobs_for_request(&state.db, request.id).await?;
    Ok(Json(RequestDto::from_request(&request, &jobs)))
}

/// DELETE /api/v1/requests/{id} — removes the request and its jobs.
pub async fn delete_request(
    State(state): State<AppState>,
    Path(request_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    if requests::delete_request(&state.db, request_id).await? {
        tracing::info!(%request_id, "Deleted analysis request");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound("Request"))
    }
}

/// GET /api/v1/requests/count/total
pub async fn count_total(State(state): State<AppState>) -> Result<Json<i64>, ApiError> {
    Ok(Json(requests::count_requests(&state.db, None).await?))
}

/// GET /api/v1/requests/count/pending
pub async fn count_pending(State(state): State<AppState>) -> Result<Json<i64>, ApiError> {
    Ok(Json(
        requests::count_requests(&state.db, Some(RequestStatus::Pending)).await?,
    ))
}

/// GET /api/v1/requests/count/completed
pub async fn count_completed(State(state): State<AppState>) -> Result<Json<i64>, ApiError> {
    Ok(Json(
        requests::count_requests(&state.db, Some(RequestStatus::Completed)).await?,
    ))
}

/// POST /api/v1/requests/{id}/submit-job — create a job and hand it to
/// the analysis pipeline.
///
/// The job row is marked PENDING before the publish, so a dispatch
/// failure leaves a PENDING job that a later submission can replace; the
/// endpoint then answers 502.
pub async fn submit_job(
    State(state): State<AppState>,
    Path(request_id): Path<Uuid>,
) -> Result<(StatusCode, Json<JobDto>), ApiError> {
    let request = find_request(&state, request_id).await?;

    let mut job = jobs::create_job(&state.db, request.id).await?;
    jobs::update_job_status(&state.db, job.id, JobStatus::Pending).await?;
    job.status = JobStatus::Pending;

    let payload = JobPayload {
        id: job.id,
        request_id: request.id,
        geo_json: request.geo_json.clone(),
    };
    state.dispatcher.submit(&payload).await?;

    Ok((
        StatusCode::CREATED,
        Json(JobDto::from_job(&job, request.geo_json.as_deref())),
    ))
}

/// GET /api/v1/requests/{id}/jobs-results — jobs of one request; 404
/// until at least one job exists.
pub async fn jobs_results(
    State(state): State<AppState>,
    Path(request_id): Path<Uuid>,
) -> Result<Json<Vec<JobDto>>, ApiError> {
    let request = find_request(&state, request_id).await?;
    let jobs = jobs::jobs_for_request(&state.db, request.id).await?;
    if jobs.is_empty() {
        return Err(ApiError::NotFound("Jobs"));
    }

    let geo_json = request.geo_json.as_deref();
    Ok(Json(jobs.iter().map(|j| JobDto::from_job(j, geo_json)).collect()))
}

/// POST /api/v1/requests/{id}/finalized-job — fetch the finalized job,
/// gated on knowing the email the request was filed under.
pub async fn finalized_job(
    State(state): State<AppState>,
    Path(request_id): Path<Uuid>,
    Json(dto): Json<EmailRequestDto>,
) -> Result<Json<JobDto>, ApiError> {
    let request = find_request(&state, request_id).await?;
    if request.email != dto.email_id {
        return Err(ApiError::BadRequest(
            "Email does not match this request".to_string(),
        ));
    }

    let job = jobs::finalized_job_for_request(&state.db, request.id)
        .await?
        .ok_or(ApiError::NotFound("Finalized job"))?;
    Ok(Json(JobDto::from_job(&job, request.geo_json.as_deref())))
}

/// POST /api/v1/requests/{rid}/job/{jid}/finalize
///
/// At most one job per request may carry the finalized flag; a second
/// attempt is refused without touching the first job.
pub async fn finalize_job(
    State(state): State<AppState>,
    Path((request_id, job_id)): Path<(Uuid, i64)>,
) -> Result<Json<JobDto>, ApiError> {
    let request = find_request(&state, request_id).await?;
    let job = find_job_of_request(&state, request_id, job_id).await?;

    let job = jobs::finalize_exclusively(&state.db, request_id, job.id).await?;
    tracing::info!(job_id = job.id, %request_id, "Finalized job result");
    Ok(Json(JobDto::from_job(&job, request.geo_json.as_deref())))
}

/// POST /api/v1/requests/{rid}/job/{jid}/reset-finalize
pub async fn reset_finalize(
    State(state): State<AppState>,
    Path((request_id, job_id)): Path<(Uuid, i64)>,
) -> Result<Json<JobDto>, ApiError> {
    let request = find_request(&state, request_id).await?;
    let job = find_job_of_request(&state, request_id, job_id).await?;

    let job = jobs::set_finalized(&state.db, job.id, false)
        .await?
        .ok_or(ApiError::NotFound("Job"))?;
    tracing::info!(job_id = job.id, %request_id, "Cleared finalized flag");
    Ok(Json(JobDto::from_job(&job, request.geo_json.as_deref())))
}

/// DELETE /api/v1/requests/{rid}/job/{jid} — allowed even when the job
/// is finalized.
pub async fn delete_job(
    State(state): State<AppState>,
    Path((request_id, job_id)): Path<(Uuid, i64)>,
) -> Result<StatusCode, ApiError> {
    find_job_of_request(&state, request_id, job_id).await?;

    jobs::delete_job(&state.db, job_id).await?;
    tracing::info!(job_id, %request_id, "Deleted job");
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/v1/requests/{rid}/job/{jid}/result — the worker's reply,
/// verbatim.
pub async fn job_result(
    State(state): State<AppState>,
    Path((request_id, job_id)): Path<(Uuid, i64)>,
) -> Result<impl IntoResponse, ApiError> {
    let job = find_job_of_request(&state, request_id, job_id).await?;
    let data = job.result_data.ok_or(ApiError::NotFound("Job result"))?;
    Ok(([(header::CONTENT_TYPE, "application/json")], data))
}

/// GET /api/v1/requests/{rid}/job/{jid}/geojson-result — the derived
/// geometry blob fetched from object storage.
pub async fn job_geojson_result(
    State(state): State<AppState>,
    Path((request_id, job_id)): Path<(Uuid, i64)>,
) -> Result<impl IntoResponse, ApiError> {
    let job = find_job_of_request(&state, request_id, job_id).await?;
    let data = job
        .result_geojson
        .ok_or(ApiError::NotFound("GeoJSON result"))?;
    Ok(([(header::CONTENT_TYPE, "application/geo+json")], data))
}

/// GET /api/v1/requests/{rid}/job/{jid}/sri-result — super-resolution
/// imagery pointers for the result page.
pub async fn job_sri_result(
    State(state): State<AppState>,
    Path((request_id, job_id)): Path<(Uuid, i64)>,
) -> Result<Json<SuperResolutionDto>, ApiError> {
    let job = find_job_of_request(&state, request_id, job_id).await?;
    Ok(Json(SuperResolutionDto::from_job(&job)))
}

/// POST /api/v1/requests/{id}/send-email — results-ready notification to
/// the address the request was filed under.
pub async fn send_email(
    State(state): State<AppState>,
    Path(request_id): Path<Uuid>,
    Json(dto): Json<SendEmailDto>,
) -> Result<Json<serde_json::Value>, ApiError> {
    dto.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let request = find_request(&state, request_id).await?;
    let body = format!(
        "Your pavement analysis results are ready. View them here: {}",
        dto.link
    );
    state
        .mailer
        .send(&request.email, "Your pavement analysis results", &body)
        .await?;

    tracing::info!(%request_id, "Sent results notification");
    Ok(Json(serde_json::json!({ "status": "sent" })))
}

async fn find_request(state: &AppState, request_id: Uuid) -> Result<AnalysisRequest, ApiError> {
    requests::get_request(&state.db, request_id)
        .await?
        .ok_or(ApiError::NotFound("Request"))
}

async fn find_job_of_request(
    state: &AppState,
    request_id: Uuid,
    job_id: i64,
) -> Result<AnalysisJob, ApiError> {
    let job = jobs::get_job(&state.db, job_id)
        .await?
        .ok_or(ApiError::NotFound("Job"))?;
    if job.request_id != request_id {
        return Err(ApiError::BadRequest(
            "Job does not belong to this request".to_string(),
        ));
    }
    Ok(job)
}
