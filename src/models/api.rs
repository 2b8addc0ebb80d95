use chrono::{DateTime, Utc};
use garde::Validate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::job::{AnalysisJob, JobStatus};
use crate::models::request::{AnalysisRequest, RequestStatus};

/// Body for creating an analysis request.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateRequestDto {
    #[garde(length(min = 1, max = 100))]
    pub username: String,

    #[garde(length(min = 3, max = 200))]
    pub email: String,

    #[garde(length(min = 1, max = 200))]
    pub company_name: Option<String>,

    #[garde(length(min = 3, max = 40))]
    pub phone_number: Option<String>,

    /// Road-network geometry as a GeoJSON document. Passed through to the
    /// worker untouched, so no schema validation happens here.
    #[garde(skip)]
    pub geo_json: Option<String>,

    #[garde(length(max = 2000))]
    pub message: Option<String>,
}

/// Body for partially updating a request. Absent fields are left as-is.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRequestDto {
    #[garde(length(min = 1, max = 100))]
    pub username: Option<String>,

    #[garde(length(min = 3, max = 200))]
    pub email: Option<String>,

    #[garde(length(min = 1, max = 200))]
    pub company_name: Option<String>,

    #[garde(length(min = 3, max = 40))]
    pub phone_number: Option<String>,

    #[garde(skip)]
    pub geo_json: Option<String>,

    #[garde(length(max = 2000))]
    pub message: Option<String>,

    #[garde(skip)]
    pub status: Option<RequestStatus>,
}

/// A job as returned by the API. Carries the owning request's geometry so
/// result pages can render without a second round trip.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobDto {
    pub id: i64,
    pub status: JobStatus,
    pub result_data: Option<String>,
    pub result_geojson: Option<String>,
    pub satellite_image_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub result_finalized: bool,
    pub request_id: Uuid,
    pub geo_json: Option<String>,
}

impl JobDto {
    pub fn from_job(job: &AnalysisJob, geo_json: Option<&str>) -> Self {
        Self {
            id: job.id,
            status: job.status,
            result_data: job.result_data.clone(),
            result_geojson: job.result_geojson.clone(),
            satellite_image_url: job.satellite_image_url.clone(),
            created_at: job.created_at,
            updated_at: job.updated_at,
            result_finalized: job.result_finalized,
            request_id: job.request_id,
            geo_json: geo_json.map(|g| g.to_string()),
        }
    }
}

/// A request as returned by the API, with its jobs in submission order.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestDto {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub company_name: Option<String>,
    pub phone_number: Option<String>,
    pub geo_json: Option<String>,
    pub message: Option<String>,
    pub status: RequestStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub jobs: Vec<JobDto>,
}

impl RequestDto {
    pub fn from_request(request: &AnalysisRequest, jobs: &[AnalysisJob]) -> Self {
        Self {
            id: request.id,
            username: request.username.clone(),
            email: request.email.clone(),
            company_name: request.company_name.clone(),
            phone_number: request.phone_number.clone(),
            geo_json: request.geo_json.clone(),
            message: request.message.clone(),
            status: request.status,
            created_at: request.created_at,
            updated_at: request.updated_at,
            jobs: jobs
                .iter()
                .map(|j| JobDto::from_job(j, request.geo_json.as_deref()))
                .collect(),
        }
    }
}

/// Super-resolution imagery pointers for a job's result page.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SuperResolutionDto {
    pub super_resolution_url: Option<String>,
    pub bounds: Option<String>,
}

impl SuperResolutionDto {
    pub fn from_job(job: &AnalysisJob) -> Self {
        Self {
            super_resolution_url: job.super_resolution_image_url.clone(),
            bounds: job.bounds.clone(),
        }
    }
}

/// Body for the finalized-job lookup; the caller proves they know the
/// email the request was filed under.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailRequestDto {
    pub email_id: String,
}

/// Body for the results-ready notification.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SendEmailDto {
    #[garde(length(min = 1, max = 2000))]
    pub link: String,
}
