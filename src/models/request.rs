use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

/// Status of a portal request. Independent of the lifecycle of the jobs
/// dispatched for it; operators move a request along as they work it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display, EnumString)]
pub enum RequestStatus {
    #[strum(serialize = "PENDING")]
    #[serde(rename = "PENDING")]
    Pending,
    #[strum(serialize = "IN PROGRESS")]
    #[serde(rename = "IN PROGRESS")]
    InProgress,
    #[strum(serialize = "COMPLETED")]
    #[serde(rename = "COMPLETED")]
    Completed,
}

/// A client-submitted analysis request: contact details plus the road
/// network geometry to analyze. Owns an ordered collection of jobs
/// (ascending job id = submission order); deleting a request cascades.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisRequest {
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
}
