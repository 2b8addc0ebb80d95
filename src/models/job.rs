use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

/// Lifecycle of an analysis job.
///
/// `Created` means the row exists but nothing has been published yet;
/// `Pending` means the job was handed to the broker and a reply is
/// outstanding. `Completed` and `Failed` are terminal: the only things
/// that can happen to a terminal job are deletion and toggling of the
/// finalized flag.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Created,
    Pending,
    Completed,
    Failed,
}

impl JobStatus {
    /// Terminal statuses accept no further reply processing.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Whether the state machine permits moving from `self` to `next`.
    ///
    /// Re-entering the same terminal state is allowed so that a duplicate
    /// delivery of a reply can be re-applied idempotently.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        use JobStatus::*;
        match (self, next) {
            (Created, Pending) => true,
            (Pending, Completed) | (Pending, Failed) => true,
            (Completed, Completed) | (Failed, Failed) => true,
            _ => false,
        }
    }
}

/// A pavement-analysis job belonging to exactly one request.
///
/// `result_data` holds the worker's reply verbatim (opaque JSON, schema
/// owned by the worker); `result_geojson` holds the derived geometry blob
/// fetched from object storage after a successful reply. The remaining
/// URL fields point at auxiliary artifacts the worker uploaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisJob {
    pub id: i64,
    pub request_id: Uuid,
    pub status: JobStatus,
    pub result_data: Option<String>,
    pub result_geojson: Option<String>,
    pub satellite_image_url: Option<String>,
    pub super_resolution_image_url: Option<String>,
    pub super_resolution_tif_url: Option<String>,
    pub result_archive_url: Option<String>,
    pub result_geojson_url: Option<String>,
    pub bounds: Option<String>,
    pub result_finalized: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_created_dispatches_to_pending() {
        assert!(JobStatus::Created.can_transition_to(JobStatus::Pending));
        assert!(!JobStatus::Created.can_transition_to(JobStatus::Completed));
        assert!(!JobStatus::Created.can_transition_to(JobStatus::Failed));
    }

    #[test]
    fn test_pending_terminates_either_way() {
        assert!(JobStatus::Pending.can_transition_to(JobStatus::Completed));
        assert!(JobStatus::Pending.can_transition_to(JobStatus::Failed));
        assert!(!JobStatus::Pending.can_transition_to(JobStatus::Created));
    }

    #[test]
    fn test_terminal_states_only_reenter_themselves() {
        assert!(JobStatus::Completed.can_transition_to(JobStatus::Completed));
        assert!(JobStatus::Failed.can_transition_to(JobStatus::Failed));
        assert!(!JobStatus::Completed.can_transition_to(JobStatus::Pending));
        assert!(!JobStatus::Completed.can_transition_to(JobStatus::Failed));
        assert!(!JobStatus::Failed.can_transition_to(JobStatus::Completed));
    }

    #[test]
    fn test_terminal_predicate() {
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(!JobStatus::Created.is_terminal());
        assert!(!JobStatus::Pending.is_terminal());
    }

    #[test]
    fn test_status_round_trips_through_db_strings() {
        for status in [
            JobStatus::Created,
            JobStatus::Pending,
            JobStatus::Completed,
            JobStatus::Failed,
        ] {
            let text = status.to_string();
            assert_eq!(text.parse::<JobStatus>().unwrap(), status);
        }
        assert_eq!("PENDING".parse::<JobStatus>().unwrap(), JobStatus::Pending);
        assert!("RUNNING".parse::<JobStatus>().is_err());
    }
}
