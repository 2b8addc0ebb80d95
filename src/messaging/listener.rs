use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::time::sleep;

use crate::db::jobs::JobStore;
use crate::messaging::broker::RedisBroker;
use crate::messaging::correlation::CorrelationStore;
use crate::messaging::reply::{JobReplyMessage, ReplyStatus};
use crate::models::job::JobStatus;
use crate::services::storage::{ArtifactLocation, ObjectStore, StorageError};

const POP_TIMEOUT_SECS: u64 = 5;
const ERROR_BACKOFF_MS: u64 = 1000; // 1 second

/// Consumes the reply channel and applies worker outcomes to jobs.
///
/// Replies are resolved by the job id they carry, not by the in-memory
/// correlation binding, so outcomes survive a restart of this process.
/// Every parseable reply is recorded in the correlation store first,
/// whatever happens to it afterwards.
pub struct ReplyListener {
    jobs: Arc<dyn JobStore>,
    storage: Arc<dyn ObjectStore>,
    correlations: Arc<CorrelationStore>,
}

impl ReplyListener {
    pub fn new(
        jobs: Arc<dyn JobStore>,
        storage: Arc<dyn ObjectStore>,
        correlations: Arc<CorrelationStore>,
    ) -> Self {
        Self {
            jobs,
            storage,
            correlations,
        }
    }

    /// Apply one raw reply body to its job.
    ///
    /// The raw string is stored on the job verbatim. A duplicate delivery
    /// re-applies the same terminal outcome; last write wins. An artifact
    /// fetch failure is reported only after the job row has been saved,
    /// so the terminal status is never lost to a storage hiccup.
    pub async fn handle(&self, raw: &str) -> Result<i64, ReplyError> {
        let reply: JobReplyMessage = serde_json::from_str(raw).map_err(ReplyError::Malformed)?;

        self.correlations.record(&reply.correlation_id, reply.clone());
        let outcome = match reply.job_status {
            ReplyStatus::Success => "success",
            ReplyStatus::Error => "error",
        };
        metrics::counter!("job_replies_total", "outcome" => outcome).increment(1);

        let Some(mut job) = self.jobs.get_job(reply.job_id).await? else {
            return Err(ReplyError::UnknownJob(reply.job_id));
        };

        let next = match reply.job_status {
            ReplyStatus::Success => JobStatus::Completed,
            ReplyStatus::Error => JobStatus::Failed,
        };
        if !job.status.can_transition_to(next) {
            tracing::warn!(
                job_id = job.id,
                from = %job.status,
                to = %next,
                "Out-of-order job status transition applied from reply"
            );
        }

        job.status = next;
        job.result_data = Some(raw.to_string());
        job.result_geojson_url = reply.result_geojson_url.clone();
        job.result_archive_url = reply.result_archive_url.clone();
        job.super_resolution_image_url = reply.super_resolution_image_url.clone();
        job.super_resolution_tif_url = reply.super_resolution_tif_url.clone();
        job.bounds = reply.bounds.clone();

        // The geometry artifact is the only one whose content we pull in.
        let mut fetch_error = None;
        if job.status == JobStatus::Completed {
            if let Some(url) = job.result_geojson_url.clone() {
                match self.fetch_geojson(&url).await {
                    Ok(text) => job.result_geojson = Some(text),
                    Err(err) => fetch_error = Some(err),
                }
            }
        }

        self.jobs.save_reply_outcome(&job).await?;

        if let Some(err) = fetch_error {
            return Err(ReplyError::ArtifactFetch {
                job_id: job.id,
                source: err,
            });
        }
        Ok(job.id)
    }

    async fn fetch_geojson(&self, url: &str) -> Result<String, StorageError> {
        let location = ArtifactLocation::parse(url)?;
        self.storage.read_text(&location.bucket, &location.key).await
    }

    /// Consume the reply channel until the process exits.
    ///
    /// Each message is handled in isolation: a bad reply is logged and
    /// dropped, never re-queued, and never takes the loop down with it.
    pub async fn run(&self, broker: Arc<RedisBroker>) {
        loop {
            match broker.pop_reply(POP_TIMEOUT_SECS).await {
                Ok(Some(raw)) => {
                    let started = Instant::now();
                    match self.handle(&raw).await {
                        Ok(job_id) => {
                            tracing::info!(job_id, "Applied job reply");
                        }
                        Err(err @ ReplyError::ArtifactFetch { .. }) => {
                            tracing::warn!(error = %err, "Job reply applied without artifact content");
                        }
                        Err(err) => {
                            metrics::counter!("replies_dropped_total").increment(1);
                            tracing::error!(error = %err, "Failed to handle job reply");
                        }
                    }
                    metrics::histogram!("reply_handling_seconds")
                        .record(started.elapsed().as_secs_f64());
                }
                Ok(None) => {
                    // Timed out with the channel empty; poll again.
                }
                Err(err) => {
                    tracing::error!(error = %err, "Reply channel error");
                    sleep(Duration::from_millis(ERROR_BACKOFF_MS)).await;
                }
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ReplyError {
    #[error("Malformed reply payload: {0}")]
    Malformed(#[source] serde_json::Error),

    #[error("Reply references unknown job {0}")]
    UnknownJob(i64),

    #[error("Failed to fetch result artifact for job {job_id}: {source}")]
    ArtifactFetch {
        job_id: i64,
        #[source]
        source: StorageError,
    },

    #[error("Database error: {0}")]
    Db(#[from] sqlx::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::job::AnalysisJob;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use uuid::Uuid;

    struct MemoryJobStore {
        jobs: Mutex<HashMap<i64, AnalysisJob>>,
    }

    impl MemoryJobStore {
        fn with_jobs(jobs: Vec<AnalysisJob>) -> Self {
            Self {
                jobs: Mutex::new(jobs.into_iter().map(|j| (j.id, j)).collect()),
            }
        }

        fn job(&self, id: i64) -> AnalysisJob {
            self.jobs.lock().unwrap().get(&id).cloned().unwrap()
        }
    }

    #[async_trait]
    impl JobStore for MemoryJobStore {
        async fn get_job(&self, job_id: i64) -> Result<Option<AnalysisJob>, sqlx::Error> {
            Ok(self.jobs.lock().unwrap().get(&job_id).cloned())
        }

        async fn save_reply_outcome(&self, job: &AnalysisJob) -> Result<(), sqlx::Error> {
            self.jobs.lock().unwrap().insert(job.id, job.clone());
            Ok(())
        }
    }

    struct MemoryObjectStore {
        objects: Mutex<HashMap<String, String>>,
        fail: bool,
    }

    impl MemoryObjectStore {
        fn empty() -> Self {
            Self {
                objects: Mutex::new(HashMap::new()),
                fail: false,
            }
        }

        fn with_object(bucket: &str, key: &str, body: &str) -> Self {
            let store = Self::empty();
            store
                .objects
                .lock()
                .unwrap()
                .insert(format!("{bucket}/{key}"), body.to_string());
            store
        }

        fn failing() -> Self {
            Self {
                objects: Mutex::new(HashMap::new()),
                fail: true,
            }
        }
    }

    #[async_trait]
    impl ObjectStore for MemoryObjectStore {
        async fn read_text(&self, bucket: &str, key: &str) -> Result<String, StorageError> {
            if self.fail {
                return Err(StorageError::Config("storage offline".to_string()));
            }
            self.objects
                .lock()
                .unwrap()
                .get(&format!("{bucket}/{key}"))
                .cloned()
                .ok_or_else(|| StorageError::Config(format!("no such object {bucket}/{key}")))
        }
    }

    fn pending_job(id: i64) -> AnalysisJob {
        let now = Utc::now();
        AnalysisJob {
            id,
            request_id: Uuid::nil(),
            status: JobStatus::Pending,
            result_data: None,
            result_geojson: None,
            satellite_image_url: None,
            super_resolution_image_url: None,
            super_resolution_tif_url: None,
            result_archive_url: None,
            result_geojson_url: None,
            bounds: None,
            result_finalized: false,
            created_at: now,
            updated_at: now,
        }
    }

    fn listener(
        jobs: Arc<MemoryJobStore>,
        storage: Arc<MemoryObjectStore>,
    ) -> (ReplyListener, Arc<CorrelationStore>) {
        let correlations = Arc::new(CorrelationStore::new());
        (
            ReplyListener::new(jobs, storage, correlations.clone()),
            correlations,
        )
    }

    #[tokio::test]
    async fn test_success_reply_completes_job_and_fetches_geojson() {
        let jobs = Arc::new(MemoryJobStore::with_jobs(vec![pending_job(7)]));
        let storage = Arc::new(MemoryObjectStore::with_object(
            "bucket1",
            "x.geojson",
            "{\"type\":\"FeatureCollection\",\"features\":[]}",
        ));
        let (listener, correlations) = listener(jobs.clone(), storage);

        let raw = r#"{"correlationId":"c1","jobId":7,"jobStatus":"SUCCESS","resultGeoJsonURL":"https://bucket1.s3.amazonaws.com/x.geojson"}"#;
        assert_eq!(listener.handle(raw).await.unwrap(), 7);

        let job = jobs.job(7);
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.result_data.as_deref(), Some(raw));
        assert_eq!(
            job.result_geojson_url.as_deref(),
            Some("https://bucket1.s3.amazonaws.com/x.geojson")
        );
        assert_eq!(
            job.result_geojson.as_deref(),
            Some("{\"type\":\"FeatureCollection\",\"features\":[]}")
        );
        assert!(correlations.get("c1").is_some());
    }

    #[tokio::test]
    async fn test_error_reply_fails_job_without_touching_storage() {
        let jobs = Arc::new(MemoryJobStore::with_jobs(vec![pending_job(8)]));
        let storage = Arc::new(MemoryObjectStore::failing());
        let (listener, _) = listener(jobs.clone(), storage);

        let raw = r#"{"correlationId":"c2","jobId":8,"jobStatus":"ERROR","error":"tile download failed"}"#;
        listener.handle(raw).await.unwrap();

        let job = jobs.job(8);
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.result_data.as_deref(), Some(raw));
        assert_eq!(job.result_geojson, None);
    }

    #[tokio::test]
    async fn test_status_mapping_keys_off_job_status_not_error_field() {
        // Only jobStatus decides the terminal state; an error string on a
        // SUCCESS reply is informational and does not fail the job.
        let jobs = Arc::new(MemoryJobStore::with_jobs(vec![pending_job(14)]));
        let storage = Arc::new(MemoryObjectStore::empty());
        let (listener, _) = listener(jobs.clone(), storage);

        let raw = r#"{"correlationId":"c9","jobId":14,"jobStatus":"SUCCESS","error":"3 tiles skipped"}"#;
        listener.handle(raw).await.unwrap();

        let job = jobs.job(14);
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.result_data.as_deref(), Some(raw));
    }

    #[tokio::test]
    async fn test_success_without_artifact_url_skips_fetch() {
        let jobs = Arc::new(MemoryJobStore::with_jobs(vec![pending_job(9)]));
        let storage = Arc::new(MemoryObjectStore::failing());
        let (listener, _) = listener(jobs.clone(), storage);

        let raw = r#"{"correlationId":"c3","jobId":9,"jobStatus":"SUCCESS"}"#;
        listener.handle(raw).await.unwrap();

        let job = jobs.job(9);
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.result_geojson, None);
    }

    #[tokio::test]
    async fn test_unknown_job_is_rejected_but_reply_recorded() {
        let jobs = Arc::new(MemoryJobStore::with_jobs(vec![]));
        let storage = Arc::new(MemoryObjectStore::empty());
        let (listener, correlations) = listener(jobs, storage);

        let raw = r#"{"correlationId":"c4","jobId":404,"jobStatus":"SUCCESS"}"#;
        let err = listener.handle(raw).await.unwrap_err();
        assert!(matches!(err, ReplyError::UnknownJob(404)));

        // The audit record exists even though no job was touched.
        assert_eq!(correlations.get("c4").unwrap().job_id, 404);
    }

    #[tokio::test]
    async fn test_malformed_reply_is_rejected_without_side_effects() {
        let jobs = Arc::new(MemoryJobStore::with_jobs(vec![pending_job(10)]));
        let storage = Arc::new(MemoryObjectStore::empty());
        let (listener, correlations) = listener(jobs.clone(), storage);

        let err = listener.handle("not json at all").await.unwrap_err();
        assert!(matches!(err, ReplyError::Malformed(_)));

        let err = listener
            .handle(r#"{"correlationId":"c5","jobStatus":"SUCCESS"}"#)
            .await
            .unwrap_err();
        assert!(matches!(err, ReplyError::Malformed(_)));

        assert_eq!(jobs.job(10).status, JobStatus::Pending);
        assert_eq!(correlations.reply_count(), 0);
    }

    #[tokio::test]
    async fn test_fetch_failure_still_saves_terminal_outcome() {
        let jobs = Arc::new(MemoryJobStore::with_jobs(vec![pending_job(11)]));
        let storage = Arc::new(MemoryObjectStore::failing());
        let (listener, _) = listener(jobs.clone(), storage);

        let raw = r#"{"correlationId":"c6","jobId":11,"jobStatus":"SUCCESS","resultGeoJsonURL":"https://bucket1.s3.amazonaws.com/gone.geojson"}"#;
        let err = listener.handle(raw).await.unwrap_err();
        assert!(matches!(err, ReplyError::ArtifactFetch { job_id: 11, .. }));

        // The terminal status and the URL survived the storage failure.
        let job = jobs.job(11);
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.result_data.as_deref(), Some(raw));
        assert!(job.result_geojson_url.is_some());
        assert_eq!(job.result_geojson, None);
    }

    #[tokio::test]
    async fn test_duplicate_reply_reapplies_with_last_write_winning() {
        let jobs = Arc::new(MemoryJobStore::with_jobs(vec![pending_job(12)]));
        let storage = Arc::new(MemoryObjectStore::with_object(
            "bucket1",
            "v2.geojson",
            "{\"type\":\"FeatureCollection\",\"features\":[]}",
        ));
        let (listener, _) = listener(jobs.clone(), storage);

        let first = r#"{"correlationId":"c7","jobId":12,"jobStatus":"SUCCESS","bounds":"1,2,3,4"}"#;
        listener.handle(first).await.unwrap();

        let second = r#"{"correlationId":"c7","jobId":12,"jobStatus":"SUCCESS","resultGeoJsonURL":"https://bucket1.s3.amazonaws.com/v2.geojson","bounds":"5,6,7,8"}"#;
        listener.handle(second).await.unwrap();

        let job = jobs.job(12);
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.result_data.as_deref(), Some(second));
        assert_eq!(job.bounds.as_deref(), Some("5,6,7,8"));
        assert!(job.result_geojson.is_some());
    }

    #[tokio::test]
    async fn test_all_artifact_fields_are_copied() {
        let jobs = Arc::new(MemoryJobStore::with_jobs(vec![pending_job(13)]));
        let storage = Arc::new(MemoryObjectStore::with_object(
            "b",
            "derived.geojson",
            "{}",
        ));
        let (listener, _) = listener(jobs.clone(), storage);

        let raw = r#"{
            "correlationId": "c8",
            "jobId": 13,
            "jobStatus": "SUCCESS",
            "resultGeoJsonURL": "https://b.s3.amazonaws.com/derived.geojson",
            "resultZippedShapefileURL": "https://b.s3.amazonaws.com/shp.zip",
            "superResolutionImageURL": "https://b.s3.amazonaws.com/sri.png",
            "superResolutionTIFURL": "https://b.s3.amazonaws.com/sri.tif",
            "bounds": "30.61,-96.35,30.63,-96.33"
        }"#;
        listener.handle(raw).await.unwrap();

        let job = jobs.job(13);
        assert_eq!(
            job.result_archive_url.as_deref(),
            Some("https://b.s3.amazonaws.com/shp.zip")
        );
        assert_eq!(
            job.super_resolution_image_url.as_deref(),
            Some("https://b.s3.amazonaws.com/sri.png")
        );
        assert_eq!(
            job.super_resolution_tif_url.as_deref(),
            Some("https://b.s3.amazonaws.com/sri.tif")
        );
        assert_eq!(job.bounds.as_deref(), Some("30.61,-96.35,30.63,-96.33"));
        // Not part of the reply contract; left untouched.
        assert_eq!(job.satellite_image_url, None);
    }

    #[tokio::test]
    async fn test_concurrent_replies_for_different_jobs() {
        let jobs = Arc::new(MemoryJobStore::with_jobs(vec![
            pending_job(20),
            pending_job(21),
        ]));
        let storage = Arc::new(MemoryObjectStore::empty());
        let (listener, correlations) = listener(jobs.clone(), storage);

        let a = r#"{"correlationId":"ca","jobId":20,"jobStatus":"SUCCESS"}"#;
        let b = r#"{"correlationId":"cb","jobId":21,"jobStatus":"ERROR","error":"oom"}"#;
        let (ra, rb) = tokio::join!(listener.handle(a), listener.handle(b));
        ra.unwrap();
        rb.unwrap();

        assert_eq!(jobs.job(20).status, JobStatus::Completed);
        assert_eq!(jobs.job(21).status, JobStatus::Failed);
        assert_eq!(correlations.reply_count(), 2);
    }
}
