use std::sync::Arc;

use crate::messaging::broker::{JobPayload, QueueError, WorkEnvelope, WorkQueue};
use crate::messaging::correlation::{CorrelationId, CorrelationStore};

/// Hands analysis jobs to the work channel.
///
/// Each submission mints a fresh correlation id, binds it to the job in
/// the correlation store, and only then publishes the envelope. Binding
/// first means a reply can never arrive for a token the store has not
/// seen, however fast the worker answers.
pub struct JobDispatcher {
    queue: Arc<dyn WorkQueue>,
    correlations: Arc<CorrelationStore>,
    reply_to: String,
}

impl JobDispatcher {
    pub fn new(
        queue: Arc<dyn WorkQueue>,
        correlations: Arc<CorrelationStore>,
        reply_to: &str,
    ) -> Self {
        Self {
            queue,
            correlations,
            reply_to: reply_to.to_string(),
        }
    }

    /// Publish one job to the analysis pipeline.
    ///
    /// On failure the correlation binding is left in place; it is
    /// harmless and the job row stays PENDING for a later resubmission.
    pub async fn submit(&self, payload: &JobPayload) -> Result<CorrelationId, DispatchError> {
        let correlation_id = CorrelationId::new();
        self.correlations.bind(&correlation_id, payload.id);

        let envelope = WorkEnvelope {
            correlation_id: correlation_id.to_string(),
            reply_to: self.reply_to.clone(),
            payload: payload.clone(),
        };

        self.queue.publish_work(&envelope).await?;

        metrics::counter!("jobs_dispatched_total").increment(1);
        tracing::info!(
            job_id = payload.id,
            request_id = %payload.request_id,
            correlation_id = %correlation_id,
            "Dispatched analysis job"
        );

        Ok(correlation_id)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("Failed to publish job: {0}")]
    Publish(#[from] QueueError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use uuid::Uuid;

    struct RecordingQueue {
        published: Mutex<Vec<WorkEnvelope>>,
        bound_at_publish: Mutex<Vec<Option<i64>>>,
        correlations: Arc<CorrelationStore>,
        fail: bool,
    }

    impl RecordingQueue {
        fn new(correlations: Arc<CorrelationStore>, fail: bool) -> Self {
            Self {
                published: Mutex::new(Vec::new()),
                bound_at_publish: Mutex::new(Vec::new()),
                correlations,
                fail,
            }
        }
    }

    #[async_trait]
    impl WorkQueue for RecordingQueue {
        async fn publish_work(&self, envelope: &WorkEnvelope) -> Result<(), QueueError> {
            // Observe the correlation store the way an instant reply would.
            self.bound_at_publish
                .lock()
                .unwrap()
                .push(self.correlations.job_for(&envelope.correlation_id));

            if self.fail {
                return Err(QueueError::Serialize(
                    serde_json::from_str::<()>("boom").unwrap_err(),
                ));
            }
            self.published.lock().unwrap().push(envelope.clone());
            Ok(())
        }
    }

    fn payload(id: i64) -> JobPayload {
        JobPayload {
            id,
            request_id: Uuid::nil(),
            geo_json: Some("{\"type\":\"FeatureCollection\",\"features\":[]}".to_string()),
        }
    }

    #[tokio::test]
    async fn test_submit_publishes_envelope_with_fresh_token() {
        let correlations = Arc::new(CorrelationStore::new());
        let queue = Arc::new(RecordingQueue::new(correlations.clone(), false));
        let dispatcher = JobDispatcher::new(queue.clone(), correlations.clone(), "replies");

        let first = dispatcher.submit(&payload(1)).await.unwrap();
        let second = dispatcher.submit(&payload(1)).await.unwrap();
        assert_ne!(first.to_string(), second.to_string());

        let published = queue.published.lock().unwrap();
        assert_eq!(published.len(), 2);
        assert_eq!(published[0].reply_to, "replies");
        assert_eq!(published[0].payload.id, 1);
        assert_eq!(published[0].correlation_id, first.to_string());
    }

    #[tokio::test]
    async fn test_binding_is_visible_before_publish() {
        // A worker could reply before publish_work even returns; the
        // binding must already be in the store at that point.
        let correlations = Arc::new(CorrelationStore::new());
        let queue = Arc::new(RecordingQueue::new(correlations.clone(), false));
        let dispatcher = JobDispatcher::new(queue.clone(), correlations.clone(), "replies");

        dispatcher.submit(&payload(42)).await.unwrap();

        let seen = queue.bound_at_publish.lock().unwrap();
        assert_eq!(seen.as_slice(), &[Some(42)]);
    }

    #[tokio::test]
    async fn test_publish_failure_surfaces_and_keeps_binding() {
        let correlations = Arc::new(CorrelationStore::new());
        let queue = Arc::new(RecordingQueue::new(correlations.clone(), true));
        let dispatcher = JobDispatcher::new(queue, correlations.clone(), "replies");

        let err = dispatcher.submit(&payload(9)).await.unwrap_err();
        assert!(matches!(err, DispatchError::Publish(_)));
    }
}
