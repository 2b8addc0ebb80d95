use async_trait::async_trait;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Input handed to the analysis pipeline for one job.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobPayload {
    pub id: i64,
    pub request_id: Uuid,
    pub geo_json: Option<String>,
}

/// One unit of work on the wire.
///
/// Redis list entries carry no headers, so the correlation id and the
/// reply channel ride inside the envelope. Workers must echo
/// `correlation_id` in their reply and publish it to `reply_to`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkEnvelope {
    pub correlation_id: String,
    pub reply_to: String,
    pub payload: JobPayload,
}

/// Publish side of the work channel, as seen by the dispatcher.
#[async_trait]
pub trait WorkQueue: Send + Sync {
    async fn publish_work(&self, envelope: &WorkEnvelope) -> Result<(), QueueError>;
}

/// Redis-backed broker for the analysis work and reply channels.
///
/// Both channels are plain lists: LPUSH to publish, BRPOP to consume,
/// so entries are handed to exactly one consumer in FIFO order.
pub struct RedisBroker {
    client: redis::Client,
    work_key: String,
    reply_key: String,
}

impl RedisBroker {
    pub fn new(redis_url: &str, work_key: &str, reply_key: &str) -> Result<Self, QueueError> {
        let client = redis::Client::open(redis_url).map_err(QueueError::Redis)?;
        Ok(Self {
            client,
            work_key: work_key.to_string(),
            reply_key: reply_key.to_string(),
        })
    }

    pub fn reply_key(&self) -> &str {
        &self.reply_key
    }

    /// Blocking-pop the next work envelope (worker side). Returns `None`
    /// when the timeout elapses with the channel empty.
    pub async fn pop_work(&self, timeout_secs: u64) -> Result<Option<WorkEnvelope>, QueueError> {
        let mut conn = self.client.get_multiplexed_async_connection().await.map_err(QueueError::Redis)?;
        let popped: Option<(String, String)> = redis::cmd("BRPOP")
            .arg(&self.work_key)
            .arg(timeout_secs)
            .query_async(&mut conn)
            .await
            .map_err(QueueError::Redis)?;

        match popped {
            Some((_, body)) => {
                let envelope: WorkEnvelope =
                    serde_json::from_str(&body).map_err(QueueError::Serialize)?;
                Ok(Some(envelope))
            }
            None => Ok(None),
        }
    }

    /// Blocking-pop the next raw reply body (listener side).
    ///
    /// The body is returned unparsed: the listener keeps the verbatim
    /// string on the job row and decides for itself what is malformed.
    pub async fn pop_reply(&self, timeout_secs: u64) -> Result<Option<String>, QueueError> {
        let mut conn = self.client.get_multiplexed_async_connection().await.map_err(QueueError::Redis)?;
        let popped: Option<(String, String)> = redis::cmd("BRPOP")
            .arg(&self.reply_key)
            .arg(timeout_secs)
            .query_async(&mut conn)
            .await
            .map_err(QueueError::Redis)?;

        Ok(popped.map(|(_, body)| body))
    }

    /// Publish a reply body to the channel named by a work envelope's
    /// `reply_to` (worker side).
    pub async fn push_reply(&self, reply_to: &str, body: &str) -> Result<(), QueueError> {
        let mut conn = self.client.get_multiplexed_async_connection().await.map_err(QueueError::Redis)?;
        conn.lpush::<_, _, ()>(reply_to, body)
            .await
            .map_err(QueueError::Redis)?;
        Ok(())
    }

    /// Check Redis connectivity (for health checks).
    pub async fn health_check(&self) -> Result<(), QueueError> {
        let mut conn = self.client.get_multiplexed_async_connection().await.map_err(QueueError::Redis)?;
        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .map_err(QueueError::Redis)?;
        Ok(())
    }

    /// Number of jobs waiting on the work channel.
    pub async fn work_depth(&self) -> Result<u64, QueueError> {
        let mut conn = self.client.get_multiplexed_async_connection().await.map_err(QueueError::Redis)?;
        let depth: u64 = conn.llen(&self.work_key).await.map_err(QueueError::Redis)?;
        Ok(depth)
    }
}

#[async_trait]
impl WorkQueue for RedisBroker {
    async fn publish_work(&self, envelope: &WorkEnvelope) -> Result<(), QueueError> {
        let mut conn = self.client.get_multiplexed_async_connection().await.map_err(QueueError::Redis)?;
        let body = serde_json::to_string(envelope).map_err(QueueError::Serialize)?;
        conn.lpush::<_, _, ()>(&self.work_key, &body)
            .await
            .map_err(QueueError::Redis)?;
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}
