use std::fmt;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::messaging::reply::JobReplyMessage;

/// Opaque token minted once per dispatch attempt and threaded through the
/// broker so a reply can be associated with its originating job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CorrelationId(Uuid);

impl CorrelationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// In-process map from correlation token to the job it was minted for and
/// to the last reply seen under it.
///
/// The dispatcher binds token -> job id before publishing; the listener
/// records every inbound reply. Keys are plain strings because a reply's
/// token is taken as-is off the wire. Entries are never evicted: they are
/// small, and this store is a debugging aid — the job row is the source
/// of truth and survives restarts, which this map does not.
#[derive(Default)]
pub struct CorrelationStore {
    bindings: DashMap<String, i64>,
    replies: DashMap<String, JobReplyMessage>,
}

impl CorrelationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Associate a token with the job it was minted for. Must happen
    /// before the message carrying the token is published, or a fast
    /// reply could observe an unbound token.
    pub fn bind(&self, token: &CorrelationId, job_id: i64) {
        self.bindings.insert(token.to_string(), job_id);
    }

    /// The job a token was minted for, if this process minted it.
    pub fn job_for(&self, token: &str) -> Option<i64> {
        self.bindings.get(token).map(|entry| *entry)
    }

    /// Record the latest reply seen under a token. Duplicate deliveries
    /// overwrite; the reply is terminal so last-write-wins is fine.
    pub fn record(&self, token: &str, reply: JobReplyMessage) {
        self.replies.insert(token.to_string(), reply);
    }

    /// The last reply recorded under a token.
    pub fn get(&self, token: &str) -> Option<JobReplyMessage> {
        self.replies.get(token).map(|entry| entry.clone())
    }

    /// Number of replies retained, for diagnostics.
    pub fn reply_count(&self) -> usize {
        self.replies.len()
    }
}
