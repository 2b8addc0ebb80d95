use sqlx::PgPool;
use std::sync::Arc;

use crate::messaging::broker::RedisBroker;
use crate::messaging::correlation::CorrelationStore;
use crate::messaging::dispatcher::JobDispatcher;
use crate::services::{mailer::Mailer, storage::S3Storage};

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub storage: Arc<S3Storage>,
    pub broker: Arc<RedisBroker>,
    pub mailer: Arc<Mailer>,
    pub dispatcher: Arc<JobDispatcher>,
    pub correlations: Arc<CorrelationStore>,
}

impl AppState {
    pub fn new(
        db: PgPool,
        storage: Arc<S3Storage>,
        broker: Arc<RedisBroker>,
        mailer: Mailer,
        dispatcher: JobDispatcher,
        correlations: Arc<CorrelationStore>,
    ) -> Self {
        Self {
            db,
            storage,
            broker,
            mailer: Arc::new(mailer),
            dispatcher: Arc::new(dispatcher),
            correlations,
        }
    }
}
