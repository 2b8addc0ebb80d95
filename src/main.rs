use axum::{
    routing::{delete, get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::sync::Arc;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use pavescan::app_state::AppState;
use pavescan::config::AppConfig;
use pavescan::db;
use pavescan::messaging::{
    broker::RedisBroker, correlation::CorrelationStore, dispatcher::JobDispatcher,
    listener::ReplyListener,
};
use pavescan::routes;
use pavescan::services::{mailer::Mailer, storage::S3Storage};

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    // Load configuration from environment
    let config = AppConfig::from_env().expect("Failed to load configuration from environment");

    tracing::info!("Initializing pavescan server");

    // Initialize Prometheus metrics recorder
    let prometheus_handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus metrics recorder");
    let prometheus_handle = Arc::new(prometheus_handle);

    // Register application metrics
    metrics::describe_counter!(
        "jobs_dispatched_total",
        "Total analysis jobs published to the work channel"
    );
    metrics::describe_counter!(
        "job_replies_total",
        "Total worker replies consumed, labeled by outcome"
    );
    metrics::describe_counter!(
        "replies_dropped_total",
        "Total replies dropped as malformed or unresolvable"
    );
    metrics::describe_histogram!(
        "reply_handling_seconds",
        "Time to apply one worker reply to its job"
    );
    metrics::describe_gauge!(
        "work_queue_depth",
        "Current number of jobs waiting on the work channel"
    );

    // Initialize database connection pool
    tracing::info!("Connecting to PostgreSQL database");
    let db_pool = db::init_pool(&config.database_url)
        .await
        .expect("Failed to connect to database");

    // Run database migrations
    tracing::info!("Running database migrations");
    db::run_migrations(&db_pool)
        .await
        .expect("Failed to run database migrations");

    // Initialize S3 storage client
    tracing::info!("Initializing S3 storage client");
    let storage = Arc::new(
        S3Storage::new(
            &config.s3_region,
            &config.s3_endpoint,
            &config.s3_access_key,
            &config.s3_secret_key,
        )
        .expect("Failed to initialize S3 client"),
    );

    // Initialize the Redis broker for the work and reply channels
    tracing::info!("Connecting to Redis broker");
    let broker = Arc::new(
        RedisBroker::new(
            &config.redis_url,
            &config.work_queue_key,
            &config.reply_queue_key,
        )
        .expect("Failed to initialize Redis broker"),
    );

    // Correlation store shared by the dispatcher, the reply listeners,
    // and the diagnostics route
    let correlations = Arc::new(CorrelationStore::new());

    let dispatcher = JobDispatcher::new(
        broker.clone(),
        correlations.clone(),
        broker.reply_key(),
    );

    let mailer = Mailer::new(
        &config.mail_api_endpoint,
        &config.mail_api_token,
        &config.mail_from,
    );
    if !mailer.is_configured() {
        tracing::warn!("No mail endpoint configured; outbound email disabled");
    }

    // Spawn the standing reply consumers
    let reply_listener = Arc::new(ReplyListener::new(
        Arc::new(db_pool.clone()),
        storage.clone(),
        correlations.clone(),
    ));
    for consumer in 0..config.reply_consumer_count {
        let reply_listener = reply_listener.clone();
        let broker = broker.clone();
        tokio::spawn(async move {
            tracing::info!(consumer, "Starting reply consumer");
            reply_listener.run(broker).await;
        });
    }

    // Create shared application state
    let state = AppState::new(
        db_pool,
        storage,
        broker,
        mailer,
        dispatcher,
        correlations,
    );

    // Build API routes
    let app = Router::new()
        .route("/health", get(routes::health::health_check))
        .route(
            "/api/v1/requests",
            get(routes::requests::list_requests).post(routes::requests::create_request),
        )
        .route(
            "/api/v1/requests/{id}",
            get(routes::requests::get_request)
                .put(routes::requests::update_request)
                .delete(routes::requests::delete_request),
        )
        .route(
            "/api/v1/requests/count/total",
            get(routes::requests::count_total),
        )
        .route(
            "/api/v1/requests/count/pending",
            get(routes::requests::count_pending),
        )
        .route(
            "/api/v1/requests/count/completed",
            get(routes::requests::count_completed),
        )
        .route(
            "/api/v1/requests/{id}/submit-job",
            post(routes::requests::submit_job),
        )
        .route(
            "/api/v1/requests/{id}/jobs-results",
            get(routes::requests::jobs_results),
        )
        .route(
            "/api/v1/requests/{id}/finalized-job",
            post(routes::requests::finalized_job),
        )
        .route(
            "/api/v1/requests/{id}/job/{job_id}/finalize",
            post(routes::requests::finalize_job),
        )
        .route(
            "/api/v1/requests/{id}/job/{job_id}/reset-finalize",
            post(routes::requests::reset_finalize),
        )
        .route(
            "/api/v1/requests/{id}/job/{job_id}",
            delete(routes::requests::delete_job),
        )
        .route(
            "/api/v1/requests/{id}/job/{job_id}/result",
            get(routes::requests::job_result),
        )
        .route(
            "/api/v1/requests/{id}/job/{job_id}/geojson-result",
            get(routes::requests::job_geojson_result),
        )
        .route(
            "/api/v1/requests/{id}/job/{job_id}/sri-result",
            get(routes::requests::job_sri_result),
        )
        .route(
            "/api/v1/requests/{id}/send-email",
            post(routes::requests::send_email),
        )
        .route("/api/v1/storage/upload", post(routes::storage::upload_object))
        .route("/api/v1/storage/read", get(routes::storage::read_object))
        .route(
            "/api/v1/storage/delete",
            delete(routes::storage::delete_object),
        )
        .route(
            "/api/v1/diagnostics/replies/{correlation_id}",
            get(routes::diagnostics::last_reply),
        )
        .with_state(state)
        // Prometheus metrics endpoint (separate state)
        .route(
            "/metrics",
            get(routes::metrics::prometheus_metrics).with_state(prometheus_handle),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(RequestBodyLimitLayer::new(25 * 1024 * 1024)); // 25 MB limit

    tracing::info!("Starting pavescan on {}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .await
        .expect("Server error");
}
