use pavescan::messaging::broker::{RedisBroker, WorkEnvelope};
use pavescan::messaging::reply::{JobReplyMessage, ReplyStatus};
use serde::Deserialize;
use std::time::Duration;
use tokio::time::sleep;
use tracing_subscriber::EnvFilter;

const POP_TIMEOUT_SECS: u64 = 5;
const ERROR_BACKOFF_MS: u64 = 1000; // 1 second

/// Local stand-in for the external ML worker pool: answers every job
/// with a canned reply so the full dispatch/reply loop can be exercised
/// without the analysis stack.
#[derive(Debug, Deserialize)]
struct WorkerConfig {
    redis_url: String,

    #[serde(default = "default_work_queue_key")]
    work_queue_key: String,

    #[serde(default = "default_reply_queue_key")]
    reply_queue_key: String,

    /// Reply ERROR instead of SUCCESS.
    #[serde(default)]
    sim_reply_error: bool,

    /// Simulated processing time per job.
    #[serde(default)]
    sim_delay_ms: u64,
}

fn default_work_queue_key() -> String {
    "pavescan:analysis-jobs".to_string()
}

fn default_reply_queue_key() -> String {
    "pavescan:job-replies".to_string()
}

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    tracing::info!("Starting analysis worker simulator");

    dotenvy::dotenv().ok();
    let config: WorkerConfig = envy::from_env().expect("Failed to load configuration");

    let broker = RedisBroker::new(
        &config.redis_url,
        &config.work_queue_key,
        &config.reply_queue_key,
    )
    .expect("Failed to initialize Redis broker");

    tracing::info!(
        reply_error = config.sim_reply_error,
        delay_ms = config.sim_delay_ms,
        "Worker simulator ready, consuming work channel"
    );

    loop {
        match broker.pop_work(POP_TIMEOUT_SECS).await {
            Ok(Some(envelope)) => {
                if let Err(e) = answer(&broker, &envelope, &config).await {
                    tracing::error!(error = %e, "Failed to answer job");
                }
            }
            Ok(None) => {
                // Nothing queued within the timeout; poll again.
            }
            Err(e) => {
                tracing::error!(error = %e, "Work channel error");
                sleep(Duration::from_millis(ERROR_BACKOFF_MS)).await;
            }
        }
    }
}

/// Publish the canned reply for one envelope to its reply channel.
async fn answer(
    broker: &RedisBroker,
    envelope: &WorkEnvelope,
    config: &WorkerConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    tracing::info!(
        job_id = envelope.payload.id,
        correlation_id = %envelope.correlation_id,
        "Simulating analysis job"
    );

    if config.sim_delay_ms > 0 {
        sleep(Duration::from_millis(config.sim_delay_ms)).await;
    }

    let reply = build_reply(envelope, config.sim_reply_error);
    let body = serde_json::to_string(&reply)?;
    broker.push_reply(&envelope.reply_to, &body).await?;

    tracing::info!(
        job_id = envelope.payload.id,
        correlation_id = %envelope.correlation_id,
        status = ?reply.job_status,
        "Published simulated reply"
    );
    Ok(())
}

fn build_reply(envelope: &WorkEnvelope, error_mode: bool) -> JobReplyMessage {
    let job_id = envelope.payload.id;

    if error_mode {
        return JobReplyMessage {
            correlation_id: envelope.correlation_id.clone(),
            job_id,
            job_status: ReplyStatus::Error,
            error: Some("simulated analysis failure".to_string()),
            result_geojson_url: None,
            result_archive_url: None,
            super_resolution_image_url: None,
            super_resolution_tif_url: None,
            bounds: None,
        };
    }

    let base = format!("https://pavescan-results.s3.amazonaws.com/{job_id}");
    JobReplyMessage {
        correlation_id: envelope.correlation_id.clone(),
        job_id,
        job_status: ReplyStatus::Success,
        error: None,
        result_geojson_url: Some(format!("{base}/analysis.geojson")),
        result_archive_url: Some(format!("{base}/shapefile.zip")),
        super_resolution_image_url: Some(format!("{base}/super-resolution.png")),
        super_resolution_tif_url: Some(format!("{base}/super-resolution.tif")),
        bounds: Some("30.6049,-96.3698,30.6419,-96.3269".to_string()),
    }
}
