use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    /// Server bind address (e.g., "0.0.0.0:8080"). Optional for worker processes.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// PostgreSQL connection string
    pub database_url: String,

    /// Redis connection string for the work/reply channels
    pub redis_url: String,

    /// S3 region name
    #[serde(default = "default_s3_region")]
    pub s3_region: String,

    /// S3 endpoint URL (point at MinIO or similar for local development)
    #[serde(default = "default_s3_endpoint")]
    pub s3_endpoint: String,

    /// S3 access key ID
    pub s3_access_key: String,

    /// S3 secret access key
    pub s3_secret_key: String,

    /// Redis list the dispatcher publishes work to
    #[serde(default = "default_work_queue_key")]
    pub work_queue_key: String,

    /// Redis list workers publish replies to
    #[serde(default = "default_reply_queue_key")]
    pub reply_queue_key: String,

    /// Number of standing reply-consumer tasks
    #[serde(default = "default_reply_consumer_count")]
    pub reply_consumer_count: usize,

    /// HTTP mail API endpoint; empty disables outbound email
    #[serde(default)]
    pub mail_api_endpoint: String,

    /// Bearer token for the mail API
    #[serde(default)]
    pub mail_api_token: String,

    /// From address for notifications
    #[serde(default = "default_mail_from")]
    pub mail_from: String,
}

fn default_bind_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_s3_region() -> String {
    "us-east-1".to_string()
}

fn default_s3_endpoint() -> String {
    "https://s3.amazonaws.com".to_string()
}

fn default_work_queue_key() -> String {
    "pavescan:analysis-jobs".to_string()
}

fn default_reply_queue_key() -> String {
    "pavescan:job-replies".to_string()
}

fn default_reply_consumer_count() -> usize {
    2
}

fn default_mail_from() -> String {
    "noreply@pavescan.local".to_string()
}

impl AppConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }
}
