use reqwest::Client;
use serde::Serialize;

/// Client for the transactional mail HTTP API used for results-ready
/// notifications. When no endpoint is configured (local development),
/// sends fail with `NotConfigured` instead of hanging on a bad URL.
pub struct Mailer {
    http: Client,
    endpoint: String,
    api_token: String,
    from: String,
}

#[derive(Serialize)]
struct OutboundMessage<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    text: &'a str,
}

impl Mailer {
    pub fn new(endpoint: &str, api_token: &str, from: &str) -> Self {
        Self {
            http: Client::new(),
            endpoint: endpoint.to_string(),
            api_token: api_token.to_string(),
            from: from.to_string(),
        }
    }

    pub fn is_configured(&self) -> bool {
        !self.endpoint.is_empty()
    }

    /// Send a plain-text email. Delivery is best-effort; callers decide
    /// whether a failure matters.
    pub async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), MailError> {
        if !self.is_configured() {
            return Err(MailError::NotConfigured);
        }

        let message = OutboundMessage {
            from: &self.from,
            to,
            subject,
            text: body,
        };

        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_token)
            .json(&message)
            .send()
            .await
            .map_err(MailError::Http)?;

        if !response.status().is_success() {
            return Err(MailError::Api(response.status().as_u16()));
        }

        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("Mail API request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Mail API rejected the message with status {0}")]
    Api(u16),

    #[error("No mail endpoint configured")]
    NotConfigured,
}
