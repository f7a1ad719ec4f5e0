use std::time::Duration;

use anyhow::{Error, Result, anyhow};
use reqwest::Client;
use serde_json::json;
use tracing::{debug, warn};

/// Posts failed-event reports to a Slack incoming webhook.
pub struct SlackReporter {
    http_client: Client,
    post_url: String,
}

impl SlackReporter {
    pub fn new(post_url: &str) -> Result<Self, Error> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|_| anyhow!("Failed to create HTTP client"))?;

        Ok(Self {
            http_client,
            post_url: post_url.to_string(),
        })
    }

    pub async fn report_failure(&self, subject: &str, reason: &str) -> Result<(), Error> {
        let body = json!({
            "text": format!(":warning: feed-service failed to process {}: {}", subject, reason),
        });

        let response = self
            .http_client
            .post(&self.post_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| anyhow!("Slack post failed: {}", e))?;

        let status = response.status();
        if status.is_success() {
            debug!(subject, "Failure reported to Slack");
            Ok(())
        } else {
            warn!(subject, %status, "Slack webhook rejected failure report");
            Err(anyhow!("Slack webhook returned status {}", status))
        }
    }
}
