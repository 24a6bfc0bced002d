//! Graph runner client that hands resumed runs to an external runner over HTTP.

use std::time::Duration;

use flowrun_core::scheduler::{GraphRunner, ResumeRequest, SchedulingError};
use flowrun_types::config::{HttpConfig, RunnerConfig};
use reqwest::Client;
use serde_json::json;

/// POSTs `{ executionId, snapshot, credentials }` to the runner's resume URL.
///
/// Without a URL every resumption is refused, which still lets the process
/// cancel and inspect waiting runs.
pub struct WebhookRunner {
    client: Client,
    resume_url: Option<String>,
}

impl WebhookRunner {
    pub fn new(client: Client, resume_url: Option<String>) -> Self {
        Self { client, resume_url }
    }

    pub fn from_config(http: &HttpConfig, runner: &RunnerConfig) -> Result<Self, SchedulingError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(http.timeout_secs))
            .user_agent(&http.user_agent)
            .build()
            .map_err(|e| SchedulingError::Runner(e.to_string()))?;
        Ok(Self::new(client, runner.resume_url.clone()))
    }

    pub fn resume_url(&self) -> Option<&str> {
        self.resume_url.as_deref()
    }
}

impl GraphRunner for WebhookRunner {
    async fn resume(&self, request: ResumeRequest) -> Result<(), SchedulingError> {
        let Some(url) = &self.resume_url else {
            return Err(SchedulingError::Runner(
                "no runner.resume_url configured".to_string(),
            ));
        };

        let payload = json!({
            "executionId": request.execution_id,
            "snapshot": request.snapshot,
            "credentials": request.credentials,
        });
        let response = self
            .client
            .post(url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| SchedulingError::Runner(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SchedulingError::Runner(format!(
                "runner answered {}: {body}",
                status.as_u16()
            )));
        }

        tracing::info!(execution_id = %request.execution_id, "handed run to graph runner");
        Ok(())
    }
}
