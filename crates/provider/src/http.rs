use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use zeroveil_core::ChatRequest;

use crate::error::UpstreamError;
use crate::upstream::{UpstreamProvider, UpstreamResponse, outbound_body};

/// HTTP upstream speaking the OpenAI-compatible chat completions API.
#[derive(Debug)]
pub struct HttpUpstream {
    name: String,
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    timeout_seconds: u64,
}

impl HttpUpstream {
    /// Create a new HTTP upstream with a per-request timeout.
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout_seconds: u64,
    ) -> Result<Self, UpstreamError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .build()
            .map_err(|e| UpstreamError::Configuration(e.to_string()))?;

        Ok(Self {
            name: name.into(),
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
            timeout_seconds,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl UpstreamProvider for HttpUpstream {
    fn name(&self) -> &str {
        &self.name
    }

    async fn forward(&self, request: &ChatRequest) -> Result<UpstreamResponse, UpstreamError> {
        let url = self.endpoint();
        debug!(provider = %self.name, %url, "forwarding chat completion upstream");

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&outbound_body(request))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    UpstreamError::Timeout(self.timeout_seconds)
                } else {
                    UpstreamError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(UpstreamError::Status(status.as_u16()));
        }

        let body = response
            .json::<serde_json::Value>()
            .await
            .map_err(|e| UpstreamError::Decode(e.to_string()))?;

        Ok(UpstreamResponse::from_body(body))
    }
}
