use async_trait::async_trait;
use serde_json::json;

use zeroveil_core::ChatRequest;

use crate::error::UpstreamError;
use crate::upstream::{UpstreamProvider, UpstreamResponse};

/// A mock upstream that returns a canned completion. Used in tests and for
/// local runs without an outbound credential.
#[derive(Debug, Clone)]
pub struct MockUpstream {
    name: String,
    body: serde_json::Value,
}

impl MockUpstream {
    /// A mock that completes every request with a fixed body and a
    /// `{9, 12}` usage block.
    pub fn completing() -> Self {
        Self::with_body(json!({
            "id": "cmpl-mock",
            "object": "chat.completion",
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": "ok"},
                "finish_reason": "stop",
            }],
            "usage": {"prompt_tokens": 9, "completion_tokens": 12, "total_tokens": 21},
        }))
    }

    /// A mock returning the given body verbatim.
    pub fn with_body(body: serde_json::Value) -> Self {
        Self {
            name: "mock".to_owned(),
            body,
        }
    }

    /// A mock whose usage block reports the given token counts.
    pub fn with_usage(prompt_tokens: u64, completion_tokens: u64) -> Self {
        Self::with_body(json!({
            "id": "cmpl-mock",
            "choices": [],
            "usage": {
                "prompt_tokens": prompt_tokens,
                "completion_tokens": completion_tokens,
                "total_tokens": prompt_tokens + completion_tokens,
            },
        }))
    }
}

#[async_trait]
impl UpstreamProvider for MockUpstream {
    fn name(&self) -> &str {
        &self.name
    }

    async fn forward(&self, _request: &ChatRequest) -> Result<UpstreamResponse, UpstreamError> {
        Ok(UpstreamResponse::from_body(self.body.clone()))
    }
}

/// A mock upstream that always fails, either with a timeout or a status
/// error, for exercising the 502 path.
#[derive(Debug, Clone)]
pub struct FailingUpstream {
    name: String,
    timeout: bool,
}

impl FailingUpstream {
    /// Fail every request with a timeout.
    pub fn timing_out() -> Self {
        Self {
            name: "mock".to_owned(),
            timeout: true,
        }
    }

    /// Fail every request with an upstream 500.
    pub fn erroring() -> Self {
        Self {
            name: "mock".to_owned(),
            timeout: false,
        }
    }
}

#[async_trait]
impl UpstreamProvider for FailingUpstream {
    fn name(&self) -> &str {
        &self.name
    }

    async fn forward(&self, _request: &ChatRequest) -> Result<UpstreamResponse, UpstreamError> {
        if self.timeout {
            Err(UpstreamError::Timeout(30))
        } else {
            Err(UpstreamError::Status(500))
        }
    }
}
