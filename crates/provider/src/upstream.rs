use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use zeroveil_core::ChatRequest;

use crate::error::UpstreamError;

/// Token usage reported by an OpenAI-compatible upstream.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
}

impl TokenUsage {
    /// Prompt plus completion tokens, charged against the tenant's TPD budget.
    pub fn total(&self) -> u64 {
        self.prompt_tokens + self.completion_tokens
    }
}

/// A successful upstream reply: the raw body passed through to the client,
/// plus the usage block when the provider reported one.
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub body: Value,
    pub usage: Option<TokenUsage>,
}

impl UpstreamResponse {
    /// Wrap an upstream body, extracting its `usage` block when present.
    pub fn from_body(body: Value) -> Self {
        let usage = body
            .get("usage")
            .and_then(|u| serde_json::from_value(u.clone()).ok());
        Self { body, usage }
    }
}

/// An upstream chat-completion provider the gateway forwards admitted
/// requests to.
///
/// Implementations must be `Send + Sync` so a single instance can be shared
/// across concurrent requests.
#[async_trait]
pub trait UpstreamProvider: Send + Sync {
    /// Provider name recorded in audit events.
    fn name(&self) -> &str;

    /// Forward a chat-completion request and return the upstream body.
    async fn forward(&self, request: &ChatRequest) -> Result<UpstreamResponse, UpstreamError>;
}

/// Build the outbound request body from an admitted gateway request.
///
/// Gateway envelope fields (`zdr_only`, `metadata`) stay behind; the model,
/// messages, and any passthrough fields go upstream.
pub fn outbound_body(request: &ChatRequest) -> Value {
    let mut body = serde_json::Map::new();
    if let Some(model) = &request.model {
        body.insert("model".to_owned(), Value::String(model.clone()));
    }
    body.insert(
        "messages".to_owned(),
        serde_json::to_value(&request.messages).unwrap_or(Value::Array(Vec::new())),
    );
    for (key, value) in &request.extra {
        body.insert(key.clone(), value.clone());
    }
    Value::Object(body)
}
