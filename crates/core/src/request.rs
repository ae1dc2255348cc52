use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single chat message.
///
/// `role` and `content` stay optional at the parse layer so that shape
/// violations are reported by the validator with a `messages[i]` field path
/// instead of a generic deserialization failure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Speaker role; validated against [`crate::ALLOWED_ROLES`].
    #[serde(default)]
    pub role: Option<String>,
    /// Message text. Must be a string without NUL bytes.
    #[serde(default)]
    pub content: Option<String>,
}

/// Client-supplied request metadata.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestMetadata {
    /// Attestation that PII was scrubbed before the request reached the
    /// gateway.
    #[serde(default)]
    pub scrubbed: Option<bool>,
    /// Additional metadata keys are tolerated and ignored.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// A chat-completion request body.
///
/// Unknown top-level keys (`temperature`, `max_tokens`, ...) are collected
/// into `extra` and passed through to the upstream provider untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatRequest {
    /// Requested model; checked against the policy allowlist when present.
    #[serde(default)]
    pub model: Option<String>,
    /// Conversation messages.
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
    /// Zero-Data-Retention attestation. Absent counts as attested.
    #[serde(default)]
    pub zdr_only: Option<bool>,
    /// Request metadata envelope.
    #[serde(default)]
    pub metadata: Option<RequestMetadata>,
    /// Passthrough fields forwarded to the upstream provider.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl ChatRequest {
    /// Number of messages in the request.
    pub fn message_count(&self) -> usize {
        self.messages.len()
    }

    /// Total characters across all message contents.
    pub fn total_chars(&self) -> usize {
        self.messages
            .iter()
            .filter_map(|m| m.content.as_deref())
            .map(|c| c.chars().count())
            .sum()
    }

    /// The `metadata.scrubbed` attestation, absent counting as unattested.
    pub fn scrubbed_attested(&self) -> bool {
        self.metadata
            .as_ref()
            .and_then(|m| m.scrubbed)
            .unwrap_or(false)
    }

    /// The ZDR attestation, absent counting as attested.
    pub fn zdr_attested(&self) -> bool {
        self.zdr_only.unwrap_or(true)
    }
}
