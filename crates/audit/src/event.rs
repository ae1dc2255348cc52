use chrono::{DateTime, SecondsFormat};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Version tag written as the first key of every audit line.
pub const SCHEMA_VERSION: &str = "1";

/// Terminal audit outcome. Every request produces exactly one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Allow,
    Deny,
}

/// A single metadata-only audit record.
///
/// Serialized field order is part of the wire contract: `schema_version` is
/// always the first key, and unset fields are materialized as JSON null
/// rather than omitted, so every line has the same shape.
///
/// No field ever contains message content or any substring derived from it;
/// only counts and attested flags are recorded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Audit schema version, always `"1"`.
    pub schema_version: String,
    /// Event time, unix seconds.
    pub ts: i64,
    /// ISO-8601 rendering of `ts`.
    pub ts_iso: String,
    /// Gateway-assigned request id (`zv_` prefix).
    pub request_id: String,
    /// Authenticated tenant, or null when authentication never succeeded.
    pub tenant_id: Option<String>,
    /// Terminal outcome.
    pub action: AuditAction,
    /// Stable reason string (`"ok"`, `"policy_denied"`, `"upstream_timeout"`, ...).
    pub reason: String,
    /// Connecting client address, when known.
    pub client_ip: Option<String>,
    /// Client `User-Agent` header, when present.
    pub user_agent: Option<String>,
    /// Upstream provider the request was (or would have been) routed to.
    pub provider: Option<String>,
    /// Requested model, when present in the body.
    pub model: Option<String>,
    /// Prompt tokens reported by the upstream.
    pub tokens_prompt: Option<u64>,
    /// Completion tokens reported by the upstream.
    pub tokens_completion: Option<u64>,
    /// Number of messages in the request.
    pub message_count: Option<usize>,
    /// Total characters across message contents. A count, not content.
    pub total_chars: Option<usize>,
    /// The client's ZDR attestation.
    pub zdr_only: Option<bool>,
    /// The client's `metadata.scrubbed` attestation.
    pub scrubbed_attested: Option<bool>,
    /// Wall-clock latency of the request in milliseconds.
    pub latency_ms: Option<u64>,
    /// Free-form extra metadata.
    pub extra: Option<serde_json::Map<String, Value>>,
}

impl AuditEvent {
    /// Create an event at the given unix timestamp. All optional fields
    /// start unset; callers fill in what they know.
    pub fn at(
        ts: i64,
        request_id: impl Into<String>,
        tenant_id: Option<String>,
        action: AuditAction,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            schema_version: SCHEMA_VERSION.to_owned(),
            ts,
            ts_iso: iso_from_ts(ts),
            request_id: request_id.into(),
            tenant_id,
            action,
            reason: reason.into(),
            client_ip: None,
            user_agent: None,
            provider: None,
            model: None,
            tokens_prompt: None,
            tokens_completion: None,
            message_count: None,
            total_chars: None,
            zdr_only: None,
            scrubbed_attested: None,
            latency_ms: None,
            extra: None,
        }
    }

    /// Create an event stamped with the current wall-clock time.
    pub fn now(
        request_id: impl Into<String>,
        tenant_id: Option<String>,
        action: AuditAction,
        reason: impl Into<String>,
    ) -> Self {
        let ts = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs()
            .cast_signed();
        Self::at(ts, request_id, tenant_id, action, reason)
    }
}

fn iso_from_ts(ts: i64) -> String {
    DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Secs, true))
        .unwrap_or_default()
}
