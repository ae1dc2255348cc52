use serde_json::json;

use crate::error::GatewayError;
use crate::policy::Policy;
use crate::request::ChatRequest;

/// Policy checks over a shape-valid request.
///
/// Runs after [`crate::validate_shape`]; together they form the fixed
/// validation order of the gateway (limits, then attestations, then the
/// model allowlist). Every error here maps to HTTP 403.
pub fn enforce(policy: &Policy, request: &ChatRequest) -> Result<(), GatewayError> {
    if request.messages.len() > policy.max_messages {
        return Err(GatewayError::policy_denied(
            format!("too many messages (limit {})", policy.max_messages),
            json!({"field": "messages", "limit": policy.max_messages}),
        ));
    }

    for (i, message) in request.messages.iter().enumerate() {
        let chars = message
            .content
            .as_deref()
            .map_or(0, |c| c.chars().count());
        if chars > policy.max_chars_per_message {
            return Err(GatewayError::policy_denied(
                format!(
                    "message exceeds {} characters",
                    policy.max_chars_per_message
                ),
                json!({
                    "field": format!("messages[{i}].content"),
                    "index": i,
                    "limit": policy.max_chars_per_message,
                }),
            ));
        }
    }

    if policy.enforce_zdr_only && !request.zdr_attested() {
        return Err(GatewayError::policy_denied(
            "zdr_only must be true",
            json!({"field": "zdr_only"}),
        ));
    }

    if policy.require_scrubbed_attestation && !request.scrubbed_attested() {
        return Err(GatewayError::policy_denied(
            "metadata.scrubbed attestation required",
            json!({"field": "metadata.scrubbed"}),
        ));
    }

    if let Some(model) = request.model.as_deref()
        && !policy.allows_model(model)
    {
        return Err(GatewayError::policy_denied(
            "model is not allowed by policy",
            json!({
                "field": "model",
                "value": model,
                "allowed": policy.allowed_models,
            }),
        ));
    }

    Ok(())
}
