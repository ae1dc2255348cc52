use serde_json::json;

use crate::error::GatewayError;
use crate::request::ChatRequest;

/// Roles a chat message may carry.
pub const ALLOWED_ROLES: [&str; 5] = ["system", "user", "assistant", "tool", "function"];

/// Shape checks over the parsed request body.
///
/// The check order is a stable public contract: the first failure wins and
/// is reported alone, so clients always see the earliest actionable error.
/// Every error here maps to HTTP 400.
pub fn validate_shape(request: &ChatRequest) -> Result<(), GatewayError> {
    if request.messages.is_empty() {
        return Err(GatewayError::invalid_request(
            "messages must be non-empty",
            json!({"field": "messages"}),
        ));
    }

    for (i, message) in request.messages.iter().enumerate() {
        let role_ok = message
            .role
            .as_deref()
            .is_some_and(|role| ALLOWED_ROLES.contains(&role));
        if !role_ok {
            return Err(GatewayError::invalid_request(
                format!("message role is not allowed at index {i}"),
                json!({
                    "field": format!("messages[{i}].role"),
                    "value": message.role,
                    "allowed": ALLOWED_ROLES,
                }),
            ));
        }

        match message.content.as_deref() {
            None => {
                return Err(GatewayError::invalid_request(
                    format!("message content must be a string at index {i}"),
                    json!({"field": format!("messages[{i}].content")}),
                ));
            }
            Some(content) if content.contains('\0') => {
                return Err(GatewayError::invalid_request(
                    format!("message content must not contain NUL bytes at index {i}"),
                    json!({"field": format!("messages[{i}].content")}),
                ));
            }
            Some(_) => {}
        }
    }

    Ok(())
}
