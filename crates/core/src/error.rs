use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Stable machine-readable error codes surfaced in the error envelope.
///
/// These strings are a public contract; clients branch on them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Malformed body, disallowed role, NUL byte in content.
    InvalidRequest,
    /// Missing or invalid bearer credential when authentication is required.
    Unauthorized,
    /// Allowlist, size limit, or attestation failure.
    PolicyDenied,
    /// RPM or TPD budget exhausted.
    RateLimited,
    /// Network error, timeout, or non-2xx from the upstream provider.
    UpstreamError,
    /// Unexpected failure; never carries internal detail.
    InternalError,
}

impl ErrorCode {
    /// The stable wire string for this code.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InvalidRequest => "invalid_request",
            Self::Unauthorized => "unauthorized",
            Self::PolicyDenied => "policy_denied",
            Self::RateLimited => "rate_limited",
            Self::UpstreamError => "upstream_error",
            Self::InternalError => "internal_error",
        }
    }

    /// The HTTP status this code maps to.
    pub fn http_status(self) -> u16 {
        match self {
            Self::InvalidRequest => 400,
            Self::Unauthorized => 401,
            Self::PolicyDenied => 403,
            Self::RateLimited => 429,
            Self::UpstreamError => 502,
            Self::InternalError => 500,
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed error raised inside the enforcement pipeline and rendered at the
/// HTTP boundary as `{"error": {"code", "message", "details"}}`.
///
/// `details` carries only field paths, indices, and policy limits, never
/// request content.
#[derive(Debug, Clone, Error)]
#[error("{code}: {message}")]
pub struct GatewayError {
    /// Stable machine-readable code.
    pub code: ErrorCode,
    /// Human-readable summary. Never includes message content.
    pub message: String,
    /// Field localization and policy limits for the failing check.
    pub details: serde_json::Value,
}

impl GatewayError {
    /// Create an error with empty details.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: serde_json::json!({}),
        }
    }

    /// Create an error carrying a details object.
    pub fn with_details(
        code: ErrorCode,
        message: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            code,
            message: message.into(),
            details,
        }
    }

    pub fn invalid_request(message: impl Into<String>, details: serde_json::Value) -> Self {
        Self::with_details(ErrorCode::InvalidRequest, message, details)
    }

    pub fn policy_denied(message: impl Into<String>, details: serde_json::Value) -> Self {
        Self::with_details(ErrorCode::PolicyDenied, message, details)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unauthorized, message)
    }

    pub fn rate_limited(message: impl Into<String>, details: serde_json::Value) -> Self {
        Self::with_details(ErrorCode::RateLimited, message, details)
    }

    pub fn upstream(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::UpstreamError, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }

    /// The HTTP status this error maps to.
    pub fn http_status(&self) -> u16 {
        self.code.http_status()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes_are_stable_strings() {
        assert_eq!(ErrorCode::InvalidRequest.as_str(), "invalid_request");
        assert_eq!(ErrorCode::Unauthorized.as_str(), "unauthorized");
        assert_eq!(ErrorCode::PolicyDenied.as_str(), "policy_denied");
        assert_eq!(ErrorCode::RateLimited.as_str(), "rate_limited");
        assert_eq!(ErrorCode::UpstreamError.as_str(), "upstream_error");
        assert_eq!(ErrorCode::InternalError.as_str(), "internal_error");
    }

    #[test]
    fn error_codes_map_to_http_statuses() {
        assert_eq!(ErrorCode::InvalidRequest.http_status(), 400);
        assert_eq!(ErrorCode::Unauthorized.http_status(), 401);
        assert_eq!(ErrorCode::PolicyDenied.http_status(), 403);
        assert_eq!(ErrorCode::RateLimited.http_status(), 429);
        assert_eq!(ErrorCode::UpstreamError.http_status(), 502);
        assert_eq!(ErrorCode::InternalError.http_status(), 500);
    }

    #[test]
    fn error_code_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorCode::PolicyDenied).unwrap();
        assert_eq!(json, "\"policy_denied\"");
    }

    #[test]
    fn new_error_has_empty_details_object() {
        let err = GatewayError::unauthorized("Invalid API key");
        assert_eq!(err.details, serde_json::json!({}));
        assert_eq!(err.http_status(), 401);
    }
}
