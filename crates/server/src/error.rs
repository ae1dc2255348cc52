use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use zeroveil_core::{GatewayError, PolicyError};

use crate::tenants::TenantError;

/// Errors that can occur while configuring or running the gateway server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// A configuration error (bad environment, provider not allowed).
    #[error("configuration error: {0}")]
    Config(String),

    /// An I/O error (e.g. binding the listener).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The policy file failed to load. Fatal at startup.
    #[error(transparent)]
    Policy(#[from] PolicyError),

    /// The tenants file failed to load. Fatal at startup.
    #[error(transparent)]
    Tenants(#[from] TenantError),

    /// A pipeline error surfaced through the API.
    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let err = match self {
            Self::Gateway(err) => err,
            // Anything else reaching the HTTP boundary is an internal
            // failure; the diagnostic goes to the log, never the client.
            other => {
                tracing::error!(error = %other, "internal server error");
                GatewayError::internal("internal error")
            }
        };

        let status = StatusCode::from_u16(err.http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = serde_json::json!({
            "error": {
                "code": err.code.as_str(),
                "message": err.message,
                "details": err.details,
            }
        });
        (status, Json(body)).into_response()
    }
}
