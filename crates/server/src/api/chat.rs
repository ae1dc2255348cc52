use axum::Json;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::IntoResponse;

use zeroveil_core::GatewayError;

use crate::error::ServerError;
use crate::pipeline::RequestContext;

use super::AppState;

/// `POST /v1/chat/completions` -- run a chat-completion request through the
/// enforcement pipeline and pass the upstream body through on success.
///
/// The body is taken as raw bytes so that a malformed-JSON failure produces
/// the gateway's own error envelope instead of the framework default.
pub async fn chat_completions(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> Result<impl IntoResponse, ServerError> {
    let ctx = request_context(&headers);

    let body: serde_json::Value = serde_json::from_slice(&body).map_err(|_| {
        GatewayError::invalid_request("request body is not valid JSON", serde_json::json!({}))
    })?;

    let response = state.pipeline.handle(body, &ctx).await?;
    Ok((StatusCode::OK, Json(response)))
}

/// Pull the bearer token and client metadata out of the request headers.
fn request_context(headers: &HeaderMap) -> RequestContext {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::to_owned);

    let client_ip = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(|value| value.trim().to_owned());

    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned);

    RequestContext {
        bearer,
        client_ip,
        user_agent,
    }
}
