use axum::Json;
use axum::extract::State;
use axum::response::IntoResponse;

use super::AppState;

/// `GET /health` -- liveness probe with the loaded policy version.
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "policy_version": state.policy.version,
    }))
}
