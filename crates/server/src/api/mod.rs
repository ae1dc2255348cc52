pub mod chat;
pub mod health;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use tower_http::trace::TraceLayer;

use zeroveil_core::Policy;

use crate::pipeline::RequestPipeline;

/// Shared application state passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    /// The enforcement pipeline.
    pub pipeline: Arc<RequestPipeline>,
    /// The loaded policy, for read-only surfaces like `/health`.
    pub policy: Arc<Policy>,
}

/// Build the axum router with all routes and middleware.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/v1/chat/completions", post(chat::chat_completions))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
