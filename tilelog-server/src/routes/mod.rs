//! HTTP route handlers and router configuration

mod add;
mod read;

use crate::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Build the application router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health))
        // Write API
        .route("/add", post(add::add))
        // Read API
        .route("/checkpoint", get(read::checkpoint))
        .route("/tile/*path", get(read::tile))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Liveness probe.
async fn health() -> &'static str {
    "ok"
}
