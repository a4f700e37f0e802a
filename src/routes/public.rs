use crate::AppState;
use axum::{Router, routing::get};

/// Public Router Module
///
/// Routes that need no identity at all.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // GET /health
        // Liveness probe.
        .route("/health", get(|| async { "ok" }))
}
