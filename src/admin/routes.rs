//! Admin Routes
//!
//! Read-only router for the admin surface.

use axum::{http::Method, routing::get, Router};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers::{health_handler, stats_handler, AdminState};

/// Builds the admin router: `/stats` and `/health`, GET only.
///
/// Browsers from any origin may read both endpoints; CORS preflights only
/// advertise GET. Requests are traced through `tower_http`.
pub fn create_router(state: AdminState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET])
        .allow_headers(Any);

    Router::new()
        .route("/stats", get(stats_handler))
        .route("/health", get(health_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
