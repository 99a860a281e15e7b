//! HTTP/SSE surface for the huddle engine

pub mod handlers;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::sse::stream;
use crate::state::AppState;

/// Create the API router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .nest(
            "/api",
            Router::new()
                .route("/join", post(handlers::join))
                .route("/submit", post(handlers::submit))
                .route("/summary", post(handlers::summary))
                .route("/match", post(handlers::compute_matches))
                .route("/run/current", get(handlers::current_run))
                .route("/run/reset", post(handlers::reset_run))
                .route("/stream", get(stream::event_stream)),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
