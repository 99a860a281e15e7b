//! # Huddle Server (huddle-server)
//!
//! Run-scoped real-time engine for a live group exercise: participants
//! submit short statements, the server incrementally builds an
//! embedding-based similarity graph, computes thematic summaries and
//! greedy pairings, and pushes everything to connected clients over SSE.
//!
//! **Architecture:** axum HTTP/SSE surface over a SQLite store, with a
//! fan-out event bus and deterministic local fallbacks for every remote
//! intelligence call.

pub mod api;
pub mod engine;
pub mod error;
pub mod sse;
pub mod state;

pub use api::build_router;
pub use error::{ApiError, ApiResult};
pub use state::AppState;
