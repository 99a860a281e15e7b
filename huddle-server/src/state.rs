//! Shared application state
//!
//! One `AppState` per process, cloned into every handler. The event bus
//! and the run registry are the only pieces of shared mutable state;
//! both guard their interior behind a mutex.

use std::sync::Arc;

use huddle_common::config::{EngineConfig, ServerConfig};
use sqlx::SqlitePool;

use crate::engine::embedding::Embedder;
use crate::engine::runs::RunRegistry;
use crate::engine::summary::Summarizer;
use crate::sse::bus::EventBus;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Database pool
    pub db: SqlitePool,
    /// Fan-out bus for client event streams
    pub bus: Arc<EventBus>,
    /// Process-wide current-run pointer
    pub runs: Arc<RunRegistry>,
    /// Embedding provider (remote with deterministic local fallback)
    pub embedder: Arc<Embedder>,
    /// Summarization engine client
    pub summarizer: Arc<Summarizer>,
    /// Engine tuning knobs
    pub engine: EngineConfig,
}

impl AppState {
    pub fn new(db: SqlitePool, config: ServerConfig) -> Self {
        // One HTTP client shared by both remote-service paths
        let client = reqwest::Client::new();
        Self {
            db,
            bus: Arc::new(EventBus::new()),
            runs: Arc::new(RunRegistry::new()),
            embedder: Arc::new(Embedder::new(client.clone(), config.llm.clone())),
            summarizer: Arc::new(Summarizer::new(client, config.llm)),
            engine: config.engine,
        }
    }
}
