//! Configuration loading
//!
//! Settings resolve in priority order: environment variable first, then
//! the optional TOML config file, then the compiled default. Bind port
//! and database path are handled by clap on the binary side; this module
//! covers the remote-service and engine tuning knobs.

use crate::{Error, Result};
use serde::Deserialize;
use std::path::Path;

/// Remote embedding/summarization service settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// API key; when absent, every remote path degrades to the local
    /// deterministic fallback
    pub api_key: Option<String>,
    /// Base URL of the OpenAI-compatible API
    pub base_url: String,
    /// Embedding model identifier
    pub embed_model: String,
    /// Summarization (chat) model identifier
    pub summary_model: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://api.openai.com/v1".to_string(),
            embed_model: "text-embedding-3-small".to_string(),
            summary_model: "gpt-4o-mini".to_string(),
        }
    }
}

/// Engine tuning knobs
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Similarity cutoff for graph edges
    pub graph_threshold: f64,
    /// Max neighbors considered per node
    pub graph_top_k: usize,
    /// Number of recent statements replayed to a newly joined client
    pub recent_lines: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            graph_threshold: 0.65,
            graph_top_k: 3,
            recent_lines: 10,
        }
    }
}

/// Top-level server configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub llm: LlmConfig,
    pub engine: EngineConfig,
}

impl ServerConfig {
    /// Load configuration from an optional TOML file, then apply
    /// environment overrides.
    pub fn load(config_file: Option<&Path>) -> Result<Self> {
        let mut config = match config_file {
            Some(path) => {
                let content = std::fs::read_to_string(path)?;
                toml::from_str(&content)
                    .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?
            }
            None => Self::default(),
        };
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    fn apply_env(&mut self) {
        if let Ok(key) = std::env::var("HUDDLE_LLM_API_KEY") {
            if !key.is_empty() {
                self.llm.api_key = Some(key);
            }
        }
        if let Ok(url) = std::env::var("HUDDLE_LLM_BASE_URL") {
            self.llm.base_url = url;
        }
        if let Ok(model) = std::env::var("HUDDLE_EMBED_MODEL") {
            self.llm.embed_model = model;
        }
        if let Ok(model) = std::env::var("HUDDLE_SUMMARY_MODEL") {
            self.llm.summary_model = model;
        }
        if let Ok(v) = std::env::var("HUDDLE_GRAPH_THRESHOLD") {
            if let Ok(t) = v.parse() {
                self.engine.graph_threshold = t;
            }
        }
        if let Ok(v) = std::env::var("HUDDLE_GRAPH_TOP_K") {
            if let Ok(k) = v.parse() {
                self.engine.graph_top_k = k;
            }
        }
    }

    fn validate(&self) -> Result<()> {
        if !(-1.0..=1.0).contains(&self.engine.graph_threshold) {
            return Err(Error::Config(format!(
                "graph_threshold must be within [-1, 1], got {}",
                self.engine.graph_threshold
            )));
        }
        if self.engine.graph_top_k == 0 {
            return Err(Error::Config("graph_top_k must be at least 1".to_string()));
        }
        Ok(())
    }
}
