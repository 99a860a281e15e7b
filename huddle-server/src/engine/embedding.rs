//! Embedding provider
//!
//! `embed` never fails: the remote embedding service is used when an
//! API key is configured, and any failure (missing key, transport
//! error, non-success status, malformed response) degrades to a
//! deterministic local hash embedding. The fallback is pure, so tests
//! run without network access and produce exact vectors.

use anyhow::anyhow;
use huddle_common::config::LlmConfig;
use serde_json::{json, Value};
use tracing::warn;

/// Dimension of the local fallback embedding
pub const FALLBACK_DIM: usize = 64;

/// Embedding provider with deterministic local fallback
pub struct Embedder {
    client: reqwest::Client,
    config: LlmConfig,
}

impl Embedder {
    pub fn new(client: reqwest::Client, config: LlmConfig) -> Self {
        Self { client, config }
    }

    /// Produce an embedding vector for `text`. Always returns a usable
    /// vector.
    pub async fn embed(&self, text: &str) -> Vec<f64> {
        let Some(api_key) = self.config.api_key.as_deref() else {
            return hash_embed(text, FALLBACK_DIM);
        };
        match self.remote_embed(api_key, text).await {
            Ok(vector) => vector,
            Err(e) => {
                warn!("Remote embedding failed, using local fallback: {}", e);
                hash_embed(text, FALLBACK_DIM)
            }
        }
    }

    async fn remote_embed(&self, api_key: &str, text: &str) -> anyhow::Result<Vec<f64>> {
        let url = format!("{}/embeddings", self.config.base_url.trim_end_matches('/'));
        let response = self
            .client
            .post(&url)
            .bearer_auth(api_key)
            .json(&json!({
                "model": self.config.embed_model,
                "input": text,
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(anyhow!("embedding service returned {}", status));
        }

        let body: Value = response.json().await?;
        let vector = body
            .get("data")
            .and_then(|d| d.get(0))
            .and_then(|entry| entry.get("embedding"))
            .and_then(Value::as_array)
            .ok_or_else(|| anyhow!("embedding missing from response"))?;

        Ok(vector.iter().filter_map(Value::as_f64).collect())
    }
}

/// Deterministic local embedding: hash each character's code point into
/// a bucket `code % dim` with a signed contribution `(code % 13) - 6`,
/// then L2-normalize (norm of zero is treated as 1).
pub fn hash_embed(text: &str, dim: usize) -> Vec<f64> {
    let mut vector = vec![0.0f64; dim];
    for c in text.chars() {
        let code = c as u32;
        vector[code as usize % dim] += (code % 13) as f64 - 6.0;
    }
    let norm = vector.iter().map(|x| x * x).sum::<f64>().sqrt();
    let norm = if norm == 0.0 { 1.0 } else { norm };
    vector.into_iter().map(|x| x / norm).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use huddle_common::vecmath::cosine;

    #[test]
    fn hash_embed_is_deterministic() {
        let a = hash_embed("we need more trucks", FALLBACK_DIM);
        let b = hash_embed("we need more trucks", FALLBACK_DIM);
        assert_eq!(a, b);
    }

    #[test]
    fn hash_embed_has_unit_norm_for_nonempty_input() {
        let v = hash_embed("ethics of automation", FALLBACK_DIM);
        let norm = v.iter().map(|x| x * x).sum::<f64>().sqrt();
        assert!((norm - 1.0).abs() < 1e-9);
    }

    #[test]
    fn hash_embed_of_empty_text_is_zero_vector() {
        let v = hash_embed("", FALLBACK_DIM);
        assert_eq!(v.len(), FALLBACK_DIM);
        assert!(v.iter().all(|&x| x == 0.0));
    }

    #[test]
    fn hash_embed_distinguishes_unrelated_texts() {
        let a = hash_embed("trucks are the bottleneck", FALLBACK_DIM);
        let b = hash_embed("ethics of automation", FALLBACK_DIM);
        assert!(cosine(&a, &b) < 1.0 - 1e-6);
    }

    #[tokio::test]
    async fn embed_without_api_key_uses_fallback() {
        let embedder = Embedder::new(reqwest::Client::new(), LlmConfig::default());
        let v = embedder.embed("hello").await;
        assert_eq!(v, hash_embed("hello", FALLBACK_DIM));
    }

    #[tokio::test]
    async fn embed_with_unreachable_service_falls_back() {
        let config = LlmConfig {
            api_key: Some("test-key".to_string()),
            base_url: "http://127.0.0.1:1".to_string(),
            ..LlmConfig::default()
        };
        let embedder = Embedder::new(reqwest::Client::new(), config);
        let v = embedder.embed("hello").await;
        assert_eq!(v, hash_embed("hello", FALLBACK_DIM));
    }
}
