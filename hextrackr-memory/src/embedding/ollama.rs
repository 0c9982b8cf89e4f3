//! Ollama-compatible HTTP embedder
//!
//! Calls `POST {endpoint}/api/embeddings` with `{model, prompt}` and reads
//! `{embedding: [...]}` back. Every request carries an explicit timeout.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use super::EmbeddingProvider;
use crate::error::{MemoryError, Result};

/// Connection settings for [`OllamaEmbedder`]
#[derive(Debug, Clone)]
pub struct OllamaEmbedderConfig {
    pub endpoint: String,
    pub model: String,
    pub timeout: Duration,
}

impl Default for OllamaEmbedderConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:11434".to_string(),
            model: "nomic-embed-text:latest".to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    #[serde(default)]
    embedding: Vec<f32>,
}

/// Embedding provider backed by a local model server
pub struct OllamaEmbedder {
    client: reqwest::Client,
    url: String,
    model: String,
}

impl OllamaEmbedder {
    pub fn new(config: OllamaEmbedderConfig) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;
        let url = format!("{}/api/embeddings", config.endpoint.trim_end_matches('/'));
        Ok(Self {
            client,
            url,
            model: config.model,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let body = serde_json::json!({
            "model": self.model,
            "prompt": text,
        });

        let response = self.client.post(&self.url).json(&body).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(MemoryError::embedding(format!(
                "embedding endpoint returned {}: {}",
                status, body_text
            )));
        }

        let parsed: EmbeddingResponse = response.json().await?;
        if parsed.embedding.is_empty() {
            return Err(MemoryError::embedding("invalid embedding response format"));
        }
        log::debug!("Generated embedding ({} dimensions)", parsed.embedding.len());
        Ok(parsed.embedding)
    }
}
