//! Language-model summarizer seam

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use crate::error::{MemoryError, Result};

/// Turns a prompt into summary text
///
/// `Err` (or empty text) means "no summary"; the caller skips the batch.
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, prompt: &str) -> Result<String>;
}

/// Connection and sampling settings for [`OllamaSummarizer`]
#[derive(Debug, Clone)]
pub struct OllamaSummarizerConfig {
    pub endpoint: String,
    pub model: String,
    pub temperature: f32,
    pub top_p: f32,
    pub max_tokens: u32,
    pub timeout: Duration,
}

impl Default for OllamaSummarizerConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:11434".to_string(),
            model: "qwen2.5-coder:7b".to_string(),
            temperature: 0.3,
            top_p: 0.8,
            max_tokens: 500,
            timeout: Duration::from_secs(120),
        }
    }
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

/// Non-streaming `/api/generate` client
pub struct OllamaSummarizer {
    client: reqwest::Client,
    url: String,
    config: OllamaSummarizerConfig,
}

impl OllamaSummarizer {
    pub fn new(config: OllamaSummarizerConfig) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;
        let url = format!("{}/api/generate", config.endpoint.trim_end_matches('/'));
        Ok(Self { client, url, config })
    }

    fn request_body(&self, prompt: &str) -> serde_json::Value {
        serde_json::json!({
            "model": self.config.model,
            "prompt": prompt,
            "stream": false,
            "options": {
                "temperature": self.config.temperature,
                "top_p": self.config.top_p,
                "num_predict": self.config.max_tokens,
            }
        })
    }
}

#[async_trait]
impl Summarizer for OllamaSummarizer {
    async fn summarize(&self, prompt: &str) -> Result<String> {
        let response = self
            .client
            .post(&self.url)
            .json(&self.request_body(prompt))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(MemoryError::summarizer(format!(
                "generate endpoint returned {}",
                status
            )));
        }

        let parsed: GenerateResponse = response.json().await?;
        let text = parsed.response.trim();
        if text.is_empty() {
            return Err(MemoryError::summarizer("empty response"));
        }
        Ok(text.to_string())
    }
}
