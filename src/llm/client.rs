//! External-model client: an Ollama-backed `ModelClient` implementation.
//!
//! Config shape (`ModelConfig`'s serde-default fields) is grounded on the
//! teacher's `llm::client::LlmConfig`; request/response plumbing is grounded
//! on the teacher's `call_ollama`.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Errors surfaced by a `ModelClient::generate` call.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("connection error: {0}")]
    Connection(String),
    #[error("api error: {0}")]
    Api(String),
    #[error("parse error: {0}")]
    Parse(String),
    #[error("model client is disabled")]
    Disabled,
}

/// Per-call generation parameters.
#[derive(Debug, Clone)]
pub struct ModelParams {
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for ModelParams {
    fn default() -> Self {
        Self {
            max_tokens: 1024,
            temperature: 0.3,
        }
    }
}

/// The external large-model text generator, modeled by its I/O contract
/// only (§1 Out of scope): `generate(prompt, params) -> text`.
#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn generate(&self, prompt: &str, params: &ModelParams) -> Result<String, ModelError>;

    /// Whether the backing service is reachable, used by `GET /health`.
    async fn is_available(&self) -> bool {
        true
    }
}

/// Configuration for the Ollama-backed model client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_enabled() -> bool {
    true
}
fn default_endpoint() -> String {
    "http://localhost:11434".to_string()
}
fn default_model() -> String {
    "llama3.1:8b".to_string()
}
fn default_max_tokens() -> u32 {
    1024
}
fn default_temperature() -> f32 {
    0.3
}
fn default_timeout_secs() -> u64 {
    120
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            endpoint: default_endpoint(),
            model: default_model(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug, Serialize)]
struct OllamaRequest {
    model: String,
    prompt: String,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    response: String,
}

/// `ModelClient` implementation backed by an Ollama-compatible HTTP API.
pub struct OllamaModelClient {
    config: ModelConfig,
    client: Client,
}

impl OllamaModelClient {
    pub fn new(config: ModelConfig) -> Self {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .expect("failed to build HTTP client");
        Self { config, client }
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }
}

#[async_trait]
impl ModelClient for OllamaModelClient {
    async fn generate(&self, prompt: &str, params: &ModelParams) -> Result<String, ModelError> {
        if !self.config.enabled {
            return Err(ModelError::Disabled);
        }

        let request = OllamaRequest {
            model: self.config.model.clone(),
            prompt: prompt.to_string(),
            stream: false,
            options: OllamaOptions {
                temperature: params.temperature,
                num_predict: params.max_tokens,
            },
        };

        let url = format!("{}/api/generate", self.config.endpoint);
        debug!(%url, "calling external model");
        let resp = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| ModelError::Connection(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(ModelError::Api(format!("HTTP {status}: {body}")));
        }

        let parsed: OllamaResponse = resp
            .json()
            .await
            .map_err(|e| ModelError::Parse(e.to_string()))?;
        Ok(parsed.response)
    }

    async fn is_available(&self) -> bool {
        if !self.config.enabled {
            return false;
        }
        let url = format!("{}/api/tags", self.config.endpoint);
        matches!(self.client.get(&url).send().await, Ok(resp) if resp.status().is_success())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_expected_ollama_defaults() {
        let config = ModelConfig::default();
        assert_eq!(config.endpoint, "http://localhost:11434");
        assert!(config.enabled);
    }
}
