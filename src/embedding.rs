//! Remote embedding providers.
//!
//! Implements [`EmbeddingProvider`] for:
//! - **[`DisabledEmbedder`]**: returns errors; used when embeddings are not configured.
//! - **[`GeminiEmbedder`]**: Google Generative Language `embedContent`, task-typed.
//! - **[`OpenAIEmbedder`]**: `POST /v1/embeddings`.
//! - **[`OllamaEmbedder`]**: a local Ollama instance, `POST /api/embed`.
//!
//! Use [`create_embedder`] to build the provider named in `[embedding]`:
//!
//! ```rust
//! # use rag_engine::config::EmbeddingConfig;
//! # use rag_engine::embedding::create_embedder;
//! let provider = create_embedder(&EmbeddingConfig::default()).unwrap();
//! assert_eq!(provider.model_name(), "disabled");
//! ```

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use rag_engine_core::embedding::{EmbedTask, EmbeddingProvider};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::config::EmbeddingConfig;
use crate::http::{api_key, parse_vector, JsonClient};

pub const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const OLLAMA_BASE_URL: &str = "http://localhost:11434";

/// Build the embedding provider named by `config.provider`.
///
/// # Errors
///
/// Returns an error for unknown provider names, missing `model`/`dims`,
/// or a missing API key.
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledEmbedder)),
        "gemini" => Ok(Arc::new(GeminiEmbedder::new(config)?)),
        "openai" => Ok(Arc::new(OpenAIEmbedder::new(config)?)),
        "ollama" => Ok(Arc::new(OllamaEmbedder::new(config)?)),
        other => bail!("Unknown embedding provider: {}", other),
    }
}

fn required_model_and_dims(config: &EmbeddingConfig, label: &str) -> Result<(String, usize)> {
    let model = config
        .model
        .clone()
        .ok_or_else(|| anyhow!("embedding.model required for {} provider", label))?;
    let dims = config
        .dims
        .ok_or_else(|| anyhow!("embedding.dims required for {} provider", label))?;
    Ok((model, dims))
}

// ============ Disabled ============

pub struct DisabledEmbedder;

#[async_trait]
impl EmbeddingProvider for DisabledEmbedder {
    fn model_name(&self) -> &str {
        "disabled"
    }
    fn dims(&self) -> usize {
        0
    }
    async fn embed(&self, _text: &str, _task: EmbedTask) -> Result<Vec<f32>> {
        bail!("Embedding provider is disabled. Set [embedding] provider in config.")
    }
}

// ============ Gemini ============

/// Requires the `GEMINI_API_KEY` environment variable.
pub struct GeminiEmbedder {
    model: String,
    dims: usize,
    base_url: String,
    api_key: String,
    client: JsonClient,
}

impl GeminiEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let (model, dims) = required_model_and_dims(config, "Gemini")?;
        Ok(Self {
            model,
            dims,
            base_url: config.url.clone().unwrap_or_else(|| GEMINI_BASE_URL.to_string()),
            api_key: api_key("GEMINI_API_KEY")?,
            client: JsonClient::new("Gemini", config.timeout_secs, config.max_retries)?,
        })
    }
}

fn gemini_task_type(task: EmbedTask) -> &'static str {
    match task {
        EmbedTask::Query => "RETRIEVAL_QUERY",
        EmbedTask::Document => "RETRIEVAL_DOCUMENT",
    }
}

fn gemini_embed_body(model: &str, text: &str, task: EmbedTask) -> Value {
    json!({
        "model": format!("models/{}", model),
        "content": { "parts": [{ "text": text }] },
        "taskType": gemini_task_type(task),
    })
}

fn parse_gemini_embedding(json: &Value) -> Result<Vec<f32>> {
    let values = json
        .pointer("/embedding/values")
        .ok_or_else(|| anyhow!("Invalid Gemini response: missing embedding.values"))?;
    parse_vector(values, "Gemini")
}

#[async_trait]
impl EmbeddingProvider for GeminiEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }
    async fn embed(&self, text: &str, task: EmbedTask) -> Result<Vec<f32>> {
        let url = format!("{}/models/{}:embedContent", self.base_url, self.model);
        let body = gemini_embed_body(&self.model, text, task);
        let json = self
            .client
            .post_json(&url, &[("x-goog-api-key", self.api_key.clone())], &body)
            .await?;
        parse_gemini_embedding(&json)
    }
}

// ============ OpenAI ============

/// Requires the `OPENAI_API_KEY` environment variable.
pub struct OpenAIEmbedder {
    model: String,
    dims: usize,
    base_url: String,
    api_key: String,
    client: JsonClient,
}

impl OpenAIEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let (model, dims) = required_model_and_dims(config, "OpenAI")?;
        Ok(Self {
            model,
            dims,
            base_url: config.url.clone().unwrap_or_else(|| OPENAI_BASE_URL.to_string()),
            api_key: api_key("OPENAI_API_KEY")?,
            client: JsonClient::new("OpenAI", config.timeout_secs, config.max_retries)?,
        })
    }
}

fn parse_openai_embedding(json: &Value) -> Result<Vec<f32>> {
    let embedding = json
        .pointer("/data/0/embedding")
        .ok_or_else(|| anyhow!("Invalid OpenAI response: missing data[0].embedding"))?;
    parse_vector(embedding, "OpenAI")
}

#[async_trait]
impl EmbeddingProvider for OpenAIEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }
    async fn embed(&self, text: &str, _task: EmbedTask) -> Result<Vec<f32>> {
        let body = json!({ "model": self.model, "input": text });
        let json = self
            .client
            .post_json(
                &format!("{}/embeddings", self.base_url),
                &[("Authorization", format!("Bearer {}", self.api_key))],
                &body,
            )
            .await?;
        parse_openai_embedding(&json)
    }
}

// ============ Ollama ============

/// Requires Ollama to be running with an embedding model pulled
/// (e.g. `ollama pull nomic-embed-text`).
pub struct OllamaEmbedder {
    model: String,
    dims: usize,
    base_url: String,
    client: JsonClient,
}

impl OllamaEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let (model, dims) = required_model_and_dims(config, "Ollama")?;
        Ok(Self {
            model,
            dims,
            base_url: config.url.clone().unwrap_or_else(|| OLLAMA_BASE_URL.to_string()),
            client: JsonClient::new("Ollama", config.timeout_secs, config.max_retries)?,
        })
    }
}

fn parse_ollama_embedding(json: &Value) -> Result<Vec<f32>> {
    let embedding = json
        .pointer("/embeddings/0")
        .ok_or_else(|| anyhow!("Invalid Ollama response: missing embeddings array"))?;
    parse_vector(embedding, "Ollama")
}

#[async_trait]
impl EmbeddingProvider for OllamaEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }
    async fn embed(&self, text: &str, _task: EmbedTask) -> Result<Vec<f32>> {
        let body = json!({ "model": self.model, "input": text });
        let json = self
            .client
            .post_json(&format!("{}/api/embed", self.base_url), &[], &body)
            .await?;
        parse_ollama_embedding(&json)
    }
}
