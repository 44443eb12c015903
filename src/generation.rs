//! Remote text-generation providers.
//!
//! Gemini receives the prompt as one rendered text block; OpenAI and Ollama
//! receive role-tagged messages. All providers forward `temperature` and
//! `max_output_tokens` from [`GenerationOptions`].

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use rag_engine_core::context::AssembledPrompt;
use rag_engine_core::generation::{GenerationOptions, GenerativeProvider};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::config::GenerationConfig;
use crate::embedding::{GEMINI_BASE_URL, OLLAMA_BASE_URL, OPENAI_BASE_URL};
use crate::http::{api_key, JsonClient};

/// Build the generative provider named by `config.provider`.
pub fn create_generator(config: &GenerationConfig) -> Result<Arc<dyn GenerativeProvider>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledGenerator)),
        "gemini" => Ok(Arc::new(GeminiGenerator::new(config)?)),
        "openai" => Ok(Arc::new(OpenAIGenerator::new(config)?)),
        "ollama" => Ok(Arc::new(OllamaGenerator::new(config)?)),
        other => bail!("Unknown generation provider: {}", other),
    }
}

fn required_model(config: &GenerationConfig, label: &str) -> Result<String> {
    config
        .model
        .clone()
        .ok_or_else(|| anyhow!("generation.model required for {} provider", label))
}

pub struct DisabledGenerator;

#[async_trait]
impl GenerativeProvider for DisabledGenerator {
    fn model_name(&self) -> &str {
        "disabled"
    }
    async fn generate(
        &self,
        _prompt: &AssembledPrompt,
        _options: &GenerationOptions,
    ) -> Result<String> {
        bail!("Generation provider is disabled. Set [generation] provider in config.")
    }
}

// ============ Gemini ============

pub struct GeminiGenerator {
    model: String,
    base_url: String,
    api_key: String,
    client: JsonClient,
}

impl GeminiGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        Ok(Self {
            model: required_model(config, "Gemini")?,
            base_url: config.url.clone().unwrap_or_else(|| GEMINI_BASE_URL.to_string()),
            api_key: api_key("GEMINI_API_KEY")?,
            client: JsonClient::new("Gemini", config.timeout_secs, config.max_retries)?,
        })
    }
}

fn gemini_generate_body(prompt: &AssembledPrompt, options: &GenerationOptions) -> Value {
    json!({
        "contents": [{ "role": "user", "parts": [{ "text": prompt.render_text() }] }],
        "generationConfig": {
            "temperature": options.temperature,
            "maxOutputTokens": options.max_output_tokens,
        },
    })
}

fn parse_gemini_text(json: &Value) -> Result<String> {
    let parts = json
        .pointer("/candidates/0/content/parts")
        .and_then(|p| p.as_array())
        .ok_or_else(|| match json.pointer("/promptFeedback/blockReason") {
            Some(reason) => anyhow!("Gemini blocked the prompt: {}", reason),
            None => anyhow!("Invalid Gemini response: missing candidates[0].content.parts"),
        })?;
    let text: String = parts
        .iter()
        .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
        .collect();
    if text.is_empty() {
        bail!("Gemini returned an empty response");
    }
    Ok(text)
}

#[async_trait]
impl GenerativeProvider for GeminiGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }
    async fn generate(
        &self,
        prompt: &AssembledPrompt,
        options: &GenerationOptions,
    ) -> Result<String> {
        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
        let json = self
            .client
            .post_json(
                &url,
                &[("x-goog-api-key", self.api_key.clone())],
                &gemini_generate_body(prompt, options),
            )
            .await?;
        parse_gemini_text(&json)
    }
}

// ============ OpenAI ============

pub struct OpenAIGenerator {
    model: String,
    base_url: String,
    api_key: String,
    client: JsonClient,
}

impl OpenAIGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        Ok(Self {
            model: required_model(config, "OpenAI")?,
            base_url: config.url.clone().unwrap_or_else(|| OPENAI_BASE_URL.to_string()),
            api_key: api_key("OPENAI_API_KEY")?,
            client: JsonClient::new("OpenAI", config.timeout_secs, config.max_retries)?,
        })
    }
}

fn openai_chat_body(model: &str, prompt: &AssembledPrompt, options: &GenerationOptions) -> Value {
    json!({
        "model": model,
        "messages": prompt.to_messages(),
        "temperature": options.temperature,
        "max_tokens": options.max_output_tokens,
    })
}

fn parse_openai_text(json: &Value) -> Result<String> {
    json.pointer("/choices/0/message/content")
        .and_then(|c| c.as_str())
        .map(str::to_string)
        .ok_or_else(|| anyhow!("Invalid OpenAI response: missing choices[0].message.content"))
}

#[async_trait]
impl GenerativeProvider for OpenAIGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }
    async fn generate(
        &self,
        prompt: &AssembledPrompt,
        options: &GenerationOptions,
    ) -> Result<String> {
        let json = self
            .client
            .post_json(
                &format!("{}/chat/completions", self.base_url),
                &[("Authorization", format!("Bearer {}", self.api_key))],
                &openai_chat_body(&self.model, prompt, options),
            )
            .await?;
        parse_openai_text(&json)
    }
}

// ============ Ollama ============

pub struct OllamaGenerator {
    model: String,
    base_url: String,
    client: JsonClient,
}

impl OllamaGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        Ok(Self {
            model: required_model(config, "Ollama")?,
            base_url: config.url.clone().unwrap_or_else(|| OLLAMA_BASE_URL.to_string()),
            client: JsonClient::new("Ollama", config.timeout_secs, config.max_retries)?,
        })
    }
}

fn ollama_chat_body(model: &str, prompt: &AssembledPrompt, options: &GenerationOptions) -> Value {
    json!({
        "model": model,
        "messages": prompt.to_messages(),
        "stream": false,
        "options": {
            "temperature": options.temperature,
            "num_predict": options.max_output_tokens,
        },
    })
}

fn parse_ollama_text(json: &Value) -> Result<String> {
    json.pointer("/message/content")
        .and_then(|c| c.as_str())
        .map(str::to_string)
        .ok_or_else(|| anyhow!("Invalid Ollama response: missing message.content"))
}

#[async_trait]
impl GenerativeProvider for OllamaGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }
    async fn generate(
        &self,
        prompt: &AssembledPrompt,
        options: &GenerationOptions,
    ) -> Result<String> {
        let json = self
            .client
            .post_json(
                &format!("{}/api/chat", self.base_url),
                &[],
                &ollama_chat_body(&self.model, prompt, options),
            )
            .await?;
        parse_ollama_text(&json)
    }
}
