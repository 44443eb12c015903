#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;
use rag_engine::config::Config;
use rag_engine::engine::{open_index, AddChunk, Components, Engine};
use rag_engine_core::context::AssembledPrompt;
use rag_engine_core::embedding::{EmbedTask, EmbeddingProvider};
use rag_engine_core::generation::{GenerationOptions, GenerativeProvider};
use rag_engine_core::models::Metadata;
use rag_engine_core::ProviderTimeout;
use tempfile::TempDir;

pub const DIMS: usize = 64;

/// (content, document_id) pairs indexed by [`seed`], in id order.
pub const KNOWLEDGE_BASE: [(&str, &str); 4] = [
    ("Rust has a borrow checker", "rust-notes"),
    ("Tea is brewed with hot water", "kitchen"),
    ("Python is a language", "python-notes"),
    ("Kubernetes schedules containers", "ops"),
];

/// Bag-of-words embedder: each lowercase token bumps one FNV-1a bucket.
pub struct HashEmbedder {
    calls: AtomicUsize,
}

impl HashEmbedder {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbedder {
    fn model_name(&self) -> &str {
        "hash"
    }
    fn dims(&self) -> usize {
        DIMS
    }
    async fn embed(&self, text: &str, _task: EmbedTask) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut v = vec![0.0f32; DIMS];
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let mut h: u64 = 0xcbf29ce484222325;
            for b in token.to_lowercase().bytes() {
                h ^= u64::from(b);
                h = h.wrapping_mul(0x100000001b3);
            }
            v[(h % DIMS as u64) as usize] += 1.0;
        }
        Ok(v)
    }
}

/// Returns the rendered prompt so tests can inspect what the model saw.
pub struct EchoGenerator {
    calls: AtomicUsize,
}

impl EchoGenerator {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GenerativeProvider for EchoGenerator {
    fn model_name(&self) -> &str {
        "echo"
    }
    async fn generate(
        &self,
        prompt: &AssembledPrompt,
        _options: &GenerationOptions,
    ) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(prompt.render_text())
    }
}

pub struct FailingGenerator;

#[async_trait]
impl GenerativeProvider for FailingGenerator {
    fn model_name(&self) -> &str {
        "failing"
    }
    async fn generate(
        &self,
        _prompt: &AssembledPrompt,
        _options: &GenerationOptions,
    ) -> Result<String> {
        bail!("generation API error 429: quota exceeded")
    }
}

pub struct TimeoutGenerator;

#[async_trait]
impl GenerativeProvider for TimeoutGenerator {
    fn model_name(&self) -> &str {
        "slow"
    }
    async fn generate(
        &self,
        _prompt: &AssembledPrompt,
        _options: &GenerationOptions,
    ) -> Result<String> {
        Err(anyhow::Error::new(ProviderTimeout { secs: 60 }))
    }
}

pub fn test_config(dir: &TempDir) -> Config {
    Config::minimal(dir.path().join("data").join("rag.sqlite"))
}

pub async fn open_engine(
    config: &Config,
    embedder: Arc<HashEmbedder>,
    generator: Arc<dyn GenerativeProvider>,
) -> Engine {
    let index = open_index(config).await.unwrap();
    Engine::with_components(
        Components {
            index,
            embedder,
            generator,
            reranker: None,
        },
        config,
    )
}

/// Add every [`KNOWLEDGE_BASE`] entry, tagging each with its position.
pub async fn seed(engine: &Engine) {
    for (i, (content, document_id)) in KNOWLEDGE_BASE.iter().enumerate() {
        let mut metadata = Metadata::new();
        metadata.insert("source".into(), serde_json::json!(format!("kb-{}", i)));
        let added = engine
            .add_chunk(AddChunk {
                content: content.to_string(),
                metadata,
                document_id: Some(document_id.to_string()),
                chunk_index: Some(i as i64),
            })
            .await
            .unwrap();
        assert_eq!(added.chunk_id, i as u64);
    }
}
