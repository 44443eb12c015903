//! In-process fakes shared by the unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::{bail, Result};
use async_trait::async_trait;

use crate::context::AssembledPrompt;
use crate::embedding::{EmbedTask, EmbeddingProvider};
use crate::generation::{GenerationOptions, GenerativeProvider};

/// Bag-of-words embedder: each lowercase token bumps one FNV-1a bucket.
pub struct HashEmbedder {
    pub dims: usize,
    pub calls: AtomicUsize,
}

impl HashEmbedder {
    pub fn new(dims: usize) -> Self {
        Self {
            dims,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn vector(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dims];
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let mut h: u64 = 0xcbf29ce484222325;
            for b in token.to_lowercase().bytes() {
                h ^= u64::from(b);
                h = h.wrapping_mul(0x100000001b3);
            }
            v[(h % self.dims as u64) as usize] += 1.0;
        }
        v
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbedder {
    fn model_name(&self) -> &str {
        "hash"
    }
    fn dims(&self) -> usize {
        self.dims
    }
    async fn embed(&self, text: &str, _task: EmbedTask) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.vector(text))
    }
}

pub struct FailingEmbedder;

#[async_trait]
impl EmbeddingProvider for FailingEmbedder {
    fn model_name(&self) -> &str {
        "failing"
    }
    fn dims(&self) -> usize {
        8
    }
    async fn embed(&self, _text: &str, _task: EmbedTask) -> Result<Vec<f32>> {
        bail!("embedding API error 503: unavailable")
    }
}

/// Echoes the rendered prompt back so tests can inspect it.
pub struct EchoGenerator {
    pub calls: AtomicUsize,
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
        options: &GenerationOptions,
    ) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(format!("[t={}] {}", options.temperature, prompt.render_text()))
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
