//! Generative provider capability.

use anyhow::Result;
use async_trait::async_trait;

use crate::context::AssembledPrompt;

/// Sampling options forwarded to the provider with each prompt.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationOptions {
    pub temperature: f32,
    pub max_output_tokens: u32,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_output_tokens: 1024,
        }
    }
}

/// Trait for text-generation backends.
///
/// Implementations choose how to render the [`AssembledPrompt`]: a single
/// text block via [`AssembledPrompt::render_text`] or role-tagged messages
/// via [`AssembledPrompt::to_messages`].
#[async_trait]
pub trait GenerativeProvider: Send + Sync {
    fn model_name(&self) -> &str;
    async fn generate(&self, prompt: &AssembledPrompt, options: &GenerationOptions)
        -> Result<String>;
}
