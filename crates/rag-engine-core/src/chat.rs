//! Retrieval-augmented chat: retrieve, assemble, generate.
//!
//! [`ChatOrchestrator::chat`] runs strictly in sequence: validate → embed →
//! search → (rerank) → assemble → generate. Parameters are checked before
//! any remote call. Provider failures surface as typed errors and are never
//! replaced with placeholder text.

use std::borrow::Cow;
use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use crate::context::ContextAssembler;
use crate::error::{RagError, Result};
use crate::generation::{GenerationOptions, GenerativeProvider};
use crate::metric::Metric;
use crate::models::{ConversationTurn, RetrievalResult, Role};
use crate::retrieve::{RetrieveRequest, Retriever};
use crate::store::ChunkStore;

/// Upper bound on chunks retrieved for one chat turn.
pub const MAX_CHAT_TOP_K: usize = 10;

#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub message: String,
    /// Prior turns, oldest first. Read-only for the duration of the call.
    pub history: Vec<ConversationTurn>,
    pub metric: Metric,
    pub top_k: usize,
    pub temperature: f32,
    pub system_prompt: Option<String>,
}

impl ChatRequest {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            history: Vec::new(),
            metric: Metric::Cosine,
            top_k: 3,
            temperature: 0.7,
            system_prompt: None,
        }
    }

    fn validate(&self) -> Result<()> {
        if self.message.trim().is_empty() {
            return Err(RagError::invalid("message must not be empty"));
        }
        if !(1..=MAX_CHAT_TOP_K).contains(&self.top_k) {
            return Err(RagError::InvalidParameter(format!(
                "top_k must be in [1, {}], got {}",
                MAX_CHAT_TOP_K, self.top_k
            )));
        }
        if !self.temperature.is_finite() || !(0.0..=1.0).contains(&self.temperature) {
            return Err(RagError::InvalidParameter(format!(
                "temperature must be in [0.0, 1.0], got {}",
                self.temperature
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatResponse {
    pub response: String,
    pub user_message: String,
    /// Every chunk placed in the prompt, in rank order.
    pub chunks_used: Vec<RetrievalResult>,
    pub context_used: usize,
    pub model: String,
    pub metric: Metric,
}

pub struct ChatOrchestrator<S> {
    retriever: Retriever<S>,
    assembler: ContextAssembler,
    generator: Arc<dyn GenerativeProvider>,
    max_output_tokens: u32,
    history_query_turns: usize,
}

impl<S: ChunkStore> ChatOrchestrator<S> {
    pub fn new(retriever: Retriever<S>, generator: Arc<dyn GenerativeProvider>) -> Self {
        Self {
            retriever,
            assembler: ContextAssembler::new(),
            generator,
            max_output_tokens: GenerationOptions::default().max_output_tokens,
            history_query_turns: 0,
        }
    }

    pub fn with_assembler(mut self, assembler: ContextAssembler) -> Self {
        self.assembler = assembler;
        self
    }

    pub fn with_max_output_tokens(mut self, max_output_tokens: u32) -> Self {
        self.max_output_tokens = max_output_tokens;
        self
    }

    /// Prefix the retrieval query with the user messages found among the
    /// last `turns` history entries (of any role). `0` retrieves on the
    /// current message alone.
    pub fn with_history_query_turns(mut self, turns: usize) -> Self {
        self.history_query_turns = turns;
        self
    }

    pub fn retriever(&self) -> &Retriever<S> {
        &self.retriever
    }

    pub fn model_name(&self) -> &str {
        self.generator.model_name()
    }

    fn retrieval_query<'a>(&self, req: &'a ChatRequest) -> Cow<'a, str> {
        if self.history_query_turns == 0 || req.history.is_empty() {
            return Cow::Borrowed(&req.message);
        }
        let start = req.history.len().saturating_sub(self.history_query_turns);
        let recent: Vec<&str> = req.history[start..]
            .iter()
            .filter(|t| t.role == Role::User)
            .map(|t| t.content.as_str())
            .collect();
        if recent.is_empty() {
            Cow::Borrowed(&req.message)
        } else {
            Cow::Owned(format!("{} {}", recent.join(" "), req.message))
        }
    }

    pub async fn chat(&self, req: &ChatRequest) -> Result<ChatResponse> {
        req.validate()?;

        let query = self.retrieval_query(req);
        let chunks = self
            .retriever
            .retrieve(&RetrieveRequest::new(&query, req.metric, req.top_k))
            .await?;

        let prompt = self.assembler.assemble(
            req.system_prompt.as_deref(),
            &chunks,
            &req.history,
            &req.message,
        );

        let options = GenerationOptions {
            temperature: req.temperature,
            max_output_tokens: self.max_output_tokens,
        };
        let response = self
            .generator
            .generate(&prompt, &options)
            .await
            .map_err(|e| RagError::from_provider("generation", e, RagError::GenerationFailed))?;

        info!(
            model = self.generator.model_name(),
            metric = %req.metric,
            history_turns = req.history.len(),
            context_used = chunks.len(),
            "chat turn complete"
        );

        Ok(ChatResponse {
            response,
            user_message: req.message.clone(),
            context_used: chunks.len(),
            chunks_used: chunks,
            model: self.generator.model_name().to_string(),
            metric: req.metric,
        })
    }
}
