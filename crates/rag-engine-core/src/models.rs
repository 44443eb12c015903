//! Core data models shared by the index, retriever, and chat pipeline.

use serde::{Deserialize, Serialize};

/// Free-form chunk metadata. Values are expected to be scalars or strings.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// A chunk exactly as it is persisted by a [`ChunkStore`](crate::store::ChunkStore).
///
/// `id` is assigned by the index and equals the chunk's position in
/// insertion order. Records are never updated after they are written.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredChunk {
    pub id: u64,
    pub content: String,
    pub embedding: Vec<f32>,
    pub metadata: Metadata,
    pub document_id: String,
    pub chunk_index: i64,
}

/// Input to [`VectorIndex::add`](crate::index::VectorIndex::add).
#[derive(Debug, Clone)]
pub struct NewChunk {
    pub content: String,
    pub embedding: Vec<f32>,
    pub metadata: Metadata,
    pub document_id: String,
    pub chunk_index: i64,
}

/// One ranked hit produced by a search.
///
/// `score` is always "higher = more relevant", whatever metric produced it.
/// `rerank_score` is set only when a second-stage reranker ordered the hit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievalResult {
    pub chunk_id: u64,
    pub content: String,
    pub metadata: Metadata,
    pub document_id: String,
    pub chunk_index: i64,
    pub score: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rerank_score: Option<f64>,
}

impl RetrievalResult {
    /// The score the hit is currently ranked by.
    pub fn rank_score(&self) -> f64 {
        self.rerank_score.unwrap_or(self.score)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// A prior message in the caller-owned conversation history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
}

impl ConversationTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}
