//! # RAG Engine Core
//!
//! Retrieval and context-assembly logic for RAG Engine: the vector index,
//! similarity metrics, retrieve-then-rerank pipeline, and the conversational
//! context assembler.
//!
//! This crate contains no tokio, sqlx, HTTP, or filesystem dependencies.
//! Durable storage and remote providers are injected through the
//! [`store::ChunkStore`], [`embedding::EmbeddingProvider`] and
//! [`generation::GenerativeProvider`] traits.
//!
//! ```text
//! text ─▶ EmbeddingProvider ─▶ VectorIndex::search ─▶ (Reranker) ─▶ threshold
//!                                                                     │
//!            GenerativeProvider ◀── ContextAssembler ◀────────────────┘
//! ```

pub mod chat;
pub mod context;
pub mod embedding;
pub mod error;
pub mod generation;
pub mod index;
pub mod metric;
pub mod models;
pub mod rerank;
pub mod retrieve;
pub mod store;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{ProviderTimeout, RagError, Result};
pub use metric::Metric;
