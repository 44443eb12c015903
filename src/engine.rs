//! The [`Engine`] facade: one shared index plus the configured providers.
//!
//! The CLI and the HTTP server both go through this type. An `Engine` is
//! cheap to share behind an `Arc`; every operation takes `&self`.

use anyhow::Result as AnyResult;
use rag_engine_core::chat::{ChatOrchestrator, ChatRequest, ChatResponse};
use rag_engine_core::context::ContextAssembler;
use rag_engine_core::embedding::{EmbedTask, EmbeddingProvider};
use rag_engine_core::generation::GenerativeProvider;
use rag_engine_core::index::{IndexInfo, IndexOptions, VectorIndex};
use rag_engine_core::models::{Metadata, NewChunk, RetrievalResult};
use rag_engine_core::rerank::{EmbeddingScorer, KeywordScorer, RelevanceScorer, Reranker};
use rag_engine_core::retrieve::{RetrieveRequest, Retriever};
use rag_engine_core::store::ChunkStore;
use rag_engine_core::{Metric, RagError, Result};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::{Config, EmbeddingConfig, RerankConfig};
use crate::db;
use crate::embedding::create_embedder;
use crate::generation::create_generator;
use crate::migrate;
use crate::sqlite_store::SqliteChunkStore;

/// Upper bound on `top_k` for a plain query.
pub const MAX_QUERY_TOP_K: usize = 100;

pub const SERVICE_NAME: &str = "rag-engine";

/// A chunk to ingest. The engine embeds `content` itself.
#[derive(Debug, Clone, Default)]
pub struct AddChunk {
    pub content: String,
    pub metadata: Metadata,
    /// Generated (UUID v4) when absent or blank.
    pub document_id: Option<String>,
    /// Defaults to `0`.
    pub chunk_index: Option<i64>,
}

/// Where an added chunk landed, with defaults resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AddedChunk {
    pub chunk_id: u64,
    pub document_id: String,
    pub chunk_index: i64,
}

#[derive(Debug, Clone)]
pub struct Query {
    pub text: String,
    pub metric: Metric,
    pub top_k: usize,
    pub threshold: Option<f64>,
    /// Accepted for API compatibility; not applied.
    pub metadata_filter: Option<Metadata>,
}

impl Query {
    pub fn new(text: impl Into<String>, top_k: usize) -> Self {
        Self {
            text: text.into(),
            metric: Metric::default(),
            top_k,
            threshold: None,
            metadata_filter: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Health {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
    pub total_chunks: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct EngineInfo {
    #[serde(flatten)]
    pub index: IndexInfo,
    pub embedding_model: String,
    pub generation_model: String,
    pub reranker: Option<String>,
    pub default_top_k: usize,
}

/// Everything an [`Engine`] is built from. [`Engine::open`] fills this
/// in from configuration; tests can supply their own providers.
pub struct Components<S> {
    pub index: Arc<VectorIndex<S>>,
    pub embedder: Arc<dyn EmbeddingProvider>,
    pub generator: Arc<dyn GenerativeProvider>,
    pub reranker: Option<Reranker>,
}

pub struct Engine<S = SqliteChunkStore> {
    orchestrator: ChatOrchestrator<S>,
    embedder: Arc<dyn EmbeddingProvider>,
    default_top_k: usize,
    max_history_turns: Option<usize>,
}

impl Engine<SqliteChunkStore> {
    /// Open the SQLite-backed index and build the configured providers.
    pub async fn open(config: &Config) -> AnyResult<Self> {
        let index = open_index(config).await?;
        let embedder = create_embedder(&config.embedding)?;
        check_embedder_dims(index.dims(), embedder.as_ref())?;
        let generator = create_generator(&config.generation)?;
        let reranker = build_reranker(
            &config.retrieval.rerank,
            &config.embedding,
            embedder.clone(),
        )?;

        Ok(Self::with_components(
            Components {
                index,
                embedder,
                generator,
                reranker,
            },
            config,
        ))
    }
}

impl<S: ChunkStore> Engine<S> {
    pub fn with_components(components: Components<S>, config: &Config) -> Self {
        let retriever = Retriever::new(components.index, components.embedder.clone())
            .with_reranker(components.reranker);

        let orchestrator = ChatOrchestrator::new(retriever, components.generator)
            .with_assembler(
                ContextAssembler::new()
                    .with_default_system_prompt(config.chat.system_prompt.clone()),
            )
            .with_max_output_tokens(config.generation.max_output_tokens)
            .with_history_query_turns(config.chat.history_query_turns);

        Self {
            orchestrator,
            embedder: components.embedder,
            default_top_k: config.retrieval.default_top_k,
            max_history_turns: config.chat.max_history_turns,
        }
    }

    pub fn index(&self) -> &Arc<VectorIndex<S>> {
        self.orchestrator.retriever().index()
    }

    pub fn default_top_k(&self) -> usize {
        self.default_top_k
    }

    /// Embed `chunk.content` and append it to the index.
    ///
    /// Nothing is stored if embedding fails.
    pub async fn add_chunk(&self, chunk: AddChunk) -> Result<AddedChunk> {
        if chunk.content.trim().is_empty() {
            return Err(RagError::InvalidParameter(
                "content must not be empty".to_string(),
            ));
        }

        let embedding = self
            .embedder
            .embed(&chunk.content, EmbedTask::Document)
            .await
            .map_err(|e| RagError::from_provider("embedding", e, RagError::EmbeddingFailed))?;

        let document_id = chunk
            .document_id
            .filter(|d| !d.trim().is_empty())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        let chunk_index = chunk.chunk_index.unwrap_or(0);

        let chunk_id = self
            .index()
            .add(NewChunk {
                content: chunk.content,
                embedding,
                metadata: chunk.metadata,
                document_id: document_id.clone(),
                chunk_index,
            })
            .await?;

        info!(chunk_id, %document_id, "chunk added");
        Ok(AddedChunk {
            chunk_id,
            document_id,
            chunk_index,
        })
    }

    /// Retrieve the chunks most similar to `query.text`.
    pub async fn query(&self, query: &Query) -> Result<Vec<RetrievalResult>> {
        if !(1..=MAX_QUERY_TOP_K).contains(&query.top_k) {
            return Err(RagError::InvalidParameter(format!(
                "top_k must be in [1, {}], got {}",
                MAX_QUERY_TOP_K, query.top_k
            )));
        }
        if query.metadata_filter.is_some() {
            debug!("metadata_filter supplied; filtering is not applied");
        }

        let request = RetrieveRequest::new(&query.text, query.metric, query.top_k)
            .with_threshold(query.threshold);
        self.orchestrator.retriever().retrieve(&request).await
    }

    /// Answer `request.message` grounded in retrieved chunks.
    ///
    /// History beyond `chat.max_history_turns` is dropped oldest-first
    /// before the turn runs.
    pub async fn chat(&self, mut request: ChatRequest) -> Result<ChatResponse> {
        if let Some(max) = self.max_history_turns {
            let excess = request.history.len().saturating_sub(max);
            if excess > 0 {
                debug!(dropped = excess, "truncating chat history");
                request.history.drain(..excess);
            }
        }
        self.orchestrator.chat(&request).await
    }

    pub async fn health(&self) -> Result<Health> {
        self.index().refresh().await?;
        Ok(Health {
            status: "healthy",
            service: SERVICE_NAME,
            version: env!("CARGO_PKG_VERSION"),
            total_chunks: self.index().count(),
        })
    }

    pub async fn info(&self) -> Result<EngineInfo> {
        self.index().refresh().await?;
        Ok(EngineInfo {
            index: self.index().info(),
            embedding_model: self.embedder.model_name().to_string(),
            generation_model: self.orchestrator.model_name().to_string(),
            reranker: self
                .orchestrator
                .retriever()
                .reranker()
                .map(|r| r.scorer_name().to_string()),
            default_top_k: self.default_top_k,
        })
    }
}

/// Fail when the embedder's vector width disagrees with the index.
///
/// Providers that report `0` (disabled) are not checked.
pub fn check_embedder_dims(
    index_dims: Option<usize>,
    embedder: &dyn EmbeddingProvider,
) -> Result<()> {
    match (index_dims, embedder.dims()) {
        (_, 0) | (None, _) => Ok(()),
        (Some(expected), actual) if expected != actual => {
            Err(RagError::DimensionMismatch { expected, actual })
        }
        _ => Ok(()),
    }
}

/// Open (creating if needed) the SQLite database and replay it into an index.
pub async fn open_index(config: &Config) -> AnyResult<Arc<VectorIndex<SqliteChunkStore>>> {
    let pool = db::connect(config).await?;
    migrate::apply(&pool).await?;

    let options = IndexOptions {
        dims: config.index_dims(),
        normalize: config.index.normalize,
    };
    let index = VectorIndex::open(SqliteChunkStore::new(pool), options).await?;
    Ok(Arc::new(index))
}

/// Build the second-stage reranker described by `[retrieval.rerank]`.
///
/// The `embedding` scorer reuses `embedder` unless a separate model is
/// configured.
pub fn build_reranker(
    rerank: &RerankConfig,
    embedding: &EmbeddingConfig,
    embedder: Arc<dyn EmbeddingProvider>,
) -> AnyResult<Option<Reranker>> {
    if !rerank.enabled {
        return Ok(None);
    }

    let scorer: Arc<dyn RelevanceScorer> = match rerank.scorer.as_str() {
        "keyword" => Arc::new(KeywordScorer::new(rerank.semantic_weight)),
        "embedding" => {
            let provider = match &rerank.model {
                Some(model) => create_embedder(&EmbeddingConfig {
                    model: Some(model.clone()),
                    ..embedding.clone()
                })?,
                None => embedder,
            };
            Arc::new(EmbeddingScorer::new(provider))
        }
        other => anyhow::bail!("Unknown rerank scorer: {}", other),
    };

    Ok(Some(
        Reranker::new(scorer)
            .with_fanout(rerank.fanout)
            .with_top_k(rerank.top_k),
    ))
}
