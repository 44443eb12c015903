//! Query-time retrieval: embed, search, optionally rerank, filter.
//!
//! # Pipeline
//!
//! 1. Embed the query with [`EmbedTask::Query`].
//! 2. Search the index for `top_k` candidates, or `top_k × fanout` when a
//!    [`Reranker`] is attached.
//! 3. Rerank the candidates (optional).
//! 4. Drop hits whose normalized `score` is below the threshold. The
//!    threshold always means "higher = more relevant", for every metric.
//! 5. Return at most `top_k` hits, best first.

use std::sync::Arc;

use tracing::debug;

use crate::embedding::{EmbedTask, EmbeddingProvider};
use crate::error::{RagError, Result};
use crate::index::VectorIndex;
use crate::metric::Metric;
use crate::models::RetrievalResult;
use crate::rerank::{by_rank, Reranker};
use crate::store::ChunkStore;

/// Bundles all inputs for a single retrieval.
#[derive(Debug, Clone, Copy)]
pub struct RetrieveRequest<'a> {
    pub query: &'a str,
    pub metric: Metric,
    pub top_k: usize,
    /// Minimum normalized similarity, inclusive.
    pub threshold: Option<f64>,
}

impl<'a> RetrieveRequest<'a> {
    pub fn new(query: &'a str, metric: Metric, top_k: usize) -> Self {
        Self {
            query,
            metric,
            top_k,
            threshold: None,
        }
    }

    pub fn with_threshold(mut self, threshold: Option<f64>) -> Self {
        self.threshold = threshold;
        self
    }

    fn validate(&self) -> Result<()> {
        if self.top_k == 0 {
            return Err(RagError::invalid("top_k must be >= 1"));
        }
        if let Some(t) = self.threshold {
            if !t.is_finite() {
                return Err(RagError::invalid("threshold must be a finite number"));
            }
        }
        Ok(())
    }
}

pub struct Retriever<S> {
    index: Arc<VectorIndex<S>>,
    embedder: Arc<dyn EmbeddingProvider>,
    reranker: Option<Reranker>,
}

impl<S: ChunkStore> Retriever<S> {
    pub fn new(index: Arc<VectorIndex<S>>, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            index,
            embedder,
            reranker: None,
        }
    }

    pub fn with_reranker(mut self, reranker: Option<Reranker>) -> Self {
        self.reranker = reranker;
        self
    }

    pub fn index(&self) -> &Arc<VectorIndex<S>> {
        &self.index
    }

    pub fn reranker(&self) -> Option<&Reranker> {
        self.reranker.as_ref()
    }

    /// Run the retrieval pipeline for one query.
    ///
    /// Parameters are validated before the embedding call. The index is
    /// refreshed from its store first, so chunks appended by another process
    /// are searchable. A blank query or an empty index yields an empty
    /// result without contacting the provider.
    pub async fn retrieve(&self, req: &RetrieveRequest<'_>) -> Result<Vec<RetrievalResult>> {
        req.validate()?;
        self.index.refresh().await?;

        if req.query.trim().is_empty() || self.index.count() == 0 {
            return Ok(Vec::new());
        }

        let query_vec = self
            .embedder
            .embed(req.query, EmbedTask::Query)
            .await
            .map_err(|e| RagError::from_provider("embedding", e, RagError::EmbeddingFailed))?;

        let fetch = self
            .reranker
            .as_ref()
            .map_or(req.top_k, |r| r.candidate_count(req.top_k));
        let mut hits = self.index.search(&query_vec, req.metric, fetch)?;
        let candidates = hits.len();

        if let Some(reranker) = &self.reranker {
            hits = reranker
                .rerank(req.query, hits, reranker.output_size(req.top_k))
                .await?;
        }

        if let Some(threshold) = req.threshold {
            hits.retain(|h| h.score >= threshold);
        }

        hits.sort_by(by_rank);
        hits.truncate(req.top_k);

        debug!(
            metric = %req.metric,
            top_k = req.top_k,
            candidates,
            returned = hits.len(),
            "retrieval complete"
        );
        Ok(hits)
    }
}
