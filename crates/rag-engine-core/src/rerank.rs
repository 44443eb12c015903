//! Second-stage reranking over an over-fetched candidate pool.
//!
//! The first stage asks the index for `top_k × fanout` candidates using the
//! cheap index metric. A [`RelevanceScorer`] then rescores only those
//! candidates, so the extra cost grows with the candidate count, not with
//! the index size. The scorer is injected and may use a different (more
//! expensive) model than the one that built the index.
//!
//! Shipped scorers:
//! - [`EmbeddingScorer`] re-embeds query and candidates with its own provider
//!   and ranks by cosine similarity.
//! - [`KeywordScorer`] blends the first-stage score with query-term overlap.
//!   It needs no network access.

use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::Arc;

use anyhow::Result as AnyResult;
use async_trait::async_trait;
use tracing::debug;

use crate::embedding::{EmbedTask, EmbeddingProvider};
use crate::error::{RagError, Result};
use crate::metric::cosine_similarity;
use crate::models::RetrievalResult;

pub const DEFAULT_FANOUT: usize = 2;

/// Scores candidates against a query. Higher means more relevant.
#[async_trait]
pub trait RelevanceScorer: Send + Sync {
    fn name(&self) -> &str;

    /// Return exactly one score per candidate, in candidate order.
    async fn score(&self, query: &str, candidates: &[RetrievalResult]) -> AnyResult<Vec<f64>>;
}

#[derive(Clone)]
pub struct Reranker {
    scorer: Arc<dyn RelevanceScorer>,
    fanout: usize,
    top_k: Option<usize>,
}

impl Reranker {
    pub fn new(scorer: Arc<dyn RelevanceScorer>) -> Self {
        Self {
            scorer,
            fanout: DEFAULT_FANOUT,
            top_k: None,
        }
    }

    /// Candidate multiplier for the first stage. Values below 1 are raised to 1.
    pub fn with_fanout(mut self, fanout: usize) -> Self {
        self.fanout = fanout.max(1);
        self
    }

    /// Fixed output size. `None` keeps the caller's `top_k`.
    pub fn with_top_k(mut self, top_k: Option<usize>) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn scorer_name(&self) -> &str {
        self.scorer.name()
    }

    /// How many first-stage candidates to fetch for a request of `top_k`.
    pub fn candidate_count(&self, top_k: usize) -> usize {
        top_k.saturating_mul(self.fanout)
    }

    /// Output size for a request of `top_k`.
    pub fn output_size(&self, top_k: usize) -> usize {
        self.top_k.unwrap_or(top_k)
    }

    /// Rescore `candidates`, sort them by the new score, and keep at most
    /// `rerank_top_k`. Never adds a chunk that was not a candidate.
    ///
    /// Ties on the rerank score fall back to the first-stage score, then to
    /// ascending chunk id.
    pub async fn rerank(
        &self,
        query: &str,
        candidates: Vec<RetrievalResult>,
        rerank_top_k: usize,
    ) -> Result<Vec<RetrievalResult>> {
        if rerank_top_k == 0 {
            return Err(RagError::invalid("rerank top_k must be >= 1"));
        }
        if candidates.is_empty() {
            return Ok(candidates);
        }

        let scores = self
            .scorer
            .score(query, &candidates)
            .await
            .map_err(|e| RagError::from_provider("rerank", e, RagError::RerankFailed))?;

        if scores.len() != candidates.len() {
            return Err(RagError::RerankFailed(format!(
                "scorer '{}' returned {} scores for {} candidates",
                self.scorer.name(),
                scores.len(),
                candidates.len()
            )));
        }
        if scores.iter().any(|s| !s.is_finite()) {
            return Err(RagError::RerankFailed(format!(
                "scorer '{}' returned a non-finite score",
                self.scorer.name()
            )));
        }

        let pool = candidates.len();
        let mut reranked: Vec<RetrievalResult> = candidates
            .into_iter()
            .zip(scores)
            .map(|(mut c, s)| {
                c.rerank_score = Some(s);
                c
            })
            .collect();

        reranked.sort_by(|a, b| {
            b.rank_score()
                .total_cmp(&a.rank_score())
                .then(b.score.total_cmp(&a.score))
                .then(a.chunk_id.cmp(&b.chunk_id))
        });
        reranked.truncate(rerank_top_k);

        debug!(
            scorer = self.scorer.name(),
            pool,
            kept = reranked.len(),
            "reranked candidates"
        );
        Ok(reranked)
    }
}

// ============ Embedding scorer ============

/// Re-embeds the query and each candidate with a dedicated provider.
pub struct EmbeddingScorer {
    provider: Arc<dyn EmbeddingProvider>,
}

impl EmbeddingScorer {
    pub fn new(provider: Arc<dyn EmbeddingProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl RelevanceScorer for EmbeddingScorer {
    fn name(&self) -> &str {
        "embedding"
    }

    async fn score(&self, query: &str, candidates: &[RetrievalResult]) -> AnyResult<Vec<f64>> {
        let query_vec = self.provider.embed(query, EmbedTask::Query).await?;
        let mut scores = Vec::with_capacity(candidates.len());
        for c in candidates {
            let v = self.provider.embed(&c.content, EmbedTask::Document).await?;
            scores.push(cosine_similarity(&query_vec, &v));
        }
        Ok(scores)
    }
}

// ============ Keyword scorer ============

/// Lexical scorer: `w × first_stage + (1 − w) × term_overlap`.
///
/// `term_overlap` is the fraction of distinct query terms that appear in the
/// candidate's content (case-insensitive, alphanumeric tokens).
pub struct KeywordScorer {
    semantic_weight: f64,
}

impl KeywordScorer {
    pub fn new(semantic_weight: f64) -> Self {
        Self {
            semantic_weight: semantic_weight.clamp(0.0, 1.0),
        }
    }
}

impl Default for KeywordScorer {
    fn default() -> Self {
        Self::new(0.7)
    }
}

fn terms(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}

#[async_trait]
impl RelevanceScorer for KeywordScorer {
    fn name(&self) -> &str {
        "keyword"
    }

    async fn score(&self, query: &str, candidates: &[RetrievalResult]) -> AnyResult<Vec<f64>> {
        let query_terms = terms(query);
        Ok(candidates
            .iter()
            .map(|c| {
                let overlap = if query_terms.is_empty() {
                    0.0
                } else {
                    let content_terms = terms(&c.content);
                    let hits = query_terms
                        .iter()
                        .filter(|t| content_terms.contains(*t))
                        .count();
                    hits as f64 / query_terms.len() as f64
                };
                self.semantic_weight * c.score + (1.0 - self.semantic_weight) * overlap
            })
            .collect())
    }
}

/// Order hits by their current ranking score, best first.
pub(crate) fn by_rank(a: &RetrievalResult, b: &RetrievalResult) -> Ordering {
    b.rank_score()
        .total_cmp(&a.rank_score())
        .then(a.chunk_id.cmp(&b.chunk_id))
}
