//! Append-only vector index with brute-force similarity search.
//!
//! The index keeps three parallel columns (vectors, contents, provenance)
//! whose position doubles as the chunk id. Every record is written to the
//! backing [`ChunkStore`] before it becomes visible to readers, so a search
//! never observes a chunk that would be lost on restart.
//!
//! # Concurrency
//!
//! - Writers serialize on an async mutex that covers id assignment and the
//!   store append. This keeps ids unique and equal to insertion order.
//! - The columns sit behind an `RwLock`. A new chunk is published by a
//!   single write-locked push to all three columns, so readers see either
//!   the whole record or none of it.
//! - Concurrent searches only take the read lock.
//!
//! # Other writers
//!
//! Another process may append to the same store (the CLI `add` command
//! while a server is running). [`VectorIndex::refresh`] pulls in records
//! past the local length, and [`VectorIndex::add`] does the same before it
//! assigns an id, so ids stay dense across processes.

use std::borrow::Cow;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use futures::lock::Mutex;
use serde::Serialize;
use tracing::{debug, info};

use crate::error::{RagError, Result};
use crate::metric::{self, Metric};
use crate::models::{Metadata, NewChunk, RetrievalResult, StoredChunk};
use crate::store::ChunkStore;

/// Construction options for a [`VectorIndex`].
#[derive(Debug, Clone, Copy)]
pub struct IndexOptions {
    /// Pin the vector dimension up front. When `None`, the first insert
    /// fixes it.
    pub dims: Option<usize>,
    /// Store and query unit-length vectors.
    pub normalize: bool,
}

impl Default for IndexOptions {
    fn default() -> Self {
        Self {
            dims: None,
            normalize: true,
        }
    }
}

/// Summary returned by [`VectorIndex::info`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexInfo {
    pub total_chunks: usize,
    pub dims: Option<usize>,
    pub normalize: bool,
}

struct Provenance {
    metadata: Metadata,
    document_id: String,
    chunk_index: i64,
}

#[derive(Default)]
struct Columns {
    dims: Option<usize>,
    vectors: Vec<Vec<f32>>,
    contents: Vec<String>,
    provenance: Vec<Provenance>,
}

impl Columns {
    fn len(&self) -> usize {
        self.vectors.len()
    }

    /// Check that `records` continue this column set: ids follow on from
    /// `len()` with no gaps, and every vector has the fixed dimension.
    fn check_tail(&self, records: &[StoredChunk]) -> Result<()> {
        let mut dims = self.dims;
        for (offset, record) in records.iter().enumerate() {
            let expected_id = (self.len() + offset) as u64;
            if record.id != expected_id {
                return Err(RagError::Storage(format!(
                    "stored chunk ids are not contiguous: expected {}, found {}",
                    expected_id, record.id
                )));
            }
            let expected = *dims.get_or_insert(record.embedding.len());
            if record.embedding.len() != expected {
                return Err(RagError::DimensionMismatch {
                    expected,
                    actual: record.embedding.len(),
                });
            }
        }
        Ok(())
    }

    fn push(&mut self, record: StoredChunk) {
        self.dims.get_or_insert(record.embedding.len());
        self.vectors.push(record.embedding);
        self.contents.push(record.content);
        self.provenance.push(Provenance {
            metadata: record.metadata,
            document_id: record.document_id,
            chunk_index: record.chunk_index,
        });
    }
}

pub struct VectorIndex<S> {
    store: S,
    normalize: bool,
    columns: RwLock<Columns>,
    writer: Mutex<()>,
}

impl<S: ChunkStore> VectorIndex<S> {
    /// Open an index over `store`, replaying every persisted record.
    ///
    /// Fails with [`RagError::Storage`] if the stored ids are not the
    /// contiguous sequence `0..N`, and with [`RagError::DimensionMismatch`]
    /// if stored vectors disagree with each other or with `options.dims`.
    pub async fn open(store: S, options: IndexOptions) -> Result<Self> {
        let records = store.load().await.map_err(RagError::storage)?;

        let mut columns = Columns {
            dims: options.dims,
            ..Columns::default()
        };
        columns.check_tail(&records)?;
        for record in records {
            columns.push(record);
        }

        info!(
            chunks = columns.len(),
            dims = ?columns.dims,
            normalize = options.normalize,
            "vector index opened"
        );

        Ok(Self {
            store,
            normalize: options.normalize,
            columns: RwLock::new(columns),
            writer: Mutex::new(()),
        })
    }

    /// Number of stored chunks.
    pub fn count(&self) -> usize {
        self.read().map(|c| c.len()).unwrap_or(0)
    }

    /// The fixed vector dimension, once known.
    pub fn dims(&self) -> Option<usize> {
        self.read().ok().and_then(|c| c.dims)
    }

    pub fn info(&self) -> IndexInfo {
        IndexInfo {
            total_chunks: self.count(),
            dims: self.dims(),
            normalize: self.normalize,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Load records another writer appended to the store since this index
    /// last looked, and return how many were added.
    pub async fn refresh(&self) -> Result<usize> {
        let _writer = self.writer.lock().await;
        self.catch_up().await
    }

    /// Must be called with the writer lock held.
    async fn catch_up(&self) -> Result<usize> {
        let next = self.read()?.len() as u64;
        let records = self
            .store
            .load_since(next)
            .await
            .map_err(RagError::storage)?;
        if records.is_empty() {
            return Ok(0);
        }

        let added = records.len();
        let mut columns = self.write()?;
        columns.check_tail(&records)?;
        for record in records {
            columns.push(record);
        }
        info!(added, total = columns.len(), "picked up chunks from another writer");
        Ok(added)
    }

    /// Append a chunk and return its id.
    ///
    /// The record is persisted before it is published to readers. A failed
    /// append leaves the index unchanged and does not consume an id. Records
    /// appended to the store by another writer are loaded first, so the new
    /// id follows theirs.
    pub async fn add(&self, chunk: NewChunk) -> Result<u64> {
        if chunk.content.trim().is_empty() {
            return Err(RagError::invalid("content must not be empty"));
        }
        check_vector(&chunk.embedding)?;

        let _writer = self.writer.lock().await;
        self.catch_up().await?;

        let (id, dims) = {
            let columns = self.read()?;
            (columns.len() as u64, columns.dims)
        };
        if let Some(expected) = dims {
            if chunk.embedding.len() != expected {
                return Err(RagError::DimensionMismatch {
                    expected,
                    actual: chunk.embedding.len(),
                });
            }
        }

        let embedding = if self.normalize {
            metric::normalize(&chunk.embedding)
        } else {
            chunk.embedding
        };
        let record = StoredChunk {
            id,
            content: chunk.content,
            embedding,
            metadata: chunk.metadata,
            document_id: chunk.document_id,
            chunk_index: chunk.chunk_index,
        };

        self.store
            .append(&record)
            .await
            .map_err(RagError::storage)?;

        self.write()?.push(record);
        debug!(chunk_id = id, "chunk appended");

        Ok(id)
    }

    /// Score every stored chunk against `query` and return the best `k`.
    ///
    /// Results are ordered by descending normalized similarity, ties broken
    /// by ascending chunk id. An empty index yields an empty result. A `k`
    /// larger than the index returns everything.
    pub fn search(&self, query: &[f32], metric: Metric, k: usize) -> Result<Vec<RetrievalResult>> {
        if k == 0 {
            return Err(RagError::invalid("top_k must be >= 1"));
        }
        check_vector(query)?;

        let columns = self.read()?;
        if columns.len() == 0 {
            return Ok(Vec::new());
        }
        if let Some(expected) = columns.dims {
            if query.len() != expected {
                return Err(RagError::DimensionMismatch {
                    expected,
                    actual: query.len(),
                });
            }
        }

        let query: Cow<'_, [f32]> = if self.normalize {
            Cow::Owned(metric::normalize(query))
        } else {
            Cow::Borrowed(query)
        };

        let mut scored: Vec<(usize, f64)> = columns
            .vectors
            .iter()
            .enumerate()
            .map(|(position, v)| (position, metric.similarity(&query, v)))
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(position, score)| {
                let prov = &columns.provenance[position];
                RetrievalResult {
                    chunk_id: position as u64,
                    content: columns.contents[position].clone(),
                    metadata: prov.metadata.clone(),
                    document_id: prov.document_id.clone(),
                    chunk_index: prov.chunk_index,
                    score,
                    rerank_score: None,
                }
            })
            .collect())
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Columns>> {
        self.columns
            .read()
            .map_err(|_| RagError::Storage("index lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Columns>> {
        self.columns
            .write()
            .map_err(|_| RagError::Storage("index lock poisoned".to_string()))
    }
}

fn check_vector(v: &[f32]) -> Result<()> {
    if v.is_empty() {
        return Err(RagError::invalid("embedding must not be empty"));
    }
    if v.iter().any(|x| !x.is_finite()) {
        return Err(RagError::invalid("embedding contains non-finite values"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::InMemoryChunkStore;
    use std::sync::Arc;

    fn chunk(content: &str, embedding: Vec<f32>) -> NewChunk {
        NewChunk {
            content: content.to_string(),
            embedding,
            metadata: Metadata::new(),
            document_id: "doc".to_string(),
            chunk_index: 0,
        }
    }

    async fn open(options: IndexOptions) -> VectorIndex<InMemoryChunkStore> {
        VectorIndex::open(InMemoryChunkStore::new(), options)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_ids_are_sequential_from_zero() {
        let index = open(IndexOptions::default()).await;
        assert_eq!(index.add(chunk("a", vec![1.0, 0.0])).await.unwrap(), 0);
        assert_eq!(index.add(chunk("b", vec![0.0, 1.0])).await.unwrap(), 1);
        assert_eq!(index.count(), 2);
        assert_eq!(index.store().len(), 2);
    }

    #[tokio::test]
    async fn test_first_insert_fixes_dims() {
        let index = open(IndexOptions::default()).await;
        index.add(chunk("a", vec![1.0, 0.0, 0.0])).await.unwrap();
        let err = index.add(chunk("b", vec![1.0, 0.0])).await.unwrap_err();
        assert!(matches!(
            err,
            RagError::DimensionMismatch {
                expected: 3,
                actual: 2
            }
        ));
        assert_eq!(index.count(), 1);
        // The failed insert must not consume an id.
        assert_eq!(index.add(chunk("c", vec![0.0, 1.0, 0.0])).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_pinned_dims_reject_first_insert() {
        let index = open(IndexOptions {
            dims: Some(4),
            normalize: true,
        })
        .await;
        assert!(matches!(
            index.add(chunk("a", vec![1.0, 0.0])).await,
            Err(RagError::DimensionMismatch { .. })
        ));
        assert_eq!(index.info().dims, Some(4));
    }

    #[tokio::test]
    async fn test_rejects_empty_content_and_bad_vectors() {
        let index = open(IndexOptions::default()).await;
        assert!(matches!(
            index.add(chunk("  ", vec![1.0])).await,
            Err(RagError::InvalidParameter(_))
        ));
        assert!(matches!(
            index.add(chunk("x", vec![])).await,
            Err(RagError::InvalidParameter(_))
        ));
        assert!(matches!(
            index.add(chunk("x", vec![f32::NAN, 1.0])).await,
            Err(RagError::InvalidParameter(_))
        ));
        assert_eq!(index.count(), 0);
    }

    #[tokio::test]
    async fn test_empty_index_returns_no_results() {
        let index = open(IndexOptions::default()).await;
        assert!(index.search(&[1.0, 0.0], Metric::Cosine, 3).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_zero_k_is_invalid() {
        let index = open(IndexOptions::default()).await;
        index.add(chunk("a", vec![1.0, 0.0])).await.unwrap();
        assert!(matches!(
            index.search(&[1.0, 0.0], Metric::Cosine, 0),
            Err(RagError::InvalidParameter(_))
        ));
    }

    #[tokio::test]
    async fn test_query_dimension_checked() {
        let index = open(IndexOptions::default()).await;
        index.add(chunk("a", vec![1.0, 0.0])).await.unwrap();
        assert!(matches!(
            index.search(&[1.0, 0.0, 0.0], Metric::L2, 1),
            Err(RagError::DimensionMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn test_search_orders_and_breaks_ties_by_id() {
        let index = open(IndexOptions::default()).await;
        index.add(chunk("far", vec![0.0, 1.0])).await.unwrap();
        index.add(chunk("twin-a", vec![1.0, 0.0])).await.unwrap();
        index.add(chunk("mid", vec![1.0, 1.0])).await.unwrap();
        index.add(chunk("twin-b", vec![2.0, 0.0])).await.unwrap();

        let results = index.search(&[1.0, 0.0], Metric::Cosine, 10).unwrap();
        let ids: Vec<u64> = results.iter().map(|r| r.chunk_id).collect();
        assert_eq!(ids, vec![1, 3, 2, 0]);
        assert_eq!(results[0].content, "twin-a");

        // Repeated calls give the same ordering.
        for _ in 0..5 {
            let again: Vec<u64> = index
                .search(&[1.0, 0.0], Metric::Cosine, 10)
                .unwrap()
                .iter()
                .map(|r| r.chunk_id)
                .collect();
            assert_eq!(again, ids);
        }
    }

    #[tokio::test]
    async fn test_k_larger_than_count_returns_all() {
        let index = open(IndexOptions::default()).await;
        index.add(chunk("a", vec![1.0, 0.0])).await.unwrap();
        index.add(chunk("b", vec![0.0, 1.0])).await.unwrap();
        assert_eq!(index.search(&[1.0, 0.0], Metric::L2, 100).unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_metrics_agree_on_normalized_index() {
        let index = open(IndexOptions::default()).await;
        let vectors = [
            vec![0.9, 0.1, 0.0],
            vec![0.2, 0.9, 0.1],
            vec![0.5, 0.5, 0.5],
            vec![-0.3, 0.2, 0.9],
        ];
        for (i, v) in vectors.iter().enumerate() {
            index.add(chunk(&format!("c{i}"), v.clone())).await.unwrap();
        }
        let query = [1.0, 0.3, 0.1];
        let cosine = index.search(&query, Metric::Cosine, 4).unwrap();
        let cosine_order: Vec<u64> = cosine.iter().map(|r| r.chunk_id).collect();

        for m in [Metric::L2, Metric::InnerProduct] {
            let results = index.search(&query, m, 4).unwrap();
            let order: Vec<u64> = results.iter().map(|r| r.chunk_id).collect();
            assert_eq!(order, cosine_order, "metric {m} disagrees with cosine");
            for pair in results.windows(2) {
                assert!(pair[0].score > pair[1].score);
            }
        }
    }

    #[tokio::test]
    async fn test_raw_index_keeps_metric_geometry() {
        let index = open(IndexOptions {
            dims: None,
            normalize: false,
        })
        .await;
        index.add(chunk("aligned", vec![1.0, 0.0])).await.unwrap();
        index.add(chunk("long", vec![5.0, 5.0])).await.unwrap();

        let cosine = index.search(&[1.0, 0.0], Metric::Cosine, 1).unwrap();
        assert_eq!(cosine[0].chunk_id, 0);
        let ip = index.search(&[1.0, 0.0], Metric::InnerProduct, 1).unwrap();
        assert_eq!(ip[0].chunk_id, 1);
        assert!((ip[0].score - 5.0).abs() < 1e-9);
        let l2 = index.search(&[1.0, 0.0], Metric::L2, 2).unwrap();
        assert_eq!(l2[0].chunk_id, 0);
        assert!((l2[0].score - 1.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_reopen_replays_store() {
        let store = InMemoryChunkStore::new();
        {
            let index = VectorIndex::open(store.clone(), IndexOptions::default())
                .await
                .unwrap();
            index.add(chunk("persisted", vec![0.0, 2.0])).await.unwrap();
        }
        let reopened = VectorIndex::open(store, IndexOptions::default())
            .await
            .unwrap();
        assert_eq!(reopened.count(), 1);
        assert_eq!(reopened.dims(), Some(2));
        let hit = &reopened.search(&[0.0, 1.0], Metric::Cosine, 1).unwrap()[0];
        assert_eq!(hit.content, "persisted");
        assert_eq!(reopened.add(chunk("next", vec![1.0, 0.0])).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_two_indexes_on_one_store_stay_in_step() {
        let store = InMemoryChunkStore::new();
        let first = VectorIndex::open(store.clone(), IndexOptions::default())
            .await
            .unwrap();
        let second = VectorIndex::open(store.clone(), IndexOptions::default())
            .await
            .unwrap();

        assert_eq!(first.add(chunk("from first", vec![1.0, 0.0])).await.unwrap(), 0);
        assert_eq!(second.count(), 0);

        assert_eq!(second.refresh().await.unwrap(), 1);
        let hit = &second.search(&[1.0, 0.0], Metric::Cosine, 1).unwrap()[0];
        assert_eq!(hit.content, "from first");

        // Each add picks up the other writer's records before taking an id.
        assert_eq!(second.add(chunk("from second", vec![0.0, 1.0])).await.unwrap(), 1);
        assert_eq!(first.add(chunk("first again", vec![1.0, 1.0])).await.unwrap(), 2);
        assert_eq!(first.count(), 3);
        assert_eq!(store.len(), 3);
        assert_eq!(second.refresh().await.unwrap(), 1);
        assert_eq!(second.refresh().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_refresh_rejects_foreign_dimension() {
        let store = InMemoryChunkStore::new();
        let index = VectorIndex::open(store.clone(), IndexOptions::default())
            .await
            .unwrap();
        index.add(chunk("a", vec![1.0, 0.0])).await.unwrap();
        store
            .append(&StoredChunk {
                id: 1,
                content: "wide".to_string(),
                embedding: vec![1.0, 0.0, 0.0],
                metadata: Metadata::new(),
                document_id: "d".to_string(),
                chunk_index: 0,
            })
            .await
            .unwrap();

        assert!(matches!(
            index.refresh().await,
            Err(RagError::DimensionMismatch {
                expected: 2,
                actual: 3
            })
        ));
        assert_eq!(index.count(), 1);
    }

    #[tokio::test]
    async fn test_open_rejects_gapped_ids() {
        let store = InMemoryChunkStore::new();
        store
            .append(&StoredChunk {
                id: 3,
                content: "orphan".to_string(),
                embedding: vec![1.0],
                metadata: Metadata::new(),
                document_id: "d".to_string(),
                chunk_index: 0,
            })
            .await
            .unwrap();
        assert!(matches!(
            VectorIndex::open(store, IndexOptions::default()).await,
            Err(RagError::Storage(_))
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_adds_get_unique_ids() {
        let index = Arc::new(open(IndexOptions::default()).await);
        let n = 64;
        let handles: Vec<_> = (0..n)
            .map(|i| {
                let index = Arc::clone(&index);
                tokio::spawn(async move {
                    index
                        .add(chunk(&format!("chunk {i}"), vec![i as f32 + 1.0, 1.0]))
                        .await
                        .unwrap()
                })
            })
            .collect();

        let mut ids = Vec::new();
        for h in handles {
            ids.push(h.await.unwrap());
        }
        ids.sort_unstable();
        assert_eq!(ids, (0..n as u64).collect::<Vec<_>>());
        assert_eq!(index.count(), n);

        // Each id maps back to the content its writer supplied.
        let stored = index.store().load().await.unwrap();
        let mut contents: Vec<String> = stored.into_iter().map(|c| c.content).collect();
        contents.sort();
        contents.dedup();
        assert_eq!(contents.len(), n);
    }
}
