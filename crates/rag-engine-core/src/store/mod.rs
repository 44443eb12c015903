//! Durable storage abstraction for the vector index.
//!
//! The [`ChunkStore`] trait is the only thing the [`VectorIndex`](crate::index::VectorIndex)
//! needs from a backend: replay everything on open, pick up records other
//! writers appended since, and append one record at a time. Backends are
//! append-only; there is no update or delete.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::StoredChunk;

/// Append-only persistence for index records.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`load`](ChunkStore::load) | Replay all stored records in id order |
/// | [`load_since`](ChunkStore::load_since) | Records with id `>= first_id`, in id order |
/// | [`append`](ChunkStore::append) | Durably write one new record |
#[async_trait]
pub trait ChunkStore: Send + Sync {
    /// Return every stored record, ordered by ascending id.
    async fn load(&self) -> Result<Vec<StoredChunk>>;

    /// Return the records whose id is at least `first_id`, ordered by
    /// ascending id.
    ///
    /// The default filters [`load`](ChunkStore::load); backends that can
    /// seek should override it.
    async fn load_since(&self, first_id: u64) -> Result<Vec<StoredChunk>> {
        let mut records = self.load().await?;
        records.retain(|r| r.id >= first_id);
        Ok(records)
    }

    /// Persist a record. Must not return `Ok` until the record would survive
    /// a process restart.
    async fn append(&self, chunk: &StoredChunk) -> Result<()>;
}
