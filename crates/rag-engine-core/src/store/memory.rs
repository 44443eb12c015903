//! In-memory [`ChunkStore`] for tests and ephemeral indexes.
//!
//! Uses a `Vec` behind `std::sync::RwLock`. Nothing survives the process,
//! but a store can be shared (via `Arc`) between two index instances to
//! simulate a reopen.

use std::sync::{Arc, RwLock};

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::models::StoredChunk;

use super::ChunkStore;

#[derive(Default, Clone)]
pub struct InMemoryChunkStore {
    records: Arc<RwLock<Vec<StoredChunk>>>,
}

impl InMemoryChunkStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.read().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ChunkStore for InMemoryChunkStore {
    async fn load(&self) -> Result<Vec<StoredChunk>> {
        let records = self
            .records
            .read()
            .map_err(|_| anyhow!("in-memory store lock poisoned"))?;
        Ok(records.clone())
    }

    async fn append(&self, chunk: &StoredChunk) -> Result<()> {
        let mut records = self
            .records
            .write()
            .map_err(|_| anyhow!("in-memory store lock poisoned"))?;
        records.push(chunk.clone());
        Ok(())
    }
}
