//! SQLite-backed [`ChunkStore`].
//!
//! Each chunk is one row in the `chunks` table; the embedding is stored as a
//! little-endian `f32` BLOB. The table is append-only: the index inserts
//! exactly once per id and never updates or deletes.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use rag_engine_core::embedding::{blob_to_vec, vec_to_blob};
use rag_engine_core::models::{Metadata, StoredChunk};
use rag_engine_core::store::ChunkStore;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

#[derive(Clone)]
pub struct SqliteChunkStore {
    pool: SqlitePool,
}

impl SqliteChunkStore {
    /// Wrap a pool whose schema has already been created with
    /// [`migrate::apply`](crate::migrate::apply).
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

const SELECT_CHUNKS: &str =
    "SELECT id, content, embedding, dims, metadata_json, document_id, chunk_index FROM chunks";

fn decode_rows(rows: Vec<SqliteRow>) -> Result<Vec<StoredChunk>> {
    let mut chunks = Vec::with_capacity(rows.len());
    for row in rows {
        let id: i64 = row.get("id");
        let blob: Vec<u8> = row.get("embedding");
        let dims: i64 = row.get("dims");
        let metadata_json: String = row.get("metadata_json");

        let embedding = blob_to_vec(&blob);
        if embedding.len() as i64 != dims {
            bail!(
                "chunk {} has a {}-byte embedding but declares {} dims",
                id,
                blob.len(),
                dims
            );
        }
        let metadata: Metadata = serde_json::from_str(&metadata_json)
            .with_context(|| format!("chunk {} has invalid metadata_json", id))?;

        chunks.push(StoredChunk {
            id: u64::try_from(id).with_context(|| format!("negative chunk id {}", id))?,
            content: row.get("content"),
            embedding,
            metadata,
            document_id: row.get("document_id"),
            chunk_index: row.get("chunk_index"),
        });
    }
    Ok(chunks)
}

#[async_trait]
impl ChunkStore for SqliteChunkStore {
    async fn load(&self) -> Result<Vec<StoredChunk>> {
        let rows = sqlx::query(&format!("{} ORDER BY id ASC", SELECT_CHUNKS))
            .fetch_all(&self.pool)
            .await?;
        decode_rows(rows)
    }

    async fn load_since(&self, first_id: u64) -> Result<Vec<StoredChunk>> {
        let first_id = i64::try_from(first_id).context("chunk id out of range")?;
        let rows = sqlx::query(&format!("{} WHERE id >= ? ORDER BY id ASC", SELECT_CHUNKS))
            .bind(first_id)
            .fetch_all(&self.pool)
            .await?;
        decode_rows(rows)
    }

    async fn append(&self, chunk: &StoredChunk) -> Result<()> {
        let id = i64::try_from(chunk.id).context("chunk id out of range")?;
        let metadata_json = serde_json::to_string(&chunk.metadata)?;
        let now = chrono::Utc::now().timestamp();

        sqlx::query(
            r#"
            INSERT INTO chunks (id, content, embedding, dims, metadata_json, document_id, chunk_index, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(id)
        .bind(&chunk.content)
        .bind(vec_to_blob(&chunk.embedding))
        .bind(chunk.embedding.len() as i64)
        .bind(&metadata_json)
        .bind(&chunk.document_id)
        .bind(chunk.chunk_index)
        .bind(now)
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed to persist chunk {}", chunk.id))?;

        Ok(())
    }
}
