//! SQLite-backed vector index.
//!
//! One `index.db` file per vector store directory: chunk text and metadata
//! in rows, embeddings as little-endian f32 blobs, exact cosine search.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};

use super::store::{ChunkSearchResult, IndexInfo, RagStore, StoredChunk};
use super::vector_math::rank_descending_by_cosine;
use crate::core::errors::ApiError;

pub const INDEX_FILE_NAME: &str = "index.db";

pub struct SqliteRagStore {
    pool: SqlitePool,
    db_path: PathBuf,
}

impl SqliteRagStore {
    /// Opens (creating if needed) a writable index under `dir`.
    pub async fn create(dir: &Path) -> Result<Self, ApiError> {
        std::fs::create_dir_all(dir).map_err(|e| {
            ApiError::Internal(format!("Failed to create {}: {}", dir.display(), e))
        })?;
        let db_path = dir.join(INDEX_FILE_NAME);

        let options = SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(true)
            .synchronous(SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(ApiError::internal)?;

        let store = Self { pool, db_path };
        store.init_schema().await?;
        Ok(store)
    }

    /// Opens an existing index without write access.
    pub async fn open_read_only(dir: &Path) -> Result<Self, ApiError> {
        let db_path = dir.join(INDEX_FILE_NAME);
        if !db_path.exists() {
            return Err(ApiError::NotFound(format!(
                "Vector index not found at {} (run the trainer first)",
                db_path.display()
            )));
        }

        let options = SqliteConnectOptions::new()
            .filename(&db_path)
            .read_only(true);

        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(ApiError::internal)?;

        Ok(Self { pool, db_path })
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    async fn init_schema(&self) -> Result<(), ApiError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS rag_chunks (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                chunk_id TEXT NOT NULL UNIQUE,
                content TEXT NOT NULL,
                source TEXT NOT NULL DEFAULT '',
                page INTEGER,
                chunk_index INTEGER NOT NULL DEFAULT 0,
                metadata TEXT DEFAULT '{}',
                embedding BLOB NOT NULL
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS rag_meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL DEFAULT (STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now'))
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        Ok(())
    }

    fn serialize_embedding(embedding: &[f32]) -> Vec<u8> {
        embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
    }

    fn deserialize_embedding(bytes: &[u8]) -> Vec<f32> {
        bytes
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect()
    }

    fn row_to_chunk(row: &sqlx::sqlite::SqliteRow) -> StoredChunk {
        let metadata_str: String = row.try_get("metadata").unwrap_or_default();
        let metadata = serde_json::from_str::<Value>(&metadata_str)
            .ok()
            .filter(|v| !v.as_object().is_some_and(|m| m.is_empty()));
        let page: Option<i64> = row.try_get("page").unwrap_or(None);
        let chunk_index: i64 = row.try_get("chunk_index").unwrap_or(0);

        StoredChunk {
            chunk_id: row.get("chunk_id"),
            content: row.get("content"),
            source: row.get("source"),
            page: page.and_then(|p| u32::try_from(p).ok()),
            chunk_index: usize::try_from(chunk_index).unwrap_or(0),
            metadata,
        }
    }

    async fn meta_value(&self, key: &str) -> Result<Option<String>, ApiError> {
        sqlx::query_scalar("SELECT value FROM rag_meta WHERE key = ?1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(ApiError::internal)
    }
}

#[async_trait]
impl RagStore for SqliteRagStore {
    async fn replace_all(
        &self,
        embedding_model: &str,
        dimension: usize,
        items: Vec<(StoredChunk, Vec<f32>)>,
    ) -> Result<(), ApiError> {
        let build_id = uuid::Uuid::new_v4().to_string();
        // dropped without commit on any error, which rolls everything back
        let mut tx = self.pool.begin().await.map_err(ApiError::internal)?;

        sqlx::query("DELETE FROM rag_chunks")
            .execute(&mut *tx)
            .await
            .map_err(ApiError::internal)?;

        for (key, value) in [
            ("embedding_model", embedding_model.to_string()),
            ("dimension", dimension.to_string()),
            ("build_id", build_id),
        ] {
            sqlx::query(
                "INSERT OR REPLACE INTO rag_meta (key, value, updated_at)
                 VALUES (?1, ?2, STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now'))",
            )
            .bind(key)
            .bind(value)
            .execute(&mut *tx)
            .await
            .map_err(ApiError::internal)?;
        }

        for (chunk, embedding) in &items {
            if embedding.len() != dimension {
                return Err(ApiError::BadRequest(format!(
                    "Chunk {} has {} dimensions, index expects {}",
                    chunk.chunk_id,
                    embedding.len(),
                    dimension
                )));
            }
            let blob = Self::serialize_embedding(embedding);
            let metadata_str = chunk
                .metadata
                .as_ref()
                .map(|m| serde_json::to_string(m).unwrap_or_default())
                .unwrap_or_else(|| "{}".to_string());

            sqlx::query(
                "INSERT OR REPLACE INTO rag_chunks
                    (chunk_id, content, source, page, chunk_index, metadata, embedding)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )
            .bind(&chunk.chunk_id)
            .bind(&chunk.content)
            .bind(&chunk.source)
            .bind(chunk.page.map(i64::from))
            .bind(chunk.chunk_index as i64)
            .bind(&metadata_str)
            .bind(&blob)
            .execute(&mut *tx)
            .await
            .map_err(ApiError::internal)?;
        }

        tx.commit().await.map_err(ApiError::internal)?;
        Ok(())
    }

    async fn search(
        &self,
        query_embedding: &[f32],
        limit: usize,
    ) -> Result<Vec<ChunkSearchResult>, ApiError> {
        let rows = sqlx::query(
            "SELECT chunk_id, content, source, page, chunk_index, metadata, embedding
             FROM rag_chunks
             ORDER BY seq ASC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        let mut chunks = Vec::with_capacity(rows.len());
        let mut embeddings = Vec::with_capacity(rows.len());
        for row in &rows {
            let embedding_bytes: Vec<u8> = row.get("embedding");
            embeddings.push(Self::deserialize_embedding(&embedding_bytes));
            chunks.push(Self::row_to_chunk(row));
        }

        // equal scores keep insertion order
        let ranked = rank_descending_by_cosine(query_embedding, &embeddings)?;
        Ok(ranked
            .into_iter()
            .take(limit)
            .map(|(idx, score)| ChunkSearchResult {
                chunk: chunks[idx].clone(),
                score,
            })
            .collect())
    }

    async fn count(&self) -> Result<usize, ApiError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM rag_chunks")
            .fetch_one(&self.pool)
            .await
            .map_err(ApiError::internal)?;

        Ok(count as usize)
    }

    async fn index_info(&self) -> Result<IndexInfo, ApiError> {
        let built_at: Option<String> =
            sqlx::query_scalar("SELECT updated_at FROM rag_meta WHERE key = 'build_id'")
                .fetch_optional(&self.pool)
                .await
                .map_err(ApiError::internal)?;

        Ok(IndexInfo {
            embedding_model: self.meta_value("embedding_model").await?,
            dimension: self
                .meta_value("dimension")
                .await?
                .and_then(|v| v.parse().ok()),
            chunk_count: self.count().await?,
            built_at,
            build_id: self.meta_value("build_id").await?,
        })
    }
}
