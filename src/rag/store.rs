//! RagStore trait: the abstract interface for the vector index.
//!
//! The trainer writes through it once; the bot only ever reads.
//! The implementation is `SqliteRagStore` in the `sqlite` module.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::errors::ApiError;

/// A stored RAG chunk with metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredChunk {
    /// Unique chunk identifier.
    pub chunk_id: String,
    /// The text content of the chunk.
    pub content: String,
    /// Source file path.
    pub source: String,
    /// Zero-based page within the source, if paginated.
    pub page: Option<u32>,
    /// Position of the chunk within its page.
    pub chunk_index: usize,
    /// Optional metadata (JSON).
    pub metadata: Option<serde_json::Value>,
}

/// Result of a similarity search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkSearchResult {
    pub chunk: StoredChunk,
    /// Cosine similarity (higher = better).
    pub score: f32,
}

/// What the trainer recorded about the index it built.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexInfo {
    pub embedding_model: Option<String>,
    pub dimension: Option<usize>,
    pub chunk_count: usize,
    pub built_at: Option<String>,
    pub build_id: Option<String>,
}

#[async_trait]
pub trait RagStore: Send + Sync {
    /// Replace the whole index with `items`, stamped with a new embedding
    /// model and build id, in one transaction.
    ///
    /// Vectors from different embedding models are not comparable, so a
    /// rebuild never keeps old chunks. On error the previous index is left
    /// as it was.
    async fn replace_all(
        &self,
        embedding_model: &str,
        dimension: usize,
        items: Vec<(StoredChunk, Vec<f32>)>,
    ) -> Result<(), ApiError>;

    /// Top `limit` chunks by cosine similarity to `query_embedding`, best first.
    async fn search(
        &self,
        query_embedding: &[f32],
        limit: usize,
    ) -> Result<Vec<ChunkSearchResult>, ApiError>;

    async fn count(&self) -> Result<usize, ApiError>;

    async fn index_info(&self) -> Result<IndexInfo, ApiError>;
}
