//! RAG (Retrieval-Augmented Generation) module.
//!
//! This module provides:
//! - `FixedSizeSplitter` / `SemanticChunker`: turn documents into chunks
//! - `RagStore` / `SqliteRagStore`: the persisted vector index
//! - `RAGContextBuilder`: assembles retrieved chunks into prompt context

pub mod chunker;
pub mod context_builder;
pub mod semantic;
pub mod sqlite;
pub mod store;
pub mod vector_math;

pub use chunker::{Document, FixedSizeSplitter, TextChunk};
pub use context_builder::{ContextBuilderConfig, RAGContextBuilder, SourceRef};
pub use semantic::{BreakpointThresholdType, SemanticChunker};
pub use sqlite::SqliteRagStore;
pub use store::{ChunkSearchResult, IndexInfo, RagStore, StoredChunk};
