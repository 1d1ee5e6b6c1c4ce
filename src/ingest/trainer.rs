//! Offline index build: PDFs → chunks → embeddings → `index.db`.

use std::path::PathBuf;
use std::sync::Arc;

use futures_util::stream::{self, StreamExt, TryStreamExt};
use serde::Serialize;
use sha2::{Digest, Sha256};

use super::pdf;
use crate::core::config::{SplitterKind, TrainerSettings};
use crate::core::errors::ApiError;
use crate::llm::LlmProvider;
use crate::rag::{
    Document, FixedSizeSplitter, RagStore, SemanticChunker, SqliteRagStore, StoredChunk,
    TextChunk,
};

#[derive(Debug, Clone, Serialize)]
pub struct TrainingReport {
    pub files: usize,
    pub pages: usize,
    pub chunks: usize,
    pub dimension: usize,
    pub embedding_model: String,
    pub index_path: PathBuf,
}

pub struct Trainer {
    embedder: Arc<dyn LlmProvider>,
    embedding_model: String,
    settings: TrainerSettings,
    sources_dir: PathBuf,
    index_dir: PathBuf,
}

impl Trainer {
    pub fn new(
        embedder: Arc<dyn LlmProvider>,
        embedding_model: impl Into<String>,
        settings: TrainerSettings,
        sources_dir: PathBuf,
        index_dir: PathBuf,
    ) -> Self {
        Self {
            embedder,
            embedding_model: embedding_model.into(),
            settings,
            sources_dir,
            index_dir,
        }
    }

    pub async fn run(&self) -> Result<TrainingReport, ApiError> {
        let files = pdf::list_pdf_files(&self.sources_dir)?;
        if files.is_empty() {
            return Err(ApiError::BadRequest(format!(
                "No PDF documents found in {}",
                self.sources_dir.display()
            )));
        }
        tracing::info!("Loading {} PDF files from {}", files.len(), self.sources_dir.display());

        let documents = pdf::load_pdf_files(&files).await?;
        let mut report = self.train_documents(documents).await?;
        report.files = files.len();
        Ok(report)
    }

    /// Builds the index from already-loaded documents.
    pub async fn train_documents(
        &self,
        documents: Vec<Document>,
    ) -> Result<TrainingReport, ApiError> {
        let pages = documents.len();
        let chunks = self.split(&documents).await?;
        if chunks.is_empty() {
            return Err(ApiError::BadRequest(
                "No text could be extracted from the source documents".to_string(),
            ));
        }
        tracing::info!(
            "Created {} chunks using the {:?} splitter",
            chunks.len(),
            self.settings.splitter
        );

        let embeddings = self.embed_chunks(&chunks).await?;
        let dimension = uniform_dimension(&embeddings)?;

        tracing::info!("Writing vector index to {}", self.index_dir.display());
        let store = SqliteRagStore::create(&self.index_dir).await?;
        let items: Vec<(StoredChunk, Vec<f32>)> = chunks
            .iter()
            .map(to_stored_chunk)
            .zip(embeddings)
            .collect();
        store
            .replace_all(&self.embedding_model, dimension, items)
            .await?;

        let chunk_count = store.count().await?;
        tracing::info!("Vector index build completed ({} chunks)", chunk_count);

        Ok(TrainingReport {
            files: distinct_sources(&documents),
            pages,
            chunks: chunk_count,
            dimension,
            embedding_model: self.embedding_model.clone(),
            index_path: store.db_path().to_path_buf(),
        })
    }

    async fn split(&self, documents: &[Document]) -> Result<Vec<TextChunk>, ApiError> {
        match self.settings.splitter {
            SplitterKind::Fixed => Ok(FixedSizeSplitter::new(
                self.settings.chunk_size,
                self.settings.chunk_overlap,
            )
            .split_documents(documents)),
            SplitterKind::Semantic => {
                let min_chunk_size = Some(self.settings.min_chunk_size).filter(|n| *n > 0);
                SemanticChunker::new(self.embedding_model.clone())
                    .with_threshold(
                        self.settings.breakpoint_threshold_type,
                        self.settings.threshold_amount(),
                    )
                    .with_min_chunk_size(min_chunk_size)
                    .split_documents(documents, self.embedder.as_ref())
                    .await
            }
        }
    }

    async fn embed_chunks(&self, chunks: &[TextChunk]) -> Result<Vec<Vec<f32>>, ApiError> {
        let batch_size = self.settings.embed_batch_size.max(1);
        let batches: Vec<Vec<String>> = chunks
            .chunks(batch_size)
            .map(|batch| batch.iter().map(|c| c.text.clone()).collect())
            .collect();
        let total = batches.len();

        let embedder = self.embedder.clone();
        let model = self.embedding_model.clone();
        let results: Vec<Vec<Vec<f32>>> = stream::iter(batches.into_iter().enumerate())
            .map(move |(idx, batch)| {
                let embedder = embedder.clone();
                let model = model.clone();
                async move {
                    tracing::debug!("Embedding batch {}/{}", idx + 1, total);
                    let vectors = embedder.embed(&batch, &model).await?;
                    if vectors.len() != batch.len() {
                        return Err(ApiError::Upstream(format!(
                            "embedding returned {} vectors for {} chunks",
                            vectors.len(),
                            batch.len()
                        )));
                    }
                    Ok::<_, ApiError>(vectors)
                }
            })
            .buffered(self.settings.embed_concurrency.max(1))
            .try_collect()
            .await?;

        Ok(results.into_iter().flatten().collect())
    }
}

/// Stable id for a chunk: SHA-256 of `source|page|chunk_index`.
pub fn chunk_id(chunk: &TextChunk) -> String {
    let page = chunk.page.map(|p| p.to_string()).unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(format!("{}|{}|{}", chunk.source, page, chunk.chunk_index).as_bytes());
    hex::encode(hasher.finalize())
}

fn to_stored_chunk(chunk: &TextChunk) -> StoredChunk {
    StoredChunk {
        chunk_id: chunk_id(chunk),
        content: chunk.text.clone(),
        source: chunk.source.clone(),
        page: chunk.page,
        chunk_index: chunk.chunk_index,
        metadata: Some(serde_json::json!({ "start_offset": chunk.start_offset })),
    }
}

fn uniform_dimension(embeddings: &[Vec<f32>]) -> Result<usize, ApiError> {
    let dimension = embeddings.first().map(Vec::len).unwrap_or(0);
    if dimension == 0 {
        return Err(ApiError::Upstream("embedding model returned empty vectors".to_string()));
    }
    if let Some(bad) = embeddings.iter().find(|v| v.len() != dimension) {
        return Err(ApiError::Upstream(format!(
            "embedding dimensions disagree: {} vs {}",
            dimension,
            bad.len()
        )));
    }
    Ok(dimension)
}

fn distinct_sources(documents: &[Document]) -> usize {
    let mut sources: Vec<&str> = documents.iter().map(|d| d.source.as_str()).collect();
    sources.sort_unstable();
    sources.dedup();
    sources.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::mock::MockProvider;
    use crate::rag::BreakpointThresholdType;

    const VOCAB: &[&str] = &["engine", "oil", "warranty", "refund"];

    fn trainer_with(
        provider: Arc<MockProvider>,
        settings: TrainerSettings,
        index_dir: PathBuf,
    ) -> Trainer {
        Trainer::new(provider, "mock-embed", settings, PathBuf::from("unused"), index_dir)
    }

    fn manual() -> Vec<Document> {
        vec![
            Document::new(
                "Check the engine oil. Engine oil must be changed. \
                 Oil level matters for the engine. Warranty covers refund. \
                 A refund needs the warranty card. Warranty refund takes days.",
                "manual.pdf",
                Some(0),
            ),
            Document::new("Refund policy applies.", "policy.pdf", Some(0)),
        ]
    }

    #[tokio::test]
    async fn semantic_training_builds_a_searchable_index() {
        let tmp = tempfile::tempdir().unwrap();
        let provider = Arc::new(MockProvider::new(VOCAB));
        let settings = TrainerSettings {
            breakpoint_threshold_type: BreakpointThresholdType::Percentile,
            breakpoint_threshold_amount: Some(50.0),
            min_chunk_size: 0,
            ..Default::default()
        };
        let trainer = trainer_with(provider.clone(), settings, tmp.path().join("store"));

        let report = trainer.train_documents(manual()).await.unwrap();

        assert_eq!(report.files, 2);
        assert_eq!(report.pages, 2);
        assert!(report.chunks >= 2);
        assert_eq!(report.dimension, VOCAB.len() + 1);

        let store = SqliteRagStore::open_read_only(&tmp.path().join("store")).await.unwrap();
        let info = store.index_info().await.unwrap();
        assert_eq!(info.embedding_model.as_deref(), Some("mock-embed"));
        assert_eq!(info.dimension, Some(VOCAB.len() + 1));

        let query = provider.embed_text("how long does a warranty refund take");
        let hits = store.search(&query, 1).await.unwrap();
        assert!(hits[0].chunk.content.contains("Warranty refund takes days."));
        assert_eq!(hits[0].chunk.source, "manual.pdf");
    }

    #[tokio::test]
    async fn fixed_training_batches_embedding_calls() {
        let tmp = tempfile::tempdir().unwrap();
        let provider = Arc::new(MockProvider::new(VOCAB));
        let settings = TrainerSettings {
            splitter: SplitterKind::Fixed,
            chunk_size: 30,
            chunk_overlap: 0,
            embed_batch_size: 2,
            embed_concurrency: 2,
            ..Default::default()
        };
        let trainer = trainer_with(provider.clone(), settings, tmp.path().to_path_buf());

        let report = trainer.train_documents(manual()).await.unwrap();

        let calls = provider.embed_calls();
        assert!(calls.iter().all(|batch| batch.len() <= 2));
        assert_eq!(calls.iter().map(Vec::len).sum::<usize>(), report.chunks);
    }

    #[tokio::test]
    async fn retraining_replaces_the_previous_index() {
        let tmp = tempfile::tempdir().unwrap();
        let provider = Arc::new(MockProvider::new(VOCAB));
        let settings = TrainerSettings {
            splitter: SplitterKind::Fixed,
            ..Default::default()
        };
        let trainer = trainer_with(provider, settings, tmp.path().to_path_buf());

        trainer.train_documents(manual()).await.unwrap();
        let report = trainer
            .train_documents(vec![Document::new("Only this.", "new.pdf", Some(0))])
            .await
            .unwrap();

        assert_eq!(report.chunks, 1);
    }

    #[tokio::test]
    async fn empty_documents_are_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let provider = Arc::new(MockProvider::new(VOCAB));
        let trainer = trainer_with(provider, TrainerSettings::default(), tmp.path().to_path_buf());

        let err = trainer.train_documents(Vec::new()).await.unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));
    }

    #[tokio::test]
    async fn run_requires_pdfs_in_the_sources_folder() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("readme.txt"), "hi").unwrap();
        let trainer = Trainer::new(
            Arc::new(MockProvider::new(VOCAB)),
            "mock-embed",
            TrainerSettings::default(),
            tmp.path().to_path_buf(),
            tmp.path().join("store"),
        );

        let err = trainer.run().await.unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(msg) if msg.contains("No PDF")));
    }

    #[test]
    fn chunk_ids_are_stable_and_distinct() {
        let chunk = TextChunk {
            text: "x".to_string(),
            source: "a.pdf".to_string(),
            page: Some(1),
            start_offset: 0,
            chunk_index: 0,
        };
        let next = TextChunk {
            chunk_index: 1,
            ..chunk.clone()
        };

        assert_eq!(chunk_id(&chunk), chunk_id(&chunk.clone()));
        assert_ne!(chunk_id(&chunk), chunk_id(&next));
        assert_eq!(chunk_id(&chunk).len(), 64);
    }

    #[test]
    fn mismatched_dimensions_are_an_upstream_error() {
        let err = uniform_dimension(&[vec![1.0, 2.0], vec![1.0]]).unwrap_err();
        assert!(matches!(err, ApiError::Upstream(_)));
    }
}
