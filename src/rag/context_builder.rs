//! RAG Context Builder.
//!
//! Turns ranked search results into the `{context}` text of the answer
//! prompt by concatenating them ("stuffing") in rank order.

use serde::{Deserialize, Serialize};

use super::store::ChunkSearchResult;

/// Configuration for context building.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextBuilderConfig {
    /// Maximum total context length in characters
    pub max_context_length: usize,
}

impl Default for ContextBuilderConfig {
    fn default() -> Self {
        Self {
            max_context_length: 16_000,
        }
    }
}

/// A cited source, distinct per file and page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRef {
    pub source: String,
    pub page: Option<u32>,
}

impl std::fmt::Display for SourceRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.page {
            // pages are stored zero-based
            Some(page) => write!(f, "{} (page {})", self.source, page + 1),
            None => f.write_str(&self.source),
        }
    }
}

pub struct RAGContextBuilder {
    config: ContextBuilderConfig,
}

impl Default for RAGContextBuilder {
    fn default() -> Self {
        Self::new(ContextBuilderConfig::default())
    }
}

impl RAGContextBuilder {
    pub fn new(config: ContextBuilderConfig) -> Self {
        Self { config }
    }

    /// Joins passages with a blank line, stopping before the length budget
    /// would be exceeded. The first passage is always included, truncated if
    /// it alone is over budget.
    pub fn build_context(&self, results: &[ChunkSearchResult]) -> String {
        let max_length = self.config.max_context_length;
        let mut context = String::new();
        let mut current_length = 0;

        for result in results {
            let passage = &result.chunk.content;

            let separator = if context.is_empty() { 0 } else { 2 };
            let addition_length = passage.chars().count() + separator;

            if current_length + addition_length > max_length {
                if context.is_empty() {
                    context = passage.chars().take(max_length).collect();
                }
                break;
            }

            if separator > 0 {
                context.push_str("\n\n");
            }
            context.push_str(passage);
            current_length += addition_length;
        }

        context
    }

    /// Distinct sources of the results, in rank order.
    pub fn sources(&self, results: &[ChunkSearchResult]) -> Vec<SourceRef> {
        let mut sources: Vec<SourceRef> = Vec::new();
        for result in results {
            let source = SourceRef {
                source: result.chunk.source.clone(),
                page: result.chunk.page,
            };
            if !sources.contains(&source) {
                sources.push(source);
            }
        }
        sources
    }
}
