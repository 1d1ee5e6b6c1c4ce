//! Source documents and fixed-size chunking.
//!
//! Splits text into overlapping character windows, pulling each window's end
//! back to a sentence ending when one is close to the cut.

use serde::{Deserialize, Serialize};

/// One unit of loaded source text (a PDF page).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub text: String,
    /// Path of the file the text came from.
    pub source: String,
    /// Zero-based page number, when the source is paginated.
    pub page: Option<u32>,
}

impl Document {
    pub fn new(text: impl Into<String>, source: impl Into<String>, page: Option<u32>) -> Self {
        Self {
            text: text.into(),
            source: source.into(),
            page,
        }
    }
}

/// A text chunk with source information.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextChunk {
    /// The text content
    pub text: String,
    /// Source identifier (file path)
    pub source: String,
    pub page: Option<u32>,
    /// Character offset in the originating document
    pub start_offset: usize,
    /// Chunk index within the originating document
    pub chunk_index: usize,
}

/// Configuration for fixed-size splitting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixedSizeSplitter {
    /// Maximum chunk size in characters
    pub chunk_size: usize,
    /// Overlap between consecutive chunks
    pub chunk_overlap: usize,
}

impl Default for FixedSizeSplitter {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
        }
    }
}

impl FixedSizeSplitter {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            chunk_overlap,
        }
    }

    pub fn split_documents(&self, documents: &[Document]) -> Vec<TextChunk> {
        documents
            .iter()
            .flat_map(|doc| self.split_document(doc))
            .collect()
    }

    pub fn split_document(&self, document: &Document) -> Vec<TextChunk> {
        self.split_text(&document.text)
            .into_iter()
            .enumerate()
            .map(|(chunk_index, (start_offset, text))| TextChunk {
                text,
                source: document.source.clone(),
                page: document.page,
                start_offset,
                chunk_index,
            })
            .collect()
    }

    /// Splits `text` into `(char offset, chunk)` pairs.
    pub fn split_text(&self, text: &str) -> Vec<(usize, String)> {
        let chars: Vec<char> = text.chars().collect();
        let total_chars = chars.len();
        let mut chunks = Vec::new();

        if total_chars == 0 {
            return chunks;
        }

        let mut start = 0;

        while start < total_chars {
            let end = (start + self.chunk_size).min(total_chars);
            let window: String = chars[start..end].iter().collect();

            let final_text = if end < total_chars {
                cut_at_sentence_boundary(&window)
            } else {
                window.as_str()
            };

            let trimmed = final_text.trim();
            if !trimmed.is_empty() {
                chunks.push((start, trimmed.to_string()));
            }

            if end == total_chars {
                break;
            }
            // the next window overlaps what was emitted, not the uncut window
            let emitted_end = start + final_text.chars().count();
            start = emitted_end.saturating_sub(self.chunk_overlap).max(start + 1);
        }

        chunks
    }
}

/// Cuts the window after the last sentence ending in its final 20%, if any.
fn cut_at_sentence_boundary(text: &str) -> &str {
    const SENTENCE_ENDINGS: [&str; 6] = [". ", "! ", "? ", ".\n", "!\n", "?\n"];

    let char_count = text.chars().count();
    let search_start = text
        .char_indices()
        .nth((char_count * 80) / 100)
        .map(|(idx, _)| idx)
        .unwrap_or(text.len());
    let search_text = &text[search_start..];

    let cut = SENTENCE_ENDINGS
        .iter()
        .filter_map(|ending| search_text.rfind(ending).map(|pos| pos + ending.len()))
        .max();

    match cut {
        Some(pos) => &text[..search_start + pos],
        None => text,
    }
}
