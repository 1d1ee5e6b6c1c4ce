//! Semantic chunking.
//!
//! Text is split into sentences, each sentence is embedded together with its
//! neighbours, and a chunk boundary is placed wherever the cosine distance
//! between consecutive sentence windows rises above a threshold derived from
//! the distribution of all distances in the document.

use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::chunker::{Document, TextChunk};
use super::vector_math::cosine_distance;
use crate::core::errors::ApiError;
use crate::llm::LlmProvider;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakpointThresholdType {
    /// Distances above the `amount`-th percentile.
    Percentile,
    /// Distances above `mean + amount * stddev`.
    StandardDeviation,
    /// Distances above `mean + amount * IQR`.
    Interquartile,
    /// Gradient of the distances above its `amount`-th percentile.
    Gradient,
}

impl BreakpointThresholdType {
    pub fn default_amount(&self) -> f64 {
        match self {
            BreakpointThresholdType::Percentile => 95.0,
            BreakpointThresholdType::StandardDeviation => 3.0,
            BreakpointThresholdType::Interquartile => 1.5,
            BreakpointThresholdType::Gradient => 95.0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BreakpointThresholdType::Percentile => "percentile",
            BreakpointThresholdType::StandardDeviation => "standard_deviation",
            BreakpointThresholdType::Interquartile => "interquartile",
            BreakpointThresholdType::Gradient => "gradient",
        }
    }
}

impl fmt::Display for BreakpointThresholdType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BreakpointThresholdType {
    type Err = ApiError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "percentile" => Ok(BreakpointThresholdType::Percentile),
            "standard_deviation" => Ok(BreakpointThresholdType::StandardDeviation),
            "interquartile" => Ok(BreakpointThresholdType::Interquartile),
            "gradient" => Ok(BreakpointThresholdType::Gradient),
            other => Err(ApiError::BadRequest(format!(
                "Unknown breakpoint threshold type '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SemanticChunker {
    pub threshold_type: BreakpointThresholdType,
    pub threshold_amount: f64,
    /// Groups shorter than this (in characters) are merged into the next one.
    pub min_chunk_size: Option<usize>,
    /// Sentences on each side joined into a sentence's embedding window.
    pub buffer_size: usize,
    pub embedding_model: String,
}

impl SemanticChunker {
    pub fn new(embedding_model: impl Into<String>) -> Self {
        let threshold_type = BreakpointThresholdType::Percentile;
        Self {
            threshold_type,
            threshold_amount: threshold_type.default_amount(),
            min_chunk_size: None,
            buffer_size: 1,
            embedding_model: embedding_model.into(),
        }
    }

    pub fn with_threshold(mut self, threshold_type: BreakpointThresholdType, amount: f64) -> Self {
        self.threshold_type = threshold_type;
        self.threshold_amount = amount;
        self
    }

    pub fn with_min_chunk_size(mut self, min_chunk_size: Option<usize>) -> Self {
        self.min_chunk_size = min_chunk_size;
        self
    }

    pub async fn split_documents(
        &self,
        documents: &[Document],
        embedder: &dyn LlmProvider,
    ) -> Result<Vec<TextChunk>, ApiError> {
        let mut chunks = Vec::new();
        for document in documents {
            let texts = self.split_text(&document.text, embedder).await?;
            let mut cursor = 0;
            for (chunk_index, text) in texts.into_iter().enumerate() {
                let start_offset = locate(&document.text, &text, &mut cursor);
                chunks.push(TextChunk {
                    text,
                    source: document.source.clone(),
                    page: document.page,
                    start_offset,
                    chunk_index,
                });
            }
        }
        Ok(chunks)
    }

    pub async fn split_text(
        &self,
        text: &str,
        embedder: &dyn LlmProvider,
    ) -> Result<Vec<String>, ApiError> {
        let sentences = split_sentences(text);
        if sentences.len() <= 1 {
            return Ok(sentences);
        }
        if sentences.len() == 2 && self.threshold_type == BreakpointThresholdType::Gradient {
            return Ok(sentences);
        }

        let windows = combine_sentences(&sentences, self.buffer_size);
        let embeddings = embedder.embed(&windows, &self.embedding_model).await?;
        if embeddings.len() != windows.len() {
            return Err(ApiError::Upstream(format!(
                "embedding returned {} vectors for {} sentences",
                embeddings.len(),
                windows.len()
            )));
        }

        let distances = consecutive_distances(&embeddings)?;
        let breakpoints = self.breakpoints(&distances);
        tracing::debug!(
            sentences = sentences.len(),
            breakpoints = breakpoints.len(),
            threshold_type = %self.threshold_type,
            "semantic split"
        );
        Ok(group_sentences(&sentences, &breakpoints, self.min_chunk_size))
    }

    /// Indices `i` such that a boundary falls between sentence `i` and `i + 1`.
    pub fn breakpoints(&self, distances: &[f64]) -> Vec<usize> {
        let (threshold, scores) =
            breakpoint_threshold(self.threshold_type, self.threshold_amount, distances);
        scores
            .iter()
            .enumerate()
            .filter(|(_, score)| **score > threshold)
            .map(|(idx, _)| idx)
            .collect()
    }
}

fn sentence_end() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[.?!]\s+").expect("sentence regex is valid"))
}

/// Splits after `.`, `?` or `!` followed by whitespace; the whitespace is dropped.
pub fn split_sentences(text: &str) -> Vec<String> {
    let text = text.trim();
    if text.is_empty() {
        return Vec::new();
    }
    let mut sentences = Vec::new();
    let mut start = 0;
    for m in sentence_end().find_iter(text) {
        // punctuation is a single ASCII byte
        sentences.push(text[start..m.start() + 1].to_string());
        start = m.end();
    }
    sentences.push(text[start..].to_string());
    sentences
}

/// Joins every sentence with up to `buffer_size` neighbours on each side.
pub fn combine_sentences(sentences: &[String], buffer_size: usize) -> Vec<String> {
    (0..sentences.len())
        .map(|i| {
            let from = i.saturating_sub(buffer_size);
            let to = (i + buffer_size + 1).min(sentences.len());
            sentences[from..to].join(" ")
        })
        .collect()
}

fn consecutive_distances(embeddings: &[Vec<f32>]) -> Result<Vec<f64>, ApiError> {
    embeddings
        .windows(2)
        .map(|pair| cosine_distance(&pair[0], &pair[1]).map(f64::from))
        .collect()
}

/// Returns the threshold and the series it is compared against.
pub fn breakpoint_threshold(
    threshold_type: BreakpointThresholdType,
    amount: f64,
    distances: &[f64],
) -> (f64, Vec<f64>) {
    match threshold_type {
        BreakpointThresholdType::Percentile => (percentile(distances, amount), distances.to_vec()),
        BreakpointThresholdType::StandardDeviation => {
            let threshold = mean(distances) + amount * std_dev(distances);
            (threshold, distances.to_vec())
        }
        BreakpointThresholdType::Interquartile => {
            let iqr = percentile(distances, 75.0) - percentile(distances, 25.0);
            (mean(distances) + amount * iqr, distances.to_vec())
        }
        BreakpointThresholdType::Gradient => {
            let series = gradient(distances);
            (percentile(&series, amount), series)
        }
    }
}

/// Assembles sentence groups between breakpoints.
///
/// A group shorter than `min_chunk_size` is not emitted on its own: the
/// sentences roll over into the next group. Whatever follows the last
/// emitted breakpoint is always emitted.
pub fn group_sentences(
    sentences: &[String],
    breakpoints: &[usize],
    min_chunk_size: Option<usize>,
) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut start = 0;

    for &idx in breakpoints {
        if idx < start || idx >= sentences.len() {
            continue;
        }
        let combined = sentences[start..=idx].join(" ");
        if min_chunk_size.is_some_and(|min| combined.chars().count() < min) {
            continue;
        }
        chunks.push(combined);
        start = idx + 1;
    }

    if start < sentences.len() {
        chunks.push(sentences[start..].join(" "));
    }

    chunks
}

/// Linear-interpolation percentile (`q` in 0..=100) of unsorted values.
pub fn percentile(values: &[f64], q: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let rank = (q.clamp(0.0, 100.0) / 100.0) * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let weight = rank - lower as f64;
    sorted[lower] + (sorted[upper] - sorted[lower]) * weight
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation.
fn std_dev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mean = mean(values);
    let variance = values.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

/// Second-order central differences inside, one-sided differences at the edges.
pub fn gradient(values: &[f64]) -> Vec<f64> {
    let n = values.len();
    match n {
        0 => Vec::new(),
        1 => vec![0.0],
        _ => (0..n)
            .map(|i| {
                if i == 0 {
                    values[1] - values[0]
                } else if i == n - 1 {
                    values[n - 1] - values[n - 2]
                } else {
                    (values[i + 1] - values[i - 1]) / 2.0
                }
            })
            .collect(),
    }
}

/// Finds `chunk` in `text` at or after `cursor` and returns its char offset.
///
/// Chunks re-join sentences with single spaces, so only the first sentence
/// is matched verbatim against the source.
fn locate(text: &str, chunk: &str, cursor: &mut usize) -> usize {
    let first_sentence = split_sentences(chunk).into_iter().next().unwrap_or_default();
    match text[*cursor..].find(first_sentence.as_str()) {
        Some(pos) => {
            let byte_offset = *cursor + pos;
            *cursor = byte_offset + first_sentence.len();
            text[..byte_offset].chars().count()
        }
        None => text[..*cursor].chars().count(),
    }
}
