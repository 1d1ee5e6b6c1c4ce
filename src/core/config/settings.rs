use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::core::errors::ApiError;
use crate::rag::BreakpointThresholdType;

/// Typed view of `config.yml` merged with `secrets.yaml` and the environment.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub llm: LlmSettings,
    pub retrieval: RetrievalSettings,
    pub storage: StorageSettings,
    pub trainer: TrainerSettings,
    pub server: ServerSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LlmSettings {
    pub base_url: String,
    pub api_key: Option<String>,
    pub chat_model: String,
    pub embedding_model: String,
    pub temperature: f64,
    pub max_tokens: Option<u32>,
    pub request_timeout_secs: u64,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com".to_string(),
            api_key: None,
            chat_model: "gpt-4o".to_string(),
            embedding_model: "text-embedding-ada-002".to_string(),
            temperature: 0.0,
            max_tokens: None,
            request_timeout_secs: 120,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetrievalSettings {
    /// Session every invocation is filed under.
    pub session_id: String,
    pub top_k: usize,
    /// How many trailing history messages the answer prompt sees.
    pub history_window: usize,
    pub max_context_chars: usize,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            session_id: "newsession".to_string(),
            top_k: 4,
            history_window: 5,
            max_context_chars: 16_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StorageSettings {
    pub sources_path: PathBuf,
    pub vector_store_path: PathBuf,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            sources_path: PathBuf::from("../Sources"),
            vector_store_path: PathBuf::from("../VectorStores"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SplitterKind {
    Semantic,
    Fixed,
}

impl FromStr for SplitterKind {
    type Err = ApiError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "semantic" => Ok(SplitterKind::Semantic),
            "fixed" => Ok(SplitterKind::Fixed),
            other => Err(ApiError::BadRequest(format!(
                "Unknown splitter '{}': expected 'semantic' or 'fixed'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TrainerSettings {
    pub splitter: SplitterKind,
    pub min_chunk_size: usize,
    pub breakpoint_threshold_type: BreakpointThresholdType,
    /// Falls back to the threshold type's own default when unset.
    pub breakpoint_threshold_amount: Option<f64>,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub embed_batch_size: usize,
    pub embed_concurrency: usize,
}

impl Default for TrainerSettings {
    fn default() -> Self {
        Self {
            splitter: SplitterKind::Semantic,
            min_chunk_size: 100,
            breakpoint_threshold_type: BreakpointThresholdType::Percentile,
            breakpoint_threshold_amount: None,
            chunk_size: 1000,
            chunk_overlap: 200,
            embed_batch_size: 64,
            embed_concurrency: 4,
        }
    }
}

impl TrainerSettings {
    pub fn threshold_amount(&self) -> f64 {
        self.breakpoint_threshold_amount
            .unwrap_or_else(|| self.breakpoint_threshold_type.default_amount())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 0,
        }
    }
}

/// Applies the environment variables the bot and trainer have always honoured.
///
/// `lookup` is injected so the mapping can be exercised without touching the
/// process environment.
pub fn apply_env_overrides<F>(settings: &mut Settings, lookup: F) -> Result<(), ApiError>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    if let Some(key) = get("OPENAI_API_KEY") {
        settings.llm.api_key = Some(key);
    }
    if let Some(url) = get("OPENAI_BASE_URL") {
        settings.llm.base_url = url;
    }
    if let Some(model) = get("MODEL_NAME") {
        settings.llm.chat_model = model;
    }
    if let Some(model) = get("EMBEDDING_MODEL") {
        settings.llm.embedding_model = model;
    }
    if let Some(raw) = get("TEMPERATURE") {
        settings.llm.temperature = parse_env("TEMPERATURE", &raw)?;
    }
    if let Some(path) = get("SOURCES_PATH") {
        settings.storage.sources_path = PathBuf::from(path);
    }
    if let Some(path) = get("VECTOR_STORE_PATH") {
        settings.storage.vector_store_path = PathBuf::from(path);
    }
    if let Some(raw) = get("MIN_CHUNK_SIZE") {
        settings.trainer.min_chunk_size = parse_env("MIN_CHUNK_SIZE", &raw)?;
    }
    if let Some(raw) = get("BREAKPOINT_THRESHOLD_TYPE") {
        settings.trainer.breakpoint_threshold_type = raw.parse()?;
    }
    if let Some(raw) = get("BREAKPOINT_THRESHOLD_AMOUNT") {
        settings.trainer.breakpoint_threshold_amount =
            Some(parse_env("BREAKPOINT_THRESHOLD_AMOUNT", &raw)?);
    }
    if let Some(raw) = get("PORT") {
        settings.server.port = parse_env("PORT", &raw)?;
    }

    Ok(())
}

fn parse_env<T: FromStr>(key: &str, raw: &str) -> Result<T, ApiError> {
    raw.trim().parse::<T>().map_err(|_| {
        ApiError::BadRequest(format!(
            "Invalid value for environment variable {}: '{}'",
            key, raw
        ))
    })
}
