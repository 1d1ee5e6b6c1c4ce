use std::sync::Arc;

use crate::bot::QaChatBot;
use crate::core::config::{AppPaths, ConfigService, Settings};
use crate::llm::{LlmProvider, OpenAiProvider};
use crate::rag::{IndexInfo, RagStore, SqliteRagStore};

pub mod error;

use error::InitializationError;

/// Application state shared across all routes.
///
/// The bot is immutable after startup; conversation state lives in each
/// request, so handlers never need a lock.
#[derive(Clone)]
pub struct AppState {
    pub paths: Arc<AppPaths>,
    pub config: ConfigService,
    pub settings: Arc<Settings>,
    pub bot: Arc<QaChatBot>,
    /// What the trainer recorded when the index was opened.
    pub index_info: IndexInfo,
}

impl AppState {
    /// Initializes the application state.
    ///
    /// This process includes:
    /// 1. Loading the merged configuration
    /// 2. Opening the vector index read-only
    /// 3. Building the model client and the bot around both
    pub async fn initialize(config: ConfigService) -> Result<Arc<Self>, InitializationError> {
        let paths = Arc::new(config.paths().clone());
        let settings = config
            .load_settings()
            .map_err(|e| InitializationError::Config(e.into()))?;

        let provider: Arc<dyn LlmProvider> = Arc::new(
            OpenAiProvider::from_settings(&settings.llm)
                .map_err(|e| InitializationError::Llm(e.into()))?,
        );

        let index_dir = paths.resolve(&settings.storage.vector_store_path);
        let store = SqliteRagStore::open_read_only(&index_dir)
            .await
            .map_err(|e| InitializationError::Index(e.into()))?;
        let index_info = store
            .index_info()
            .await
            .map_err(|e| InitializationError::Index(e.into()))?;
        check_index_model(&index_info, &settings.llm.embedding_model);
        tracing::info!(
            "Opened vector index {} ({} chunks)",
            store.db_path().display(),
            index_info.chunk_count
        );

        let bot = QaChatBot::new(
            provider,
            Arc::new(store),
            settings.llm.clone(),
            settings.retrieval.clone(),
        );

        Ok(Arc::new(Self::new(paths, config, settings, bot, index_info)))
    }

    pub fn new(
        paths: Arc<AppPaths>,
        config: ConfigService,
        settings: Settings,
        bot: QaChatBot,
        index_info: IndexInfo,
    ) -> Self {
        Self {
            paths,
            config,
            settings: Arc::new(settings),
            bot: Arc::new(bot),
            index_info,
        }
    }
}

/// Query vectors are only comparable with the vectors the index was built from.
fn check_index_model(info: &IndexInfo, embedding_model: &str) {
    match info.embedding_model.as_deref() {
        Some(built_with) if built_with != embedding_model => tracing::warn!(
            "Vector index was built with '{}' but queries will use '{}'",
            built_with,
            embedding_model
        ),
        None => tracing::warn!("Vector index does not record its embedding model"),
        _ => {}
    }
}
