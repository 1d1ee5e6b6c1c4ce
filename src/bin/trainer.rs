//! Builds the vector index the bot answers from.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use qabot::core::config::{AppPaths, ConfigService, Settings, SplitterKind};
use qabot::core::logging;
use qabot::ingest::Trainer;
use qabot::llm::{LlmProvider, OpenAiProvider};
use qabot::rag::BreakpointThresholdType;

/// Flags override `config.yml`; each also reads the variable named in `env`.
#[derive(Parser, Debug)]
#[command(name = "qabot-trainer", version, about = "Train the QA bot's vector index from PDFs")]
struct TrainerArgs {
    /// Folder containing the source PDFs
    #[arg(long, value_name = "DIR", env = "SOURCES_PATH")]
    sources: Option<PathBuf>,
    /// Folder the vector index is written to
    #[arg(long, value_name = "DIR", env = "VECTOR_STORE_PATH")]
    vector_store: Option<PathBuf>,
    /// Chunking strategy: semantic or fixed
    #[arg(long, value_name = "KIND", env = "SPLITTER")]
    splitter: Option<SplitterKind>,
    /// Smallest semantic chunk in characters (0 disables merging)
    #[arg(long, value_name = "CHARS", env = "MIN_CHUNK_SIZE")]
    min_chunk_size: Option<usize>,
    /// percentile, standard_deviation, interquartile or gradient
    #[arg(long, value_name = "TYPE", env = "BREAKPOINT_THRESHOLD_TYPE")]
    threshold_type: Option<BreakpointThresholdType>,
    #[arg(long, value_name = "AMOUNT", env = "BREAKPOINT_THRESHOLD_AMOUNT")]
    threshold_amount: Option<f64>,
    /// Fixed splitter window in characters
    #[arg(long, value_name = "CHARS", env = "CHUNK_SIZE")]
    chunk_size: Option<usize>,
    #[arg(long, value_name = "CHARS", env = "CHUNK_OVERLAP")]
    chunk_overlap: Option<usize>,
}

impl TrainerArgs {
    fn apply(self, settings: &mut Settings) {
        if let Some(sources) = self.sources {
            settings.storage.sources_path = sources;
        }
        if let Some(vector_store) = self.vector_store {
            settings.storage.vector_store_path = vector_store;
        }
        let trainer = &mut settings.trainer;
        if let Some(splitter) = self.splitter {
            trainer.splitter = splitter;
        }
        if let Some(min_chunk_size) = self.min_chunk_size {
            trainer.min_chunk_size = min_chunk_size;
        }
        if let Some(threshold_type) = self.threshold_type {
            trainer.breakpoint_threshold_type = threshold_type;
        }
        if let Some(amount) = self.threshold_amount {
            trainer.breakpoint_threshold_amount = Some(amount);
        }
        if let Some(chunk_size) = self.chunk_size {
            trainer.chunk_size = chunk_size;
        }
        if let Some(chunk_overlap) = self.chunk_overlap {
            trainer.chunk_overlap = chunk_overlap;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // env.config has to be in the environment before clap and AppPaths read it
    let env_file = ConfigService::load_env_file();
    let args = TrainerArgs::parse();
    let paths = Arc::new(AppPaths::new());
    let config = ConfigService::new(paths.clone());

    logging::init(&paths, "trainer.log");
    env_file.log();

    let mut settings = config.load_settings()?;
    args.apply(&mut settings);
    if settings.trainer.splitter == SplitterKind::Fixed
        && settings.trainer.chunk_overlap >= settings.trainer.chunk_size
    {
        anyhow::bail!("chunk_overlap must be smaller than chunk_size");
    }

    let embedder: Arc<dyn LlmProvider> = Arc::new(OpenAiProvider::from_settings(&settings.llm)?);
    let trainer = Trainer::new(
        embedder,
        settings.llm.embedding_model.clone(),
        settings.trainer.clone(),
        paths.resolve(&settings.storage.sources_path),
        paths.resolve(&settings.storage.vector_store_path),
    );

    let report = trainer.run().await?;
    tracing::info!(
        files = report.files,
        pages = report.pages,
        chunks = report.chunks,
        dimension = report.dimension,
        "Training complete"
    );
    println!("{}", serde_json::to_string_pretty(&report)?);

    Ok(())
}
