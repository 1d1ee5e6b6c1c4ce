use thiserror::Error;

#[derive(Debug, Error)]
pub enum InitializationError {
    #[error("Failed to load configuration: {0}")]
    Config(#[source] anyhow::Error),

    #[error("Failed to open vector index: {0}")]
    Index(#[source] anyhow::Error),

    #[error("Failed to initialize LLM service: {0}")]
    Llm(#[source] anyhow::Error),
}
