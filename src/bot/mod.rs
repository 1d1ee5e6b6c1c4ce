//! The question-answering bot: a history-aware RAG chain over a read-only index.

pub mod chain;
pub mod engine;
pub mod prompts;

pub use chain::{QaChatBot, RagAnswer};
pub use engine::{InferenceContext, InferenceRequest, InferenceResponse, OutcomeValue};
