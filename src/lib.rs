pub mod bot;
pub mod core;
pub mod history;
pub mod ingest;
pub mod llm;
pub mod rag;
pub mod server;
pub mod state;
