use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use axum::Router;
use clap::{Parser, Subcommand};
use serde_json::{Map, Value};
use tokio::net::TcpListener;

use qabot::bot::{InferenceRequest, InferenceResponse};
use qabot::core::config::{AppPaths, ConfigService};
use qabot::core::logging;
use qabot::server;
use qabot::state::AppState;

/// Conversational question answering over a trained document index.
#[derive(Parser, Debug)]
#[command(name = "qabot", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the HTTP API (default)
    Serve,
    /// Run a single inference locally and print the outcomes
    Ask {
        /// The user message
        message: String,
        /// JSON file with the StoredMeta of a previous run
        #[arg(long, value_name = "FILE")]
        context_in: Option<PathBuf>,
        /// Where to write the updated StoredMeta
        #[arg(long, value_name = "FILE")]
        context_out: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // env.config may set QABOT_ROOT and QABOT_DATA_DIR
    let env_file = ConfigService::load_env_file();
    let paths = Arc::new(AppPaths::new());
    let config = ConfigService::new(paths.clone());
    logging::init(&paths, "qabot.log");
    env_file.log();

    let state = AppState::initialize(config).await?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(state).await,
        Command::Ask {
            message,
            context_in,
            context_out,
        } => ask(state, message, context_in, context_out).await,
    }
}

async fn serve(state: Arc<AppState>) -> anyhow::Result<()> {
    let bind_addr = format!("{}:{}", state.settings.server.host, state.settings.server.port);

    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", bind_addr))?;
    let addr = listener.local_addr()?;

    println!("QABOT_PORT={}", addr.port());
    tracing::info!("Listening on {}", addr);

    let app: Router = server::router::router(state);
    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}

async fn ask(
    state: Arc<AppState>,
    message: String,
    context_in: Option<PathBuf>,
    context_out: Option<PathBuf>,
) -> anyhow::Result<()> {
    let mut request = InferenceRequest::new(message);
    if let Some(path) = context_in {
        request = request.with_stored_meta(read_stored_meta(&path)?);
    }

    let response = match state.bot.run_inference(request).await {
        Ok(response) => response,
        Err(err) => {
            println!("Error Messages: {}", err);
            return Err(err.into());
        }
    };
    print_outcomes(&response);

    if let Some(path) = context_out {
        let json = serde_json::to_string_pretty(&response.context.stored_meta)?;
        fs::write(&path, json).with_context(|| format!("Failed to write {}", path.display()))?;
    }

    Ok(())
}

fn read_stored_meta(path: &Path) -> anyhow::Result<Map<String, Value>> {
    let raw =
        fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("{} is not a JSON object", path.display()))
}

fn print_outcomes(response: &InferenceResponse) {
    for (key, values) in &response.outcomes {
        println!("\n\nOutcome Key: {}", key);
        for value in values {
            let text = value
                .value
                .as_str()
                .map(str::to_string)
                .unwrap_or_else(|| value.value.to_string());
            println!("Outcome Value: \n{}\n\n", text);
            println!("Outcome Probability: \n{}\n\n", value.probability);
        }
    }
    println!("Error Messages: {}", response.error_messages);
}
