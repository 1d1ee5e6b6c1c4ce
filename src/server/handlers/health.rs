use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

use crate::core::errors::ApiError;
use crate::state::AppState;

pub async fn health(State(_state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "initialized": true
    }))
}

pub async fn get_status(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ApiError> {
    let chunk_count = state.bot.store().count().await?;
    let llm = state.bot.llm_settings();
    let provider = state.bot.provider();
    let llm_reachable = provider.health_check().await.unwrap_or(false);
    Ok(Json(json!({
        "initialized": true,
        "provider": provider.name(),
        "llm_reachable": llm_reachable,
        "chat_model": llm.chat_model,
        "embedding_model": llm.embedding_model,
        "index": {
            "chunk_count": chunk_count,
            "embedding_model": state.index_info.embedding_model,
            "dimension": state.index_info.dimension,
            "built_at": state.index_info.built_at,
        }
    })))
}
