use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;

use crate::bot::{InferenceRequest, InferenceResponse};
use crate::core::errors::ApiError;
use crate::state::AppState;

pub async fn run_inference(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<InferenceRequest>, JsonRejection>,
) -> Result<Json<InferenceResponse>, ApiError> {
    let Json(request) = payload?;
    let response = state.bot.run_inference(request).await?;
    Ok(Json(response))
}
