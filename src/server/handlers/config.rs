use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;

use crate::core::config::ConfigService;
use crate::core::errors::ApiError;
use crate::state::AppState;

/// Effective settings (files plus environment) with secrets masked.
pub async fn get_config(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ApiError> {
    let settings = serde_json::to_value(state.settings.as_ref()).map_err(ApiError::internal)?;
    Ok(Json(ConfigService::redact_sensitive_values(&settings)))
}
