//! Engine entry point: one stateless inference call.
//!
//! The caller owns the conversation. Its history travels in
//! `Context.StoredMeta.SavedChatHistory` and comes back updated in the
//! response; every other `StoredMeta` key is returned unchanged.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::chain::QaChatBot;
use crate::core::errors::ApiError;
use crate::history::ChatHistory;

pub const INPUT_MESSAGE: &str = "InputMessage";
pub const OUTPUT_MESSAGE: &str = "OutputMessage";
pub const SAVED_CHAT_HISTORY: &str = "SavedChatHistory";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct InferenceRequest {
    pub input_values: Map<String, Value>,
    pub context: Option<InferenceContext>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct InferenceContext {
    pub stored_meta: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct OutcomeValue {
    pub value: Value,
    pub probability: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct InferenceResponse {
    pub outcomes: BTreeMap<String, Vec<OutcomeValue>>,
    pub context: InferenceContext,
    pub error_messages: String,
}

impl InferenceRequest {
    pub fn new(message: impl Into<String>) -> Self {
        let mut input_values = Map::new();
        input_values.insert(INPUT_MESSAGE.to_string(), Value::String(message.into()));
        Self {
            input_values,
            context: None,
        }
    }

    pub fn with_stored_meta(mut self, stored_meta: Map<String, Value>) -> Self {
        self.context = Some(InferenceContext { stored_meta });
        self
    }

    pub fn input_message(&self) -> Result<&str, ApiError> {
        match self.input_values.get(INPUT_MESSAGE) {
            Some(Value::String(message)) if !message.trim().is_empty() => Ok(message),
            Some(Value::String(_)) => Err(ApiError::BadRequest(format!(
                "InputValues.{} must not be empty",
                INPUT_MESSAGE
            ))),
            Some(_) => Err(ApiError::BadRequest(format!(
                "InputValues.{} must be a string",
                INPUT_MESSAGE
            ))),
            None => Err(ApiError::BadRequest(format!(
                "InputValues.{} is required",
                INPUT_MESSAGE
            ))),
        }
    }
}

impl InferenceResponse {
    pub fn output_message(&self) -> Option<&str> {
        self.outcomes
            .get(OUTPUT_MESSAGE)
            .and_then(|values| values.first())
            .and_then(|value| value.value.as_str())
    }
}

/// Restores the history from the caller's context. A missing (or null)
/// entry starts a fresh conversation; anything undecodable is rejected.
fn restore_history(stored_meta: &Map<String, Value>) -> Result<ChatHistory, ApiError> {
    match stored_meta.get(SAVED_CHAT_HISTORY) {
        None | Some(Value::Null) => Ok(ChatHistory::new()),
        Some(Value::String(blob)) => ChatHistory::decode(blob),
        Some(_) => Err(ApiError::BadRequest(format!(
            "StoredMeta.{} must be a string",
            SAVED_CHAT_HISTORY
        ))),
    }
}

impl QaChatBot {
    pub async fn run_inference(
        &self,
        request: InferenceRequest,
    ) -> Result<InferenceResponse, ApiError> {
        tracing::info!("Running inference");
        let message = request.input_message()?.to_string();

        let mut stored_meta = request.context.map(|c| c.stored_meta).unwrap_or_default();
        let mut history = restore_history(&stored_meta)?;

        let session_id = self.retrieval_settings().session_id.clone();
        let answer = self.ask(&mut history, &session_id, &message).await?;

        stored_meta.insert(
            SAVED_CHAT_HISTORY.to_string(),
            Value::String(history.encode()?),
        );

        let mut outcomes = BTreeMap::new();
        outcomes.insert(
            OUTPUT_MESSAGE.to_string(),
            vec![OutcomeValue {
                value: Value::String(answer.answer),
                probability: 0.0,
            }],
        );

        tracing::info!("Finished inference");
        Ok(InferenceResponse {
            outcomes,
            context: InferenceContext { stored_meta },
            error_messages: String::new(),
        })
    }
}
