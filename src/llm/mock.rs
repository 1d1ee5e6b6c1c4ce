//! Deterministic stand-in for the hosted model, used by unit tests.
//!
//! Embeddings count occurrences of a fixed vocabulary (plus a constant bias
//! dimension so no vector is all zeros). Chat replies are served from a
//! script in order; once it runs out the last user message is echoed back.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use super::provider::LlmProvider;
use super::types::{ChatRequest, ROLE_USER};
use crate::core::errors::ApiError;

pub struct MockProvider {
    vocabulary: Vec<String>,
    replies: Mutex<VecDeque<String>>,
    chat_log: Mutex<Vec<ChatRequest>>,
    embed_log: Mutex<Vec<Vec<String>>>,
    fail_chat: bool,
}

impl MockProvider {
    pub fn new(vocabulary: &[&str]) -> Self {
        Self {
            vocabulary: vocabulary.iter().map(|w| w.to_lowercase()).collect(),
            replies: Mutex::new(VecDeque::new()),
            chat_log: Mutex::new(Vec::new()),
            embed_log: Mutex::new(Vec::new()),
            fail_chat: false,
        }
    }

    pub fn with_replies(self, replies: &[&str]) -> Self {
        *self.replies.lock().unwrap() = replies.iter().map(|r| r.to_string()).collect();
        self
    }

    pub fn failing_chat(mut self) -> Self {
        self.fail_chat = true;
        self
    }

    pub fn chat_requests(&self) -> Vec<ChatRequest> {
        self.chat_log.lock().unwrap().clone()
    }

    pub fn embed_calls(&self) -> Vec<Vec<String>> {
        self.embed_log.lock().unwrap().clone()
    }

    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let lowered = text.to_lowercase();
        let words: Vec<&str> = lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .collect();
        let mut vector: Vec<f32> = self
            .vocabulary
            .iter()
            .map(|term| words.iter().filter(|w| *w == term).count() as f32)
            .collect();
        vector.push(0.1);
        vector
    }
}

#[async_trait]
impl LlmProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn health_check(&self) -> Result<bool, ApiError> {
        Ok(true)
    }

    async fn chat(&self, request: ChatRequest, _model_id: &str) -> Result<String, ApiError> {
        self.chat_log.lock().unwrap().push(request.clone());
        if self.fail_chat {
            return Err(ApiError::Upstream("mock chat failure".to_string()));
        }
        if let Some(reply) = self.replies.lock().unwrap().pop_front() {
            return Ok(reply);
        }
        Ok(request
            .messages
            .iter()
            .rev()
            .find(|m| m.role == ROLE_USER)
            .map(|m| m.content.clone())
            .unwrap_or_default())
    }

    async fn embed(&self, inputs: &[String], _model_id: &str) -> Result<Vec<Vec<f32>>, ApiError> {
        self.embed_log.lock().unwrap().push(inputs.to_vec());
        Ok(inputs.iter().map(|text| self.embed_text(text)).collect())
    }
}
