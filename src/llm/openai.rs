use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use serde_json::json;

use super::provider::LlmProvider;
use super::types::{ChatMessage, ChatRequest};
use crate::core::config::LlmSettings;
use crate::core::errors::ApiError;

/// Client for any server speaking the OpenAI chat/embeddings HTTP API.
#[derive(Clone)]
pub struct OpenAiProvider {
    base_url: String,
    api_key: Option<String>,
    client: Client,
}

impl OpenAiProvider {
    pub fn new(
        base_url: String,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(ApiError::internal)?;

        Ok(Self {
            base_url: normalize_base_url(&base_url),
            api_key,
            client,
        })
    }

    pub fn from_settings(settings: &LlmSettings) -> Result<Self, ApiError> {
        if settings.api_key.is_none() {
            tracing::warn!(
                "No API key configured; requests to {} are unauthenticated",
                settings.base_url
            );
        }
        Self::new(
            settings.base_url.clone(),
            settings.api_key.clone(),
            Duration::from_secs(settings.request_timeout_secs),
        )
    }

    fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }

    async fn error_from(res: Response, what: &str) -> ApiError {
        let status = res.status();
        let text = res.text().await.unwrap_or_default();
        ApiError::Upstream(format!("{} failed ({}): {}", what, status, text))
    }
}

/// Accepts both `https://host` and `https://host/v1` as the configured base.
fn normalize_base_url(base_url: &str) -> String {
    let trimmed = base_url.trim_end_matches('/');
    trimmed.strip_suffix("/v1").unwrap_or(trimmed).to_string()
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingItem>,
}

#[derive(Deserialize)]
struct EmbeddingItem {
    index: usize,
    embedding: Vec<f32>,
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    async fn health_check(&self) -> Result<bool, ApiError> {
        let url = format!("{}/v1/models", self.base_url);
        let res = self.authorize(self.client.get(&url)).send().await;
        match res {
            Ok(resp) => Ok(resp.status().is_success()),
            Err(_) => Ok(false),
        }
    }

    async fn chat(&self, request: ChatRequest, model_id: &str) -> Result<String, ApiError> {
        let url = format!("{}/v1/chat/completions", self.base_url);

        let mut body = json!({
            "model": model_id,
            "messages": request.messages,
            "stream": false,
        });

        if let Some(obj) = body.as_object_mut() {
            if let Some(t) = request.temperature {
                obj.insert("temperature".to_string(), json!(t));
            }
            if let Some(t) = request.max_tokens {
                obj.insert("max_tokens".to_string(), json!(t));
            }
        }

        let res = self
            .authorize(self.client.post(&url))
            .json(&body)
            .send()
            .await
            .map_err(ApiError::upstream)?;

        if !res.status().is_success() {
            return Err(Self::error_from(res, "chat completion").await);
        }

        let payload: ChatCompletionResponse = res.json().await.map_err(ApiError::upstream)?;
        let choice = payload
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ApiError::Upstream("chat completion returned no choices".to_string()))?;

        Ok(choice.message.content)
    }

    async fn embed(&self, inputs: &[String], model_id: &str) -> Result<Vec<Vec<f32>>, ApiError> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/v1/embeddings", self.base_url);

        let body = json!({
            "model": model_id,
            "input": inputs,
        });

        let res = self
            .authorize(self.client.post(&url))
            .json(&body)
            .send()
            .await
            .map_err(ApiError::upstream)?;

        if !res.status().is_success() {
            return Err(Self::error_from(res, "embedding").await);
        }

        let payload: EmbeddingResponse = res.json().await.map_err(ApiError::upstream)?;
        order_embeddings(payload.data, inputs.len())
    }
}

/// The API may return items out of order; `index` is authoritative.
fn order_embeddings(
    mut items: Vec<EmbeddingItem>,
    expected: usize,
) -> Result<Vec<Vec<f32>>, ApiError> {
    if items.len() != expected {
        return Err(ApiError::Upstream(format!(
            "embedding returned {} vectors for {} inputs",
            items.len(),
            expected
        )));
    }
    items.sort_by_key(|item| item.index);
    if items.iter().enumerate().any(|(pos, item)| pos != item.index) {
        return Err(ApiError::Upstream(
            "embedding response has duplicate or missing indices".to_string(),
        ));
    }
    Ok(items.into_iter().map(|item| item.embedding).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(index: usize, value: f32) -> EmbeddingItem {
        EmbeddingItem {
            index,
            embedding: vec![value],
        }
    }

    #[test]
    fn base_url_drops_trailing_slash_and_version() {
        assert_eq!(normalize_base_url("https://api.openai.com/"), "https://api.openai.com");
        assert_eq!(normalize_base_url("http://localhost:1234/v1/"), "http://localhost:1234");
    }

    #[test]
    fn embeddings_are_reordered_by_index() {
        let ordered = order_embeddings(vec![item(2, 2.0), item(0, 0.0), item(1, 1.0)], 3).unwrap();
        assert_eq!(ordered, vec![vec![0.0], vec![1.0], vec![2.0]]);
    }

    #[test]
    fn embedding_count_mismatch_is_an_upstream_error() {
        let err = order_embeddings(vec![item(0, 0.0)], 2).unwrap_err();
        assert!(matches!(err, ApiError::Upstream(_)));

        let err = order_embeddings(vec![item(0, 0.0), item(0, 1.0)], 2).unwrap_err();
        assert!(matches!(err, ApiError::Upstream(_)));
    }

    #[test]
    fn chat_response_parses_first_choice() {
        let payload: ChatCompletionResponse = serde_json::from_str(
            r#"{"choices":[{"index":0,"message":{"role":"assistant","content":"Hi"}}]}"#,
        )
        .unwrap();
        assert_eq!(payload.choices[0].message.content, "Hi");
    }
}
