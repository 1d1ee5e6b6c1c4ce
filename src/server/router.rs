use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::server::handlers::{config, health, inference};
use crate::state::AppState;

/// Creates the main application router with all routes and middleware.
///
/// This function sets up:
/// - Health and status endpoints
/// - The inference endpoint
/// - A read-only view of the effective configuration
/// - Request tracing
///
/// # Arguments
///
/// * `state` - Shared application state
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/v1/status", get(health::get_status))
        .route("/v1/inference", post(inference::run_inference))
        .route("/v1/config", get(config::get_config))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::*;
    use crate::bot::chain::tests::{bot_with, build_store, VOCAB};
    use crate::core::config::{AppPaths, ConfigService, Settings};
    use crate::llm::mock::MockProvider;

    async fn test_state(dir: &std::path::Path, replies: &[&str]) -> Arc<AppState> {
        let paths = Arc::new(AppPaths::with_dirs(dir.to_path_buf(), dir.join("data")));
        let config = ConfigService::new(paths.clone());
        let provider = Arc::new(MockProvider::new(VOCAB).with_replies(replies));
        let store = build_store(&dir.join("index"), &provider).await;
        let index_info = store.index_info().await.unwrap();
        let bot = bot_with(provider, store, 1);

        let mut settings = Settings::default();
        settings.llm.api_key = Some("sk-test-secret".to_string());

        Arc::new(AppState::new(paths, config, settings, bot, index_info))
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn inference_request(body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/v1/inference")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn health_is_ok() {
        let tmp = tempfile::tempdir().unwrap();
        let app = router(test_state(tmp.path(), &[]).await);

        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["status"], json!("ok"));
    }

    #[tokio::test]
    async fn status_reports_the_index() {
        let tmp = tempfile::tempdir().unwrap();
        let app = router(test_state(tmp.path(), &[]).await);

        let response = app
            .oneshot(Request::builder().uri("/v1/status").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["index"]["chunk_count"], json!(3));
        assert_eq!(body["index"]["embedding_model"], json!("mock-embed"));
        assert_eq!(body["provider"], json!("mock"));
    }

    #[tokio::test]
    async fn inference_answers_and_returns_history() {
        let tmp = tempfile::tempdir().unwrap();
        let app = router(test_state(tmp.path(), &["Once a year."]).await);

        let response = app
            .oneshot(inference_request(json!({
                "InputValues": { "InputMessage": "engine oil?" },
                "Context": { "StoredMeta": { "Keep": "me" } }
            })))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["Outcomes"]["OutputMessage"][0]["Value"], json!("Once a year."));
        assert_eq!(body["Context"]["StoredMeta"]["Keep"], json!("me"));
        assert!(body["Context"]["StoredMeta"]["SavedChatHistory"].is_string());
    }

    #[tokio::test]
    async fn inference_without_message_is_bad_request() {
        let tmp = tempfile::tempdir().unwrap();
        let app = router(test_state(tmp.path(), &[]).await);

        let response = app
            .oneshot(inference_request(json!({ "InputValues": {} })))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(body_json(response).await["error"].is_string());
    }

    #[tokio::test]
    async fn malformed_body_is_a_json_bad_request() {
        let tmp = tempfile::tempdir().unwrap();
        let app = router(test_state(tmp.path(), &[]).await);

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/v1/inference")
                    .header("content-type", "application/json")
                    .body(Body::from("{\"InputValues\": "))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert!(body["error"].as_str().is_some_and(|msg| !msg.is_empty()));
    }

    #[tokio::test]
    async fn missing_content_type_is_reported_as_json() {
        let tmp = tempfile::tempdir().unwrap();
        let app = router(test_state(tmp.path(), &[]).await);

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/v1/inference")
                    .body(Body::from("{}"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(body_json(response).await["error"].is_string());
    }

    #[tokio::test]
    async fn config_masks_the_api_key() {
        let tmp = tempfile::tempdir().unwrap();
        let app = router(test_state(tmp.path(), &[]).await);

        let response = app
            .oneshot(Request::builder().uri("/v1/config").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["llm"]["api_key"], json!("****"));
        assert_eq!(body["retrieval"]["top_k"], json!(4));
        assert!(!body.to_string().contains("sk-test-secret"));
    }
}
