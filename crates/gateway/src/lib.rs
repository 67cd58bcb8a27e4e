//! HTTP gateway for Threadline.
//!
//! Exposes the chat service over JSON: `POST /chat`, `GET /health`, and
//! session administration under `/sessions`.
//!
//! Built on Axum.

pub mod api;

use axum::extract::DefaultBodyLimit;
use axum::{
    Router,
    response::Json,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use threadline_agent::ChatService;
use threadline_config::AppConfig;

pub use api::SharedService;

/// Build the Axum router with all gateway routes.
pub fn build_router(service: SharedService) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/chat", post(api::chat_handler))
        .route("/sessions/{mode}", get(api::list_sessions_handler))
        .route(
            "/sessions/{mode}/{id}",
            get(api::get_history_handler).delete(api::delete_session_handler),
        )
        .with_state(service)
        .layer(DefaultBodyLimit::max(1024 * 1024)) // 1 MB body limit
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

/// Start the gateway HTTP server from configuration.
///
/// Builds the provider and chat service once, serves until Ctrl-C, then
/// closes the session stores.
pub async fn start(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let provider = threadline_providers::build_from_config(&config)?;
    let service = Arc::new(ChatService::from_config(&config, provider).await?);
    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);
    serve(service, &addr).await
}

/// Serve `service` on `addr` until a shutdown signal arrives.
pub async fn serve(service: SharedService, addr: &str) -> Result<(), Box<dyn std::error::Error>> {
    let app = build_router(service.clone());

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %addr, "Gateway listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    service.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(e) => {
            warn!(error = %e, "Cannot listen for Ctrl-C; serving until killed");
            std::future::pending::<()>().await;
        }
    }
}

// --- Health ---

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".into(),
        version: env!("CARGO_PKG_VERSION").into(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{ChatResponse, ErrorResponse, HistoryResponse, SessionListResponse};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use threadline_agent::{Stores, ToolGate, TurnSettings};
    use threadline_core::error::ProviderError;
    use threadline_core::message::{Message, Role};
    use threadline_core::provider::{Provider, ProviderRequest, ProviderResponse, Usage};
    use threadline_core::session::MemoryMode;
    use threadline_core::tool::ToolRegistry;
    use threadline_memory::InMemoryStore;

    /// Lightweight mock provider for gateway tests.
    struct MockProvider {
        fail: bool,
    }

    #[async_trait::async_trait]
    impl Provider for MockProvider {
        fn name(&self) -> &str {
            "gateway_mock"
        }

        async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
            if self.fail {
                return Err(ProviderError::ApiError {
                    status_code: 503,
                    message: "upstream down".into(),
                });
            }
            let last = request
                .messages
                .last()
                .map(|m| m.content.clone())
                .unwrap_or_default();
            Ok(ProviderResponse {
                message: Message::assistant(format!("You said: {last}")),
                usage: Some(Usage {
                    prompt_tokens: 10,
                    completion_tokens: 5,
                    total_tokens: 15,
                }),
                model: "mock-model".into(),
            })
        }
    }

    fn test_service(fail: bool) -> SharedService {
        let stores = Stores {
            temporary: Arc::new(InMemoryStore::new()),
            persistent: Arc::new(InMemoryStore::new()),
        };
        let settings = TurnSettings {
            model: "mock-model".into(),
            temperature: 0.2,
            max_tokens: None,
            system_prompt: "You are a helpful and concise assistant.".into(),
            history_budget: 1200,
        };
        Arc::new(
            ChatService::new(
                Arc::new(MockProvider { fail }),
                Arc::new(ToolRegistry::new()),
                stores,
                ToolGate::new(["/weather", "/wiki", "/upper"]),
                settings,
                MemoryMode::Persistent,
            )
            .unwrap(),
        )
    }

    fn post_chat(body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/chat")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json<T: serde::de::DeserializeOwned>(response: axum::response::Response) -> T {
        let body = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn health_endpoint() {
        let app = build_router(test_service(false));

        let req = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let health: HealthResponse = body_json(response).await;
        assert_eq!(health.status, "ok");
    }

    #[tokio::test]
    async fn chat_defaults_to_persistent() {
        let app = build_router(test_service(false));
        let response = app
            .oneshot(post_chat(serde_json::json!({
                "session_id": "abc",
                "message": "Hello"
            })))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let chat: ChatResponse = body_json(response).await;
        assert_eq!(chat.session_id, "abc");
        assert_eq!(chat.reply, "You said: Hello");
        assert_eq!(chat.mode, MemoryMode::Persistent);
        assert_eq!(chat.tokens_input, Some(10));
        assert_eq!(chat.tokens_output, Some(5));
    }

    #[tokio::test]
    async fn chat_echoes_requested_mode_and_accepts_metadata() {
        let app = build_router(test_service(false));
        let response = app
            .oneshot(post_chat(serde_json::json!({
                "session_id": "abc",
                "message": "Hello",
                "memory": "temporary",
                "metadata": {"client": "test"}
            })))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let chat: ChatResponse = body_json(response).await;
        assert_eq!(chat.mode, MemoryMode::Temporary);
    }

    #[tokio::test]
    async fn invalid_memory_mode_is_bad_request() {
        let app = build_router(test_service(false));
        let response = app
            .oneshot(post_chat(serde_json::json!({
                "session_id": "abc",
                "message": "Hello",
                "memory": "forever"
            })))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let err: ErrorResponse = body_json(response).await;
        assert!(err.error.contains("memory must be 'temporary' or 'persistent'"));
    }

    #[tokio::test]
    async fn blank_session_is_bad_request() {
        let app = build_router(test_service(false));
        let response = app
            .oneshot(post_chat(serde_json::json!({
                "session_id": " ",
                "message": "Hello"
            })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn malformed_body_gets_json_error() {
        let app = build_router(test_service(false));
        let req = Request::builder()
            .method("POST")
            .uri("/chat")
            .header("content-type", "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let response = app.oneshot(req).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let err: ErrorResponse = body_json(response).await;
        assert!(!err.error.is_empty());
    }

    #[tokio::test]
    async fn missing_field_gets_json_error() {
        let app = build_router(test_service(false));
        let response = app
            .oneshot(post_chat(serde_json::json!({"session_id": "abc"})))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let err: ErrorResponse = body_json(response).await;
        assert!(err.error.contains("message"));
    }

    #[tokio::test]
    async fn model_failure_is_bad_gateway() {
        let app = build_router(test_service(true));
        let response = app
            .oneshot(post_chat(serde_json::json!({
                "session_id": "abc",
                "message": "Hello"
            })))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        let err: ErrorResponse = body_json(response).await;
        assert!(err.error.contains("upstream down"));
    }

    #[tokio::test]
    async fn session_admin_routes() {
        let service = test_service(false);
        service.chat("s1", "Hello", Some("temporary")).await.unwrap();

        let app = build_router(service.clone());
        let req = Request::builder()
            .uri("/sessions/temporary")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let list: SessionListResponse = body_json(response).await;
        assert_eq!(list.sessions.len(), 1);
        assert_eq!(list.sessions[0].message_count, 2);

        let app = build_router(service.clone());
        let req = Request::builder()
            .uri("/sessions/temporary/s1")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(req).await.unwrap();
        let history: HistoryResponse = body_json(response).await;
        assert_eq!(history.messages.len(), 2);
        assert_eq!(history.messages[0].role, Role::User);

        let app = build_router(service.clone());
        let req = Request::builder()
            .method("DELETE")
            .uri("/sessions/temporary/s1")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let app = build_router(service);
        let req = Request::builder()
            .method("DELETE")
            .uri("/sessions/temporary/s1")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn unknown_mode_in_path_is_bad_request() {
        let app = build_router(test_service(false));
        let req = Request::builder()
            .uri("/sessions/forever")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
