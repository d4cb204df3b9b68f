//! HTTP server for the website chat widget

use axum::{
    extract::{rejection::JsonRejection, State as AxumState},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::Serialize;
use std::any::Any as PanicPayload;
use std::sync::Arc;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{Any, CorsLayer};
use tracing::Instrument;

use vq_chat::{Capabilities, ChatError, ChatPipeline, ChatRequest, ErrorReply, ProviderInfo};

pub const SERVICE_NAME: &str = "VQ Chat Widget Backend";

const APOLOGY: &str = "Friend, something needs attention on my end. Please try again in a moment.";
const EMPTY_MESSAGE_REPLY: &str = "It looks like your message was empty. What would you like to ask?";
const INVALID_REQUEST_REPLY: &str = "I couldn't read that message. Please try sending it again.";

#[derive(Clone)]
struct AppState {
    pipeline: Arc<ChatPipeline>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthResponse {
    status: &'static str,
    service: &'static str,
    version: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    provider: Option<ProviderInfo>,
    capabilities: Capabilities,
}

fn error_response(status: StatusCode, error: &str, response: &str) -> Response {
    let body = ErrorReply {
        error: error.to_string(),
        response: response.to_string(),
    };
    (status, Json(body)).into_response()
}

fn chat_error_response(err: &ChatError) -> Response {
    match err {
        ChatError::EmptyMessage => error_response(StatusCode::BAD_REQUEST, err.code(), EMPTY_MESSAGE_REPLY),
        ChatError::CompletionUnavailable => {
            error_response(StatusCode::SERVICE_UNAVAILABLE, err.code(), APOLOGY)
        }
        ChatError::Completion(_) => error_response(StatusCode::INTERNAL_SERVER_ERROR, err.code(), APOLOGY),
    }
}

async fn handle_chat(
    AxumState(state): AxumState<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Response {
    let request_id = uuid::Uuid::new_v4();
    let span = tracing::info_span!("chat", request_id = %request_id);

    async move {
        let Json(request) = match payload {
            Ok(request) => request,
            Err(rejection) => {
                tracing::warn!(status = %rejection.status(), error = %rejection.body_text(), "Rejected chat payload");
                return error_response(StatusCode::BAD_REQUEST, "invalid_request", INVALID_REQUEST_REPLY);
            }
        };

        tracing::info!(
            chars = request.message.chars().count(),
            history = request.history.len(),
            page = request.page_context.as_ref().and_then(|p| p.page_type.as_deref()).unwrap_or("-"),
            "Received chat message"
        );

        match state.pipeline.respond(request).await {
            Ok(reply) => {
                tracing::info!(status = 200, chars = reply.response.chars().count(), "Sent response");
                (StatusCode::OK, Json(reply)).into_response()
            }
            Err(err) => {
                if err.is_client_error() {
                    tracing::warn!(code = err.code(), "Chat request rejected");
                } else {
                    tracing::error!(code = err.code(), error = %err, "Chat request failed");
                }
                chat_error_response(&err)
            }
        }
    }
    .instrument(span)
    .await
}

/// Last line of defence: a fault inside a handler still answers the widget.
fn panic_response(payload: Box<dyn PanicPayload + Send + 'static>) -> Response {
    let detail = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    tracing::error!(error = %detail, "Handler panicked");
    error_response(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", APOLOGY)
}

async fn health_check(AxumState(state): AxumState<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: SERVICE_NAME,
        version: env!("CARGO_PKG_VERSION"),
        provider: state.pipeline.provider_info(),
        capabilities: state.pipeline.capabilities(),
    })
}

pub fn router(pipeline: Arc<ChatPipeline>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/chat", post(handle_chat))
        .route("/health", get(health_check))
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(cors)
        .with_state(AppState { pipeline })
}

pub async fn start_server(addr: &str, pipeline: Arc<ChatPipeline>) -> anyhow::Result<()> {
    let app = router(pipeline);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("🚀 {} listening on http://{}", SERVICE_NAME, listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;
    use vq_chat::{ChatConfig, ChatMessage, CompletionProvider, ContextLibrary, GenerationConfig};

    /// Answers with the last message, or fails when asked to.
    struct EchoProvider {
        fail: bool,
    }

    #[async_trait]
    impl CompletionProvider for EchoProvider {
        async fn complete(&self, messages: &[ChatMessage], _config: &GenerationConfig) -> anyhow::Result<String> {
            if self.fail {
                anyhow::bail!("API error (401): invalid api key");
            }
            let last = messages.last().map(|m| m.content.as_str()).unwrap_or("");
            Ok(format!("You said: {} ({} messages)", last, messages.len()))
        }

        fn info(&self) -> ProviderInfo {
            ProviderInfo { name: "Echo".into(), model: "echo-1".into() }
        }
    }

    struct PanickingProvider;

    #[async_trait]
    impl CompletionProvider for PanickingProvider {
        async fn complete(&self, _messages: &[ChatMessage], _config: &GenerationConfig) -> anyhow::Result<String> {
            panic!("unexpected internal fault");
        }

        fn info(&self) -> ProviderInfo {
            ProviderInfo { name: "Panicking".into(), model: "none".into() }
        }
    }

    fn app_with(provider: Option<Arc<dyn CompletionProvider>>) -> Router {
        let context = ContextLibrary::from_blobs("You are VQ.", &[]);
        let mut pipeline = ChatPipeline::new(ChatConfig::default(), context);
        if let Some(provider) = provider {
            pipeline = pipeline.with_provider(provider);
        }
        router(Arc::new(pipeline))
    }

    fn app(provider: Option<EchoProvider>) -> Router {
        app_with(provider.map(|p| Arc::new(p) as Arc<dyn CompletionProvider>))
    }

    fn post_chat(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/chat")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn json_body(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health_ok_without_credentials() {
        let response = app(None)
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = json_body(response).await;
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["service"], SERVICE_NAME);
        assert_eq!(body["capabilities"]["completion"], false);
        assert_eq!(body["capabilities"]["webSearch"], false);
        assert!(body.get("provider").is_none());
    }

    #[tokio::test]
    async fn test_chat_round_trip() {
        let payload = r#"{
            "message": "What is the Crucible?",
            "history": [
                {"role": "user", "content": "hi"},
                {"role": "assistant", "content": "Hello, friend!"},
                {"role": "assistant"}
            ],
            "pageContext": {"url": "https://example.org/beta-tools.html", "pageType": "beta-tools", "title": "Beta Tools", "content": ""}
        }"#;
        let response = app(Some(EchoProvider { fail: false })).oneshot(post_chat(payload)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = json_body(response).await;
        assert_eq!(body["response"], "You said: What is the Crucible? (4 messages)");
        assert!(body.get("error").is_none());
    }

    #[tokio::test]
    async fn test_chat_without_credentials_is_unavailable() {
        let response = app(None).oneshot(post_chat(r#"{"message": "hello"}"#)).await.unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body = json_body(response).await;
        assert_eq!(body["error"], "completion_unavailable");
        assert_eq!(body["response"], APOLOGY);
    }

    #[tokio::test]
    async fn test_missing_message_is_bad_request() {
        let response = app(Some(EchoProvider { fail: false }))
            .oneshot(post_chat(r#"{"history": []}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["error"], "empty_message");
    }

    #[tokio::test]
    async fn test_malformed_json_is_bad_request() {
        let response = app(Some(EchoProvider { fail: false }))
            .oneshot(post_chat("{\"message\": "))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body["error"], "invalid_request");
        assert!(!body["response"].as_str().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_provider_failure_is_apology() {
        let response = app(Some(EchoProvider { fail: true }))
            .oneshot(post_chat(r#"{"message": "hello"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = json_body(response).await;
        assert_eq!(body["error"], "completion_failed");
        assert_eq!(body["response"], APOLOGY);
        assert!(!body["response"].as_str().unwrap().contains("401"));
    }

    #[tokio::test]
    async fn test_internal_fault_is_apology() {
        let mut request = post_chat(r#"{"message": "hello"}"#);
        request.headers_mut().insert("origin", "https://example.org".parse().unwrap());
        let response = app_with(Some(Arc::new(PanickingProvider))).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.headers()["access-control-allow-origin"], "*");
        let body = json_body(response).await;
        assert_eq!(body["error"], "internal_error");
        assert_eq!(body["response"], APOLOGY);
    }

    #[tokio::test]
    async fn test_cors_headers_present() {
        let request = Request::builder()
            .uri("/health")
            .header("origin", "https://example.org")
            .body(Body::empty())
            .unwrap();
        let response = app(None).oneshot(request).await.unwrap();
        assert_eq!(response.headers()["access-control-allow-origin"], "*");
    }
}
