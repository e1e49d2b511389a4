use axum::{
    Router,
    http::{HeaderName, HeaderValue, Method, header::CONTENT_TYPE},
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::gate::API_KEY_HEADER;
use crate::handlers::{chat_handler, health_handler, metrics_handler, usage_stats_handler};
use crate::state::AppState;

pub fn build_router(state: Arc<AppState>, origins: &[String]) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/chat", post(chat_handler))
        .route("/usage-stats", get(usage_stats_handler))
        .route("/metrics", get(metrics_handler))
        .layer(cors(origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors(origins: &[String]) -> CorsLayer {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(_) => {
                warn!(origin = %o, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE, HeaderName::from_static(API_KEY_HEADER)])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ToolCache;
    use crate::error::ApiError;
    use crate::llm::{ChatMessage, CompletionBackend};
    use crate::orchestrator::{Orchestrator, OrchestratorConfig};
    use crate::rate_limit::{RateLimitConfig, RateLimiter};
    use crate::tools::ToolDispatch;
    use crate::usage::UsageTracker;
    use async_trait::async_trait;
    use axum::body::{Body, to_bytes};
    use axum::extract::connect_info::MockConnectInfo;
    use axum::http::{Request, StatusCode};
    use serde_json::{Value, json};
    use std::net::SocketAddr;
    use std::time::Duration;
    use tower::ServiceExt;

    const SECRET: &str = "test-secret";

    struct Canned;

    #[async_trait]
    impl CompletionBackend for Canned {
        async fn complete(&self, _: &[ChatMessage], _: &[Value]) -> Result<ChatMessage, ApiError> {
            Ok(ChatMessage::text("assistant", "canned answer"))
        }

        fn model(&self) -> &str {
            "gpt-test"
        }
    }

    struct NoTools;

    #[async_trait]
    impl ToolDispatch for NoTools {
        async fn execute(&self, _: &str, _: &str) -> String {
            "{}".to_string()
        }
    }

    fn app() -> (Router, Arc<AppState>) {
        let usage = Arc::new(UsageTracker::new());
        let state = Arc::new(AppState {
            api_secret: SECRET.to_string(),
            trust_forwarded_for: false,
            usage: usage.clone(),
            limiter: RateLimiter::new(RateLimitConfig::default(), usage.clone()),
            orchestrator: Orchestrator::new(
                Arc::new(Canned),
                Arc::new(NoTools),
                usage,
                "rules".to_string(),
                OrchestratorConfig::default(),
            ),
            tool_cache: Arc::new(ToolCache::new(Duration::from_secs(60))),
        });
        let router = build_router(state.clone(), &[])
            .layer(MockConnectInfo(SocketAddr::from(([10, 0, 0, 1], 40000))));
        (router, state)
    }

    fn chat(key: Option<&str>, message: &str) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri("/chat")
            .header("content-type", "application/json");
        if let Some(key) = key {
            builder = builder.header("x-api-key", key);
        }
        builder
            .body(Body::from(json!({ "message": message }).to_string()))
            .unwrap()
    }

    async fn json_body(resp: axum::response::Response) -> Value {
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_needs_no_key() {
        let (app, _) = app();
        let req = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let body = json_body(resp).await;
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    }

    #[tokio::test]
    async fn chat_answers_with_usage_fields() {
        let (app, _) = app();
        let resp = app.oneshot(chat(Some(SECRET), "Who are you?")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let body = json_body(resp).await;
        assert_eq!(body["response"], "canned answer");
        assert_eq!(body["model"], "gpt-test");
        assert!(body["tokens_used"].as_u64().unwrap() > 0);
        assert!(body["timestamp"].is_string());
    }

    #[tokio::test]
    async fn wrong_key_is_401_without_usage_record() {
        let (app, state) = app();
        let resp = app.clone().oneshot(chat(Some("wrong"), "hi")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let resp = app.oneshot(chat(None, "hi")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        assert_eq!(state.usage.total_requests(), 0);
        assert_eq!(state.usage.blocked_requests(), 0);
    }

    #[tokio::test]
    async fn oversized_message_is_413() {
        let (app, _) = app();
        let resp = app
            .clone()
            .oneshot(chat(Some(SECRET), &"x".repeat(10_000)))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let resp = app
            .oneshot(chat(Some(SECRET), &"x".repeat(10_001)))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn thirty_first_request_in_a_minute_is_429() {
        let (app, state) = app();
        for i in 0..30 {
            let resp = app.clone().oneshot(chat(Some(SECRET), "hi")).await.unwrap();
            assert_eq!(resp.status(), StatusCode::OK, "request {}", i + 1);
        }

        let resp = app.oneshot(chat(Some(SECRET), "hi")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(resp.headers().contains_key("retry-after"));
        assert_eq!(state.usage.total_requests(), 30);
        assert_eq!(state.usage.blocked_requests(), 1);
    }

    #[tokio::test]
    async fn usage_stats_counts_records_and_needs_key() {
        let (app, _) = app();
        for _ in 0..3 {
            app.clone().oneshot(chat(Some(SECRET), "hi")).await.unwrap();
        }

        let unauth = Request::builder().uri("/usage-stats").body(Body::empty()).unwrap();
        let resp = app.clone().oneshot(unauth).await.unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let req = Request::builder()
            .uri("/usage-stats")
            .header("x-api-key", SECRET)
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let stats = json_body(resp).await;
        assert_eq!(stats["total_requests"], 3);
        assert_eq!(stats["blocked_requests"], 0);
        assert_eq!(stats["top_ips"]["10.0.0.1"], 3);
        let hours = stats["requests_last_24h"].as_object().unwrap();
        assert_eq!(hours.values().map(|v| v.as_u64().unwrap()).sum::<u64>(), 3);
    }

    #[tokio::test]
    async fn malformed_body_is_400() {
        let (app, _) = app();
        let req = Request::builder()
            .method("POST")
            .uri("/chat")
            .header("x-api-key", SECRET)
            .body(Body::from("not json"))
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert!(json_body(resp).await["error"].is_string());
    }

    #[tokio::test]
    async fn metrics_are_exposed() {
        let (app, _) = app();
        app.clone().oneshot(chat(Some(SECRET), "hi")).await.unwrap();

        let req = Request::builder().uri("/metrics").body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let text = String::from_utf8(to_bytes(resp.into_body(), usize::MAX).await.unwrap().to_vec()).unwrap();
        assert!(text.contains("agent_chat_requests_total"));
    }
}
