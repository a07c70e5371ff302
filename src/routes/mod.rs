//! Router assembly: HTTP endpoints, static files, CORS, and HTTP tracing.

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    services::{ServeDir, ServeFile},
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::state::AppState;

pub mod http;

/// Build the application router with:
/// - JSON API under `/api/...`
/// - Static SPA from `./static` with index fallback
/// - CORS (allow any origin/method/headers) - adjust for production if needed
/// - HTTP trace layer (per-request spans w/ method, path, status, latency)
pub fn build_router(state: Arc<AppState>) -> Router {
    // Static files with SPA fallback
    let static_service = ServeDir::new("./static")
        .append_index_html_on_directories(true)
        .not_found_service(ServeFile::new("./static/index.html"));

    Router::new()
        .route("/api/v1/health", get(http::http_health))
        .route("/api/wakeup", get(http::http_wakeup))
        .route("/api/question-types", get(http::http_question_types))
        .route("/api/generate-questions", post(http::http_generate_questions))
        .route("/api/download-questions/:filename", get(http::http_download))
        // State + CORS + HTTP tracing
        .with_state(state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        // Frontend fallback
        .fallback_service(static_service)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use tower::ServiceExt;

    fn router(dir: &std::path::Path) -> Router {
        build_router(Arc::new(AppState::new(AppConfig::for_tests(dir))))
    }

    #[tokio::test]
    async fn wakeup_route_answers() {
        let dir = tempfile::tempdir().unwrap();
        let res = router(dir.path())
            .oneshot(Request::get("/api/wakeup").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let v: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(v["mssg"], "I am ready");
    }

    #[tokio::test]
    async fn generate_route_accepts_json_plan() {
        let dir = tempfile::tempdir().unwrap();
        let body = r#"{"question_plan": {"AR": 3}, "testing_mode": true, "exam_name": "SSC", "topics": ["a", "b", "c", "d"]}"#;
        let req = Request::post("/api/generate-questions")
            .header("content-type", "application/json")
            .body(Body::from(body))
            .unwrap();
        let res = router(dir.path()).oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let v: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(v["message"], "Successfully generated 3 questions.");
        assert!(v["files"]["questions"].as_str().unwrap().ends_with(".pdf"));
    }
}
