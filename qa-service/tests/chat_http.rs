mod common;

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use common::TestContext;
use qa_service::services::providers::mock::MockGenerationBackend;
use qa_service::startup::router;
use serde_json::{json, Value};
use std::time::Duration;
use tower::ServiceExt;

fn post(path: &str, user_header: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(path)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(user) = user_header {
        builder = builder.header("X-User-ID", user);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

async fn body_bytes(response: axum::response::Response) -> Vec<u8> {
    to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

#[tokio::test]
async fn stream_endpoint_writes_ndjson() {
    let ctx = TestContext::with_backend(MockGenerationBackend::scripted(["Hel", "lo\n"]));
    let app = router(ctx.state.clone());

    let response = app
        .oneshot(post(
            "/api/qa/chat/stream",
            Some("7"),
            json!({"userId": 7, "sessionId": "s1", "question": "greet"}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "application/x-ndjson"
    );
    assert!(response.headers().get("x-request-id").is_some());

    let body = String::from_utf8(body_bytes(response).await).unwrap();
    let lines: Vec<Value> = body
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();

    assert_eq!(lines[0], json!({"type": "session-id", "sessionId": "s1"}));
    let answer: String = lines[1..]
        .iter()
        .map(|v| v.as_str().unwrap().to_string())
        .collect();
    assert_eq!(answer, "Hello\n");

    assert!(ctx.store.wait_for_attempts(1, Duration::from_secs(2)).await);
}

#[tokio::test]
async fn sync_endpoint_returns_camel_case_record() {
    let ctx = TestContext::with_backend(MockGenerationBackend::scripted(["4"]));
    let app = router(ctx.state.clone());

    let response = app
        .oneshot(post(
            "/api/qa/chat",
            Some("7"),
            json!({"userId": 7, "sessionId": "s1", "question": "2+2?"}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(body["sessionId"], "s1");
    assert_eq!(body["userId"], 7);
    assert_eq!(body["answer"], "4");
    assert!(body["id"].is_string());
    assert!(body["createdAt"].is_string());
}

#[tokio::test]
async fn missing_caller_header_is_unauthorized() {
    let ctx = TestContext::with_backend(MockGenerationBackend::new());

    let response = router(ctx.state.clone())
        .oneshot(post(
            "/api/qa/chat/stream",
            None,
            json!({"userId": 7, "sessionId": "s1", "question": "q"}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn payload_user_must_match_caller() {
    let ctx = TestContext::with_backend(MockGenerationBackend::new());

    let response = router(ctx.state.clone())
        .oneshot(post(
            "/api/qa/chat",
            Some("8"),
            json!({"userId": 7, "sessionId": "s1", "question": "q"}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(ctx.registry.lookups(), 0);
}

#[tokio::test]
async fn blank_stream_session_is_bad_request() {
    let ctx = TestContext::with_backend(MockGenerationBackend::new());

    let response = router(ctx.state.clone())
        .oneshot(post(
            "/api/qa/chat/stream",
            Some("7"),
            json!({"userId": 7, "sessionId": " ", "question": "q"}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert!(body["error"].as_str().unwrap().contains("sessionId"));
}

#[tokio::test]
async fn rule_violations_are_unprocessable() {
    let ctx = TestContext::with_backend(MockGenerationBackend::new());

    let response = router(ctx.state.clone())
        .oneshot(post(
            "/api/qa/chat",
            Some("7"),
            json!({"userId": 7, "sessionId": "x".repeat(65), "question": "q"}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn foreign_session_is_forbidden() {
    let ctx = TestContext::with_backend(MockGenerationBackend::new());
    ctx.registry.seed("s1", 8, "Theirs");

    let response = router(ctx.state.clone())
        .oneshot(post(
            "/api/qa/chat/stream",
            Some("7"),
            json!({"userId": 7, "sessionId": "s1", "question": "q"}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn health_reports_backend() {
    let ctx = TestContext::with_backend(MockGenerationBackend::new());

    let response = router(ctx.state.clone())
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "qa-service");
    assert_eq!(body["backend"], "mock");
}
