use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use futures::future::join_all;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;
use user_service::services::MemorySessionStore;
use user_service::startup::{router, AppState};

fn app() -> (Router, Arc<MemorySessionStore>) {
    let store = Arc::new(MemorySessionStore::new());
    (router(AppState::new(store.clone())), store)
}

fn create(user_id: i64, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(format!("/api/user/{}/sessions", user_id))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(user_id: i64, session_id: &str) -> Request<Body> {
    Request::builder()
        .uri(format!("/api/user/{}/sessions/{}", user_id, session_id))
        .body(Body::empty())
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn create_then_get_returns_session() {
    let (app, _) = app();

    let response = app
        .clone()
        .oneshot(create(7, json!({"sessionId": "s1", "title": "Math"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let created = json_body(response).await;
    assert_eq!(created["id"], "s1");
    assert_eq!(created["userId"], 7);
    assert_eq!(created["title"], "Math");
    assert_eq!(created["status"], "ACTIVE");
    assert!(created["createdAt"].is_string());

    let response = app.oneshot(get(7, "s1")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await, created);
}

#[tokio::test]
async fn create_without_id_generates_one_with_default_title() {
    let (app, store) = app();

    let response = app.oneshot(create(7, json!({}))).await.unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    let body = json_body(response).await;
    assert!(uuid::Uuid::parse_str(body["id"].as_str().unwrap()).is_ok());
    assert_eq!(body["title"], "New Conversation");
    assert_eq!(store.len(), 1);
}

#[tokio::test]
async fn duplicate_create_for_same_user_conflicts() {
    let (app, store) = app();

    let first = app
        .clone()
        .oneshot(create(7, json!({"sessionId": "s1"})))
        .await
        .unwrap();
    let second = app
        .oneshot(create(7, json!({"sessionId": "s1", "title": "Other"})))
        .await
        .unwrap();

    assert_eq!(first.status(), StatusCode::CREATED);
    assert_eq!(second.status(), StatusCode::CONFLICT);
    assert_eq!(store.len(), 1);
}

#[tokio::test]
async fn create_over_another_users_session_is_forbidden() {
    let (app, _) = app();

    app.clone()
        .oneshot(create(8, json!({"sessionId": "s1"})))
        .await
        .unwrap();
    let response = app
        .oneshot(create(7, json!({"sessionId": "s1"})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn get_reports_owner_of_foreign_session() {
    let (app, _) = app();

    app.clone()
        .oneshot(create(8, json!({"sessionId": "s1"})))
        .await
        .unwrap();
    let response = app.oneshot(get(7, "s1")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["userId"], 8);
}

#[tokio::test]
async fn missing_session_is_not_found() {
    let (app, _) = app();

    let response = app.oneshot(get(7, "nope")).await.unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn invalid_input_is_rejected() {
    let (app, _) = app();

    let response = app
        .clone()
        .oneshot(create(7, json!({"sessionId": "x".repeat(65)})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let response = app
        .oneshot(create(0, json!({"sessionId": "s1"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn concurrent_creates_yield_one_winner() {
    let (app, store) = app();

    let requests = (0..16).map(|_| {
        app.clone()
            .oneshot(create(7, json!({"sessionId": "race", "title": "Math"})))
    });
    let statuses: Vec<StatusCode> = join_all(requests)
        .await
        .into_iter()
        .map(|r| r.unwrap().status())
        .collect();

    assert_eq!(
        statuses.iter().filter(|s| **s == StatusCode::CREATED).count(),
        1
    );
    assert_eq!(
        statuses.iter().filter(|s| **s == StatusCode::CONFLICT).count(),
        15
    );
    assert_eq!(store.len(), 1);
}

#[tokio::test]
async fn health_reports_ok() {
    let (app, _) = app();

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["service"], "user-service");
}
