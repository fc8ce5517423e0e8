use crate::startup::AppState;
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;

pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    match state.history.health_check().await {
        Ok(_) => (
            StatusCode::OK,
            Json(json!({
                "status": "ok",
                "service": "qa-service",
                "version": env!("CARGO_PKG_VERSION"),
                "backend": state.backend.name()
            })),
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "status": "unhealthy",
                "service": "qa-service",
                "error": e.to_string()
            })),
        ),
    }
}

/// Ready once the history store answers and the backend is configured.
pub async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    if state.history.health_check().await.is_err() {
        return StatusCode::SERVICE_UNAVAILABLE;
    }
    match state.backend.health_check().await {
        Ok(_) => StatusCode::OK,
        Err(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}
