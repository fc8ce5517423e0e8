use crate::dtos::{ChatCompletionRequest, ChatHistoryResponse};
use crate::middleware::CallerId;
use crate::startup::AppState;
use axum::{
    body::Body,
    extract::State,
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use futures::StreamExt;
use service_core::error::AppError;
use validator::Validate;

pub const NDJSON_CONTENT_TYPE: &str = "application/x-ndjson";

/// Answer one question and return the persisted turn.
pub async fn chat(
    State(state): State<AppState>,
    caller: CallerId,
    Json(payload): Json<ChatCompletionRequest>,
) -> Result<Json<ChatHistoryResponse>, AppError> {
    payload.validate()?;
    caller.assert_owns(payload.user_id)?;

    let record = state.orchestrator.complete(payload.into_command()).await?;

    Ok(Json(record.into()))
}

/// Stream one answer as newline-delimited JSON.
///
/// Errors before the first record come back as a normal error response. A
/// failure after that aborts the body.
pub async fn chat_stream(
    State(state): State<AppState>,
    caller: CallerId,
    Json(payload): Json<ChatCompletionRequest>,
) -> Result<Response, AppError> {
    payload.validate()?;
    caller.assert_owns(payload.user_id)?;

    let stream = state
        .orchestrator
        .complete_stream(payload.into_command())
        .await?;

    let body = Body::from_stream(stream.map(|item| item.map(|event| event.to_ndjson_line())));

    Ok((
        [
            (header::CONTENT_TYPE, NDJSON_CONTENT_TYPE),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        body,
    )
        .into_response())
}
