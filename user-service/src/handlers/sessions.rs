use crate::dtos::{CreateSessionRequest, SessionResponse};
use crate::services::CreateOutcome;
use crate::startup::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use service_core::error::AppError;
use validator::Validate;

fn check_user_id(user_id: i64) -> Result<(), AppError> {
    if user_id <= 0 {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "userId must be positive"
        )));
    }
    Ok(())
}

/// Look a session up by id. Ownership is reported, not enforced: the
/// caller compares `userId` itself.
#[tracing::instrument(skip(state))]
pub async fn get_session(
    State(state): State<AppState>,
    Path((user_id, session_id)): Path<(i64, String)>,
) -> Result<Json<SessionResponse>, AppError> {
    check_user_id(user_id)?;
    let session = state.sessions.get(user_id, &session_id).await?;
    Ok(Json(session.into()))
}

#[tracing::instrument(skip(state, payload))]
pub async fn create_session(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
    Json(payload): Json<CreateSessionRequest>,
) -> Result<(StatusCode, Json<SessionResponse>), AppError> {
    check_user_id(user_id)?;
    payload.validate()?;

    match state
        .sessions
        .create(
            user_id,
            payload.session_id.as_deref(),
            payload.title.as_deref(),
        )
        .await?
    {
        CreateOutcome::Created(session) => Ok((StatusCode::CREATED, Json(session.into()))),
        CreateOutcome::AlreadyExists(session) => Err(AppError::Conflict(anyhow::anyhow!(
            "Session {} already exists",
            session.session_id
        ))),
        CreateOutcome::OwnedByOther => Err(AppError::Forbidden(anyhow::anyhow!(
            "Session belongs to another user"
        ))),
    }
}
