use crate::models::{Session, SessionStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest {
    /// Omitted or blank: the service generates one.
    #[validate(length(max = 64, message = "sessionId must be at most 64 characters"))]
    pub session_id: Option<String>,

    #[validate(length(max = 255, message = "title must be at most 255 characters"))]
    pub title: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub id: String,
    pub user_id: i64,
    pub title: String,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Session> for SessionResponse {
    fn from(session: Session) -> Self {
        Self {
            id: session.session_id,
            user_id: session.user_id,
            title: session.title,
            status: session.status,
            created_at: session.created_at,
            updated_at: session.updated_at,
        }
    }
}
