use crate::models::{Session, DEFAULT_SESSION_TITLE};
use crate::services::store::{InsertOutcome, SessionStore};
use service_core::error::AppError;
use std::sync::Arc;
use uuid::Uuid;

/// Result of a create request, mapped to 201 / 409 / 403 by the handler.
#[derive(Debug, Clone, PartialEq)]
pub enum CreateOutcome {
    Created(Session),
    /// The id already exists for this user.
    AlreadyExists(Session),
    /// The id belongs to someone else.
    OwnedByOther,
}

#[derive(Clone)]
pub struct SessionService {
    store: Arc<dyn SessionStore>,
}

impl SessionService {
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self { store }
    }

    pub async fn get(&self, user_id: i64, session_id: &str) -> Result<Session, AppError> {
        self.store.find(session_id).await?.ok_or_else(|| {
            tracing::debug!(user_id, session_id, "Session not found");
            AppError::NotFound(anyhow::anyhow!("Session {} not found", session_id))
        })
    }

    /// Create a session. A blank id gets a generated one; a blank title gets
    /// the default.
    pub async fn create(
        &self,
        user_id: i64,
        session_id: Option<&str>,
        title: Option<&str>,
    ) -> Result<CreateOutcome, AppError> {
        let session_id = session_id
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let title = title
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .unwrap_or(DEFAULT_SESSION_TITLE)
            .to_string();

        let outcome = match self
            .store
            .insert_if_absent(Session::new(session_id, user_id, title))
            .await?
        {
            InsertOutcome::Inserted(session) => {
                tracing::info!(user_id, session_id = %session.session_id, "Session created");
                CreateOutcome::Created(session)
            }
            InsertOutcome::Exists(existing) if existing.is_owned_by(user_id) => {
                tracing::debug!(user_id, session_id = %existing.session_id, "Session already exists");
                CreateOutcome::AlreadyExists(existing)
            }
            InsertOutcome::Exists(existing) => {
                tracing::warn!(
                    user_id,
                    owner_id = existing.user_id,
                    session_id = %existing.session_id,
                    "Session id taken by another user"
                );
                CreateOutcome::OwnedByOther
            }
        };
        Ok(outcome)
    }
}
