//! Session resolution against the session registry.
//!
//! The registry owns the compare-and-set for session creation. Two turns
//! racing on the same new identifier both try to create it; the loser sees
//! a conflict, which [`reconcile_creation`] turns into success.

use crate::error::QaError;
use crate::models::{CreateSessionOutcome, DEFAULT_SESSION_TITLE};
use crate::services::metrics;
use crate::services::registry::{RegistryError, SessionRegistry};
use std::sync::Arc;
use tracing::instrument;

/// How a session identifier was confirmed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Reused,
    Created,
    /// Another turn created the session first.
    ConflictAbsorbed,
}

impl Resolution {
    pub fn as_str(&self) -> &'static str {
        match self {
            Resolution::Reused => "reused",
            Resolution::Created => "created",
            Resolution::ConflictAbsorbed => "conflict_absorbed",
        }
    }
}

/// Title used when a session has to be created.
pub fn resolve_title(title: Option<&str>) -> &str {
    title
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .unwrap_or(DEFAULT_SESSION_TITLE)
}

/// Decide what a create attempt for `requested` means for the caller.
///
/// A conflict is success: the identifier exists and the caller gets it back
/// unchanged. Every other failure propagates.
pub fn reconcile_creation(
    requested: &str,
    outcome: CreateSessionOutcome,
) -> Result<(String, Resolution), QaError> {
    match outcome {
        CreateSessionOutcome::Created(session) => Ok((session.id, Resolution::Created)),
        CreateSessionOutcome::Conflict => Ok((requested.to_string(), Resolution::ConflictAbsorbed)),
        CreateSessionOutcome::Error(e) => Err(e.into()),
    }
}

#[derive(Clone)]
pub struct SessionCoordinator {
    registry: Arc<dyn SessionRegistry>,
}

impl SessionCoordinator {
    pub fn new(registry: Arc<dyn SessionRegistry>) -> Self {
        Self { registry }
    }

    /// Confirm that `session_id` exists and belongs to `user_id`, creating it
    /// on first use. Safe to call concurrently for the same pair.
    #[instrument(skip(self, title))]
    pub async fn resolve(
        &self,
        user_id: i64,
        session_id: Option<&str>,
        title: Option<&str>,
    ) -> Result<String, QaError> {
        let session_id = session_id
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| QaError::Validation("sessionId is required".to_string()))?;

        let result = self.resolve_existing_or_create(user_id, session_id, title).await;
        match &result {
            Ok((_, resolution)) => {
                metrics::record_session_resolution(resolution.as_str());
                tracing::debug!(resolution = resolution.as_str(), "Session resolved");
            }
            Err(e) => {
                metrics::record_session_resolution("failed");
                tracing::warn!(error = %e, "Session resolution failed");
            }
        }

        result.map(|(id, _)| id)
    }

    /// Like [`resolve`](Self::resolve), but a missing identifier asks the
    /// registry for a fresh, server-generated session.
    pub async fn resolve_or_create(
        &self,
        user_id: i64,
        session_id: Option<&str>,
        title: Option<&str>,
    ) -> Result<String, QaError> {
        if session_id.is_some_and(|id| !id.trim().is_empty()) {
            return self.resolve(user_id, session_id, title).await;
        }

        let outcome = self
            .registry
            .create_session(user_id, None, resolve_title(title))
            .await;

        let result = match outcome {
            CreateSessionOutcome::Created(session) => Ok(session.id),
            // A generated identifier can't collide with anything the caller knows about.
            CreateSessionOutcome::Conflict => Err(QaError::Upstream(
                "Session registry reported a conflict for a generated session".to_string(),
            )),
            CreateSessionOutcome::Error(e) => Err(e.into()),
        };

        match &result {
            Ok(id) => {
                metrics::record_session_resolution(Resolution::Created.as_str());
                tracing::info!(user_id, session_id = %id, "Created server-generated session");
            }
            Err(e) => {
                metrics::record_session_resolution("failed");
                tracing::warn!(user_id, error = %e, "Server-generated session creation failed");
            }
        }
        result
    }

    async fn resolve_existing_or_create(
        &self,
        user_id: i64,
        session_id: &str,
        title: Option<&str>,
    ) -> Result<(String, Resolution), QaError> {
        match self.registry.find_session(user_id, session_id).await {
            Ok(Some(session)) if session.user_id == user_id => {
                return Ok((session_id.to_string(), Resolution::Reused));
            }
            Ok(Some(session)) => {
                tracing::warn!(
                    owner_id = session.user_id,
                    "Session belongs to another user"
                );
                return Err(QaError::Forbidden(format!(
                    "Session {} belongs to another user",
                    session_id
                )));
            }
            Ok(None) => {}
            // A timeout says nothing about existence; creating here could duplicate.
            Err(RegistryError::Timeout(msg)) => return Err(QaError::UpstreamTimeout(msg)),
            Err(e) => {
                tracing::warn!(error = %e, "Session lookup failed, attempting create");
            }
        }

        let outcome = self
            .registry
            .create_session(user_id, Some(session_id), resolve_title(title))
            .await;

        reconcile_creation(session_id, outcome)
    }
}
