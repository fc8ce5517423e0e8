//! Sessions as seen from the QA side of the session registry.

use crate::services::registry::RegistryError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Title given to sessions created without one.
pub const DEFAULT_SESSION_TITLE: &str = "New Conversation";

/// A chat session owned by the session registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSession {
    pub id: String,
    pub user_id: i64,
    pub title: String,
    pub created_at: DateTime<Utc>,
}

/// Result of asking the registry to create a session.
#[derive(Debug)]
pub enum CreateSessionOutcome {
    Created(ChatSession),
    /// The identifier already exists for this user.
    Conflict,
    Error(RegistryError),
}
