use crate::models::Session;
use async_trait::async_trait;
use service_core::error::AppError;

/// Result of an insert that must not overwrite.
#[derive(Debug, Clone, PartialEq)]
pub enum InsertOutcome {
    Inserted(Session),
    /// A session with this id was already there; it is returned unchanged.
    Exists(Session),
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn find(&self, session_id: &str) -> Result<Option<Session>, AppError>;

    /// Insert `session` unless its id is taken. Concurrent calls for the
    /// same id see exactly one `Inserted`.
    async fn insert_if_absent(&self, session: Session) -> Result<InsertOutcome, AppError>;

    async fn health_check(&self) -> Result<(), AppError>;
}
