use crate::models::Session;
use crate::services::store::{InsertOutcome, SessionStore};
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use service_core::error::AppError;

/// Process-local session store. The map entry lock is the compare-and-set.
#[derive(Default)]
pub struct MemorySessionStore {
    sessions: DashMap<String, Session>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn find(&self, session_id: &str) -> Result<Option<Session>, AppError> {
        Ok(self.sessions.get(session_id).map(|s| s.clone()))
    }

    async fn insert_if_absent(&self, session: Session) -> Result<InsertOutcome, AppError> {
        match self.sessions.entry(session.session_id.clone()) {
            Entry::Occupied(existing) => Ok(InsertOutcome::Exists(existing.get().clone())),
            Entry::Vacant(slot) => {
                slot.insert(session.clone());
                Ok(InsertOutcome::Inserted(session))
            }
        }
    }

    async fn health_check(&self) -> Result<(), AppError> {
        Ok(())
    }
}
