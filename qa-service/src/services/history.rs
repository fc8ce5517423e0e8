//! Durable chat history.

use crate::error::QaError;
use crate::models::ChatHistoryRecord;
use async_trait::async_trait;
use service_core::error::AppError;
use std::sync::Arc;

/// Append-only store for completed chat turns.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Persist `record` and return it with its assigned id.
    async fn insert(&self, record: ChatHistoryRecord) -> Result<ChatHistoryRecord, AppError>;

    async fn health_check(&self) -> Result<(), AppError>;
}

/// Persists one record per finished turn.
#[derive(Clone)]
pub struct HistoryRecorder {
    store: Arc<dyn HistoryStore>,
}

impl HistoryRecorder {
    pub fn new(store: Arc<dyn HistoryStore>) -> Self {
        Self { store }
    }

    /// Write a completed turn. Writes are not retried.
    pub async fn record(&self, record: ChatHistoryRecord) -> Result<ChatHistoryRecord, QaError> {
        if !record.is_complete() {
            return Err(QaError::Persistence(
                "Refusing to persist a turn without an answer".to_string(),
            ));
        }

        let session_id = record.session_id.clone();
        let stored = self.store.insert(record).await.map_err(|e| {
            tracing::error!(session_id = %session_id, error = %e, "Failed to persist chat history");
            QaError::Persistence(e.to_string())
        })?;

        tracing::debug!(
            session_id = %stored.session_id,
            record_id = stored.id.as_deref().unwrap_or_default(),
            "Chat history persisted"
        );
        Ok(stored)
    }
}
