//! The per-turn request core.
//!
//! Synchronous turns persist before answering. Streamed turns hand the
//! client a channel fed by a [`StreamRelay`] task; once that task has closed
//! the client stream it queues the finished record on the persistence pool.

use crate::error::QaError;
use crate::models::{ChatCompletionCommand, ChatHistoryRecord};
use crate::services::coordinator::SessionCoordinator;
use crate::services::history::HistoryRecorder;
use crate::services::metrics;
use crate::services::providers::GenerationBackend;
use crate::services::relay::{ChatStream, RelayEnd, StreamRelay};
use crate::workers::PersistenceHandle;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::Instrument;

#[derive(Clone)]
pub struct ChatOrchestrator {
    coordinator: SessionCoordinator,
    backend: Arc<dyn GenerationBackend>,
    recorder: HistoryRecorder,
    persistence: PersistenceHandle,
    stream_buffer: usize,
}

impl ChatOrchestrator {
    pub fn new(
        coordinator: SessionCoordinator,
        backend: Arc<dyn GenerationBackend>,
        recorder: HistoryRecorder,
        persistence: PersistenceHandle,
        stream_buffer: usize,
    ) -> Self {
        Self {
            coordinator,
            backend,
            recorder,
            persistence,
            stream_buffer: stream_buffer.max(1),
        }
    }

    /// Answer one turn and return the persisted record.
    ///
    /// A blank session id gets a server-generated session. Nothing is
    /// persisted when generation fails, and a failed write fails the turn.
    pub async fn complete(
        &self,
        command: ChatCompletionCommand,
    ) -> Result<ChatHistoryRecord, QaError> {
        let result = self.complete_turn(command).await;
        metrics::record_chat_turn("sync", outcome_label(&result));
        result
    }

    /// Start a streamed turn.
    ///
    /// Session resolution and opening the backend stream happen before this
    /// returns, so any failure there produces no stream at all. The returned
    /// stream yields the session-id record first, then content.
    pub async fn complete_stream(
        &self,
        command: ChatCompletionCommand,
    ) -> Result<ChatStream, QaError> {
        let result = self.start_stream(command).await;
        if let Err(e) = &result {
            metrics::record_chat_turn("stream", e.kind());
        }
        result
    }

    async fn complete_turn(
        &self,
        command: ChatCompletionCommand,
    ) -> Result<ChatHistoryRecord, QaError> {
        validate(&command, false)?;

        let session_id = self
            .coordinator
            .resolve_or_create(
                command.user_id,
                command.requested_session_id(),
                command.session_title.as_deref(),
            )
            .await?;

        let mut record = ChatHistoryRecord::begin(session_id, command.user_id, command.question);

        let generation = self
            .backend
            .generate(&record.question, &command.history)
            .await
            .map_err(|e| {
                tracing::warn!(
                    session_id = %record.session_id,
                    backend = self.backend.name(),
                    error = %e,
                    "Generation failed"
                );
                QaError::from(e)
            })?;

        metrics::record_generation_latency(generation.usage.latency_ms);
        record.record_answer(generation.answer, generation.usage);

        match self.recorder.record(record).await {
            Ok(stored) => {
                metrics::record_history_write("sync", "ok");
                Ok(stored)
            }
            Err(e) => {
                metrics::record_history_write("sync", "failed");
                Err(e)
            }
        }
    }

    async fn start_stream(&self, command: ChatCompletionCommand) -> Result<ChatStream, QaError> {
        validate(&command, true)?;

        let session_id = self
            .coordinator
            .resolve(
                command.user_id,
                command.requested_session_id(),
                command.session_title.as_deref(),
            )
            .await?;

        let mut record = ChatHistoryRecord::begin(session_id, command.user_id, command.question);

        let upstream = self
            .backend
            .generate_stream(&record.question, &command.history)
            .await
            .map_err(|e| {
                tracing::warn!(
                    session_id = %record.session_id,
                    backend = self.backend.name(),
                    error = %e,
                    "Failed to open generation stream"
                );
                QaError::from(e)
            })?;

        let (tx, rx) = mpsc::channel(self.stream_buffer);
        let persistence = self.persistence.clone();
        let span = tracing::info_span!(
            "stream_relay",
            session_id = %record.session_id,
            user_id = record.user_id
        );

        // Tracked so shutdown drains this turn's record after the stream closes.
        self.persistence.spawn_producer(
            async move {
                let session_id = record.session_id.clone();
                // The relay owns the only sender; once `run` returns the client stream is closed.
                let end = StreamRelay::new(tx).run(&session_id, upstream).await;

                match end {
                    RelayEnd::Completed(outcome) => {
                        metrics::record_chat_turn("stream", "ok");
                        metrics::record_generation_latency(outcome.usage.latency_ms);
                        record.record_answer(outcome.answer, outcome.usage);

                        if let Err(e) = persistence.submit(record).await {
                            metrics::record_history_write("stream", "failed");
                            tracing::error!(error = %e, "Could not queue chat history");
                        }
                    }
                    RelayEnd::Failed { error, delivered } => {
                        metrics::record_chat_turn("stream", error.kind());
                        tracing::warn!(
                            delivered,
                            error = %error,
                            "Generation failed mid-stream, turn not persisted"
                        );
                    }
                    RelayEnd::ClientDisconnected { delivered } => {
                        metrics::record_chat_turn("stream", "client_disconnected");
                        tracing::info!(delivered, "Client disconnected, turn not persisted");
                    }
                }
            }
            .instrument(span),
        );

        Ok(ReceiverStream::new(rx))
    }
}

fn validate(command: &ChatCompletionCommand, streaming: bool) -> Result<(), QaError> {
    if command.user_id <= 0 {
        return Err(QaError::Validation(
            "userId must be a positive integer".to_string(),
        ));
    }
    if command.question.trim().is_empty() {
        return Err(QaError::Validation("question is required".to_string()));
    }
    if streaming && command.requested_session_id().is_none() {
        return Err(QaError::Validation(
            "sessionId is required for streaming".to_string(),
        ));
    }
    Ok(())
}

fn outcome_label<T>(result: &Result<T, QaError>) -> &'static str {
    match result {
        Ok(_) => "ok",
        Err(e) => e.kind(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate() {
        let ok = ChatCompletionCommand::new(7, Some("s1"), "2+2?");
        assert!(validate(&ok, true).is_ok());

        let no_session = ChatCompletionCommand::new(7, Some("  "), "2+2?");
        assert!(validate(&no_session, false).is_ok());
        assert!(matches!(
            validate(&no_session, true),
            Err(QaError::Validation(_))
        ));

        let blank_question = ChatCompletionCommand::new(7, Some("s1"), " ");
        assert!(matches!(
            validate(&blank_question, false),
            Err(QaError::Validation(_))
        ));

        let bad_user = ChatCompletionCommand::new(0, Some("s1"), "q");
        assert!(matches!(
            validate(&bad_user, false),
            Err(QaError::Validation(_))
        ));
    }
}
