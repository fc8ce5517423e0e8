use crate::models::{ChatCompletionCommand, ChatHistoryRecord, HistoryMessage};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ChatCompletionRequest {
    #[validate(range(min = 1, message = "userId must be a positive integer"))]
    pub user_id: i64,

    /// Blank means "none supplied".
    #[validate(length(max = 64, message = "sessionId must be at most 64 characters"))]
    pub session_id: Option<String>,

    #[validate(length(max = 255, message = "sessionTitle must be at most 255 characters"))]
    pub session_title: Option<String>,

    #[validate(length(min = 1, message = "Question is required"))]
    pub question: String,

    #[serde(default)]
    #[validate(nested)]
    pub history: Vec<HistoryMessageDto>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct HistoryMessageDto {
    #[validate(custom(function = "validate_role"))]
    pub role: String,

    #[validate(length(min = 1, message = "History content is required"))]
    pub content: String,
}

fn validate_role(role: &str) -> Result<(), ValidationError> {
    match role.to_ascii_lowercase().as_str() {
        "user" | "assistant" => Ok(()),
        _ => Err(ValidationError::new("role")
            .with_message("role must be \"user\" or \"assistant\"".into())),
    }
}

impl ChatCompletionRequest {
    pub fn into_command(self) -> ChatCompletionCommand {
        let history = self
            .history
            .into_iter()
            .map(|m| HistoryMessage::new(m.role.to_ascii_lowercase(), m.content))
            .collect();

        let mut command = ChatCompletionCommand::new(
            self.user_id,
            self.session_id.as_deref(),
            self.question,
        )
        .with_history(history);

        if let Some(title) = self.session_title {
            command = command.with_title(title);
        }
        command
    }
}

/// A persisted chat turn as returned by the synchronous endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatHistoryResponse {
    pub id: Option<String>,
    pub session_id: String,
    pub user_id: i64,
    pub question: String,
    pub answer: Option<String>,
    pub prompt_tokens: Option<i32>,
    pub completion_tokens: Option<i32>,
    pub latency_ms: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<ChatHistoryRecord> for ChatHistoryResponse {
    fn from(record: ChatHistoryRecord) -> Self {
        Self {
            id: record.id,
            session_id: record.session_id,
            user_id: record.user_id,
            question: record.question,
            answer: record.answer,
            prompt_tokens: record.prompt_tokens,
            completion_tokens: record.completion_tokens,
            latency_ms: record.latency_ms,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}
