//! Chat history record persisted once per turn.

use crate::services::providers::GenerationUsage;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One question/answer exchange with its usage metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatHistoryRecord {
    /// Assigned by the store on insert.
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    pub session_id: String,

    pub user_id: i64,

    pub question: String,

    /// Empty until generation finishes.
    pub answer: Option<String>,

    pub prompt_tokens: Option<i32>,

    pub completion_tokens: Option<i32>,

    pub latency_ms: Option<i64>,

    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,

    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub updated_at: DateTime<Utc>,
}

impl ChatHistoryRecord {
    /// Start a turn: the question is known, the answer is not.
    pub fn begin(session_id: String, user_id: i64, question: String) -> Self {
        let now = Utc::now();
        Self {
            id: None,
            session_id,
            user_id,
            question,
            answer: None,
            prompt_tokens: None,
            completion_tokens: None,
            latency_ms: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Fill in the generated answer and its metrics.
    pub fn record_answer(&mut self, answer: String, usage: GenerationUsage) {
        self.answer = Some(answer);
        self.prompt_tokens = usage.prompt_tokens;
        self.completion_tokens = usage.completion_tokens;
        self.latency_ms = usage.latency_ms;
        self.updated_at = Utc::now();
    }

    pub fn is_complete(&self) -> bool {
        self.answer.is_some()
    }
}
