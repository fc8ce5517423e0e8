//! Input to one chat turn.

/// A prior exchange forwarded to the generation backend, in conversation order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryMessage {
    /// Role: "user" or "assistant".
    pub role: String,
    pub content: String,
}

impl HistoryMessage {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChatCompletionCommand {
    /// Caller, already checked against the gateway-asserted identity.
    pub user_id: i64,
    pub session_id: Option<String>,
    pub session_title: Option<String>,
    pub question: String,
    pub history: Vec<HistoryMessage>,
}

impl ChatCompletionCommand {
    pub fn new(user_id: i64, session_id: Option<&str>, question: impl Into<String>) -> Self {
        Self {
            user_id,
            session_id: session_id.map(str::to_string),
            session_title: None,
            question: question.into(),
            history: Vec::new(),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.session_title = Some(title.into());
        self
    }

    pub fn with_history(mut self, history: Vec<HistoryMessage>) -> Self {
        self.history = history;
        self
    }

    /// The supplied session id, with blank values treated as absent.
    pub fn requested_session_id(&self) -> Option<&str> {
        self.session_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_session_id_is_absent() {
        assert_eq!(
            ChatCompletionCommand::new(7, Some("   "), "q").requested_session_id(),
            None
        );
        assert_eq!(
            ChatCompletionCommand::new(7, None, "q").requested_session_id(),
            None
        );
        assert_eq!(
            ChatCompletionCommand::new(7, Some(" s1 "), "q").requested_session_id(),
            Some("s1")
        );
    }
}
