//! Domain models for the QA service.

pub mod command;
pub mod history;
pub mod session;

pub use command::{ChatCompletionCommand, HistoryMessage};
pub use history::ChatHistoryRecord;
pub use session::{ChatSession, CreateSessionOutcome, DEFAULT_SESSION_TITLE};
