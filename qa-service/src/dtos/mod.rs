pub mod chat;

pub use chat::{ChatCompletionRequest, ChatHistoryResponse, HistoryMessageDto};
