//! Generation backend abstractions and implementations.
//!
//! The orchestrator only sees [`GenerationBackend`]; Gemini is the production
//! backend and the mock backend serves local runs and tests.

pub mod gemini;
pub mod mock;

use crate::models::HistoryMessage;
use async_trait::async_trait;
use std::pin::Pin;
use thiserror::Error;
use tokio_stream::Stream;

/// Error type for provider operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("API error: {0}")]
    ApiError(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Rate limited")]
    RateLimited,

    #[error("Content filtered")]
    ContentFiltered,

    #[error("Network error: {0}")]
    NetworkError(String),
}

/// Usage summary reported once a generation finishes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GenerationUsage {
    pub prompt_tokens: Option<i32>,
    pub completion_tokens: Option<i32>,
    pub latency_ms: Option<i64>,
}

/// A complete, non-streamed answer.
#[derive(Debug, Clone)]
pub struct Generation {
    pub answer: String,
    pub usage: GenerationUsage,
}

/// Stream chunk for streaming responses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamChunk {
    /// Text fragment.
    Text(String),

    /// Final usage stats; last item of a successful stream.
    Complete(GenerationUsage),
}

/// Type alias for provider streams.
pub type GenerationStream =
    Pin<Box<dyn Stream<Item = Result<StreamChunk, ProviderError>> + Send>>;

#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Short name used in logs and metrics.
    fn name(&self) -> &'static str;

    /// Generate a complete answer.
    async fn generate(
        &self,
        question: &str,
        history: &[HistoryMessage],
    ) -> Result<Generation, ProviderError>;

    /// Generate an answer as a lazy sequence of fragments.
    async fn generate_stream(
        &self,
        question: &str,
        history: &[HistoryMessage],
    ) -> Result<GenerationStream, ProviderError>;

    /// Health check.
    async fn health_check(&self) -> Result<(), ProviderError>;
}
