//! Mock generation backend for local runs and tests.

use super::{
    Generation, GenerationBackend, GenerationStream, GenerationUsage, ProviderError, StreamChunk,
};
use crate::models::HistoryMessage;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

/// Produces either a fixed script of fragments or an echo of the question.
///
/// Fragments are handed over one at a time through a capacity-1 channel, so
/// the backend never runs ahead of its consumer and stops producing as soon
/// as the consumer goes away.
#[derive(Clone, Default)]
pub struct MockGenerationBackend {
    script: Option<Vec<String>>,
    fail_after: Option<usize>,
    chunk_delay: Option<Duration>,
    produced: Arc<AtomicUsize>,
}

impl MockGenerationBackend {
    /// Echo backend: answers with the question split into words.
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer every question with exactly these fragments.
    pub fn scripted<I, S>(chunks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            script: Some(chunks.into_iter().map(Into::into).collect()),
            ..Self::default()
        }
    }

    /// Fail with a network error once `n` fragments have been produced.
    pub fn failing_after(mut self, n: usize) -> Self {
        self.fail_after = Some(n);
        self
    }

    /// Pause before each fragment.
    pub fn with_chunk_delay(mut self, delay: Duration) -> Self {
        self.chunk_delay = Some(delay);
        self
    }

    /// Fragments produced so far, across all calls.
    pub fn produced(&self) -> usize {
        self.produced.load(Ordering::SeqCst)
    }

    fn fragments(&self, question: &str) -> Vec<String> {
        match &self.script {
            Some(script) => script.clone(),
            None => {
                let mut fragments = vec!["Mock answer for:".to_string()];
                fragments.extend(question.split_whitespace().map(|w| format!(" {}", w)));
                fragments
            }
        }
    }

    fn usage(question: &str, fragments: &[String], started: Instant) -> GenerationUsage {
        GenerationUsage {
            prompt_tokens: Some((question.len() / 4) as i32),
            completion_tokens: Some(fragments.len() as i32),
            latency_ms: Some(started.elapsed().as_millis() as i64),
        }
    }

    fn failure() -> ProviderError {
        ProviderError::NetworkError("mock backend failure".to_string())
    }
}

#[async_trait]
impl GenerationBackend for MockGenerationBackend {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn generate(
        &self,
        question: &str,
        _history: &[HistoryMessage],
    ) -> Result<Generation, ProviderError> {
        let started = Instant::now();
        let fragments = self.fragments(question);

        if let Some(delay) = self.chunk_delay {
            tokio::time::sleep(delay * fragments.len() as u32).await;
        }
        if let Some(n) = self.fail_after {
            self.produced
                .fetch_add(n.min(fragments.len()), Ordering::SeqCst);
            return Err(Self::failure());
        }
        self.produced.fetch_add(fragments.len(), Ordering::SeqCst);

        Ok(Generation {
            answer: fragments.concat(),
            usage: Self::usage(question, &fragments, started),
        })
    }

    async fn generate_stream(
        &self,
        question: &str,
        _history: &[HistoryMessage],
    ) -> Result<GenerationStream, ProviderError> {
        let started = Instant::now();
        let fragments = self.fragments(question);
        let usage_question = question.to_string();
        let fail_after = self.fail_after;
        let chunk_delay = self.chunk_delay;
        let produced = Arc::clone(&self.produced);

        let (tx, rx) = mpsc::channel(1);

        tokio::spawn(async move {
            for (index, fragment) in fragments.iter().enumerate() {
                if fail_after == Some(index) {
                    let _ = tx.send(Err(Self::failure())).await;
                    return;
                }
                if let Some(delay) = chunk_delay {
                    tokio::time::sleep(delay).await;
                }
                if tx.send(Ok(StreamChunk::Text(fragment.clone()))).await.is_err() {
                    return;
                }
                produced.fetch_add(1, Ordering::SeqCst);
            }

            if fail_after.is_some_and(|n| n >= fragments.len()) {
                let _ = tx.send(Err(Self::failure())).await;
                return;
            }

            let usage = Self::usage(&usage_question, &fragments, started);
            let _ = tx.send(Ok(StreamChunk::Complete(usage))).await;
        });

        Ok(Box::pin(ReceiverStream::new(rx)) as GenerationStream)
    }

    async fn health_check(&self) -> Result<(), ProviderError> {
        Ok(())
    }
}
