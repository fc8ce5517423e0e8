//! Forwarding generated fragments to a streaming client.

use crate::error::QaError;
use crate::services::metrics;
use crate::services::providers::{GenerationStream, GenerationUsage, StreamChunk};
use futures::StreamExt;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

/// One record on the client-facing stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// Control record naming the resolved session. Always first.
    SessionId(String),
    /// A piece of the answer, in backend order.
    Content(String),
}

impl StreamEvent {
    /// Newline-terminated JSON. Content is written as a JSON string so
    /// fragments containing newlines survive framing.
    pub fn to_ndjson_line(&self) -> String {
        let mut line = match self {
            StreamEvent::SessionId(id) => format!(
                r#"{{"type":"session-id","sessionId":{}}}"#,
                Value::String(id.clone())
            ),
            StreamEvent::Content(text) => Value::String(text.clone()).to_string(),
        };
        line.push('\n');
        line
    }
}

/// What the client reads. An `Err` item ends the stream abnormally.
pub type ChatStream = ReceiverStream<Result<StreamEvent, QaError>>;

pub type StreamSender = mpsc::Sender<Result<StreamEvent, QaError>>;

/// Everything the client received as content, plus final usage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayOutcome {
    pub answer: String,
    pub usage: GenerationUsage,
}

#[derive(Debug)]
pub enum RelayEnd {
    /// Backend finished; the client has the whole answer.
    Completed(RelayOutcome),
    /// Backend failed mid-stream; the client saw a truncated stream.
    Failed { error: QaError, delivered: usize },
    /// The client went away; the backend stream was dropped.
    ClientDisconnected { delivered: usize },
}

/// Owns the client side of one turn's stream.
///
/// The channel is bounded, so a slow client stalls the relay, which in turn
/// stops pulling from the backend. Dropping the relay closes the client
/// stream.
pub struct StreamRelay {
    tx: StreamSender,
}

impl StreamRelay {
    pub fn new(tx: StreamSender) -> Self {
        Self { tx }
    }

    /// Send the session-id record, then every backend fragment in order.
    ///
    /// Consumes the relay: by the time this returns the client stream has
    /// ended, whatever the outcome.
    pub async fn run(self, session_id: &str, mut upstream: GenerationStream) -> RelayEnd {
        if self
            .tx
            .send(Ok(StreamEvent::SessionId(session_id.to_string())))
            .await
            .is_err()
        {
            return RelayEnd::ClientDisconnected { delivered: 0 };
        }

        let mut answer = String::new();
        let mut delivered = 0usize;
        let mut usage = GenerationUsage::default();

        while let Some(item) = upstream.next().await {
            match item {
                Ok(StreamChunk::Text(text)) => {
                    if text.is_empty() {
                        continue;
                    }
                    if self
                        .tx
                        .send(Ok(StreamEvent::Content(text.clone())))
                        .await
                        .is_err()
                    {
                        return RelayEnd::ClientDisconnected { delivered };
                    }
                    answer.push_str(&text);
                    delivered += 1;
                    metrics::record_fragment();
                }
                Ok(StreamChunk::Complete(final_usage)) => {
                    usage = final_usage;
                    break;
                }
                Err(e) => {
                    let error = QaError::from(e);
                    let _ = self.tx.send(Err(error.clone())).await;
                    return RelayEnd::Failed { error, delivered };
                }
            }
        }

        RelayEnd::Completed(RelayOutcome { answer, usage })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::providers::ProviderError;

    fn upstream(items: Vec<Result<StreamChunk, ProviderError>>) -> GenerationStream {
        Box::pin(tokio_stream::iter(items))
    }

    #[test]
    fn test_ndjson_lines() {
        assert_eq!(
            StreamEvent::SessionId("s1".into()).to_ndjson_line(),
            "{\"type\":\"session-id\",\"sessionId\":\"s1\"}\n"
        );
        assert_eq!(
            StreamEvent::Content("a\nb \"c\"".into()).to_ndjson_line(),
            "\"a\\nb \\\"c\\\"\"\n"
        );
    }

    #[tokio::test]
    async fn test_relay_forwards_in_order_and_accumulates() {
        let (tx, mut rx) = mpsc::channel(8);
        let end = StreamRelay::new(tx)
            .run(
                "s1",
                upstream(vec![
                    Ok(StreamChunk::Text("Hel".into())),
                    Ok(StreamChunk::Text(String::new())),
                    Ok(StreamChunk::Text("lo".into())),
                    Ok(StreamChunk::Complete(GenerationUsage {
                        prompt_tokens: Some(2),
                        completion_tokens: Some(2),
                        latency_ms: Some(5),
                    })),
                ]),
            )
            .await;

        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event.unwrap());
        }
        assert_eq!(
            events,
            vec![
                StreamEvent::SessionId("s1".into()),
                StreamEvent::Content("Hel".into()),
                StreamEvent::Content("lo".into()),
            ]
        );

        match end {
            RelayEnd::Completed(outcome) => {
                assert_eq!(outcome.answer, "Hello");
                assert_eq!(outcome.usage.completion_tokens, Some(2));
            }
            other => panic!("unexpected relay end: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_relay_reports_disconnect() {
        let (tx, rx) = mpsc::channel(8);
        drop(rx);

        let end = StreamRelay::new(tx)
            .run("s1", upstream(vec![Ok(StreamChunk::Text("x".into()))]))
            .await;

        assert!(matches!(end, RelayEnd::ClientDisconnected { delivered: 0 }));
    }
}
