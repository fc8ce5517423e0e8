//! Gemini generation backend.
//!
//! Calls Google's Gemini API, forwarding prior conversation turns as
//! `contents`. Supports both streaming (SSE) and non-streaming responses.

use super::{
    Generation, GenerationBackend, GenerationStream, GenerationUsage, ProviderError, StreamChunk,
};
use crate::models::HistoryMessage;
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

/// Gemini API base URL.
const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Gemini provider configuration.
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: String,
    pub model: String,
}

pub struct GeminiBackend {
    config: GeminiConfig,
    client: Client,
}

impl GeminiBackend {
    pub fn new(config: GeminiConfig) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .map_err(|e| {
                ProviderError::NotConfigured(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self { config, client })
    }

    /// Build the API URL for the given model and method.
    fn api_url(&self, method: &str) -> String {
        format!(
            "{}/models/{}:{}?key={}",
            GEMINI_API_BASE, self.config.model, method, self.config.api_key
        )
    }

    fn build_request(question: &str, history: &[HistoryMessage]) -> GenerateContentRequest {
        let mut contents: Vec<Content> = history
            .iter()
            .filter(|m| !m.content.trim().is_empty())
            .map(|m| Content {
                role: Some(gemini_role(&m.role).to_string()),
                parts: vec![ContentPart::Text {
                    text: m.content.clone(),
                }],
            })
            .collect();

        contents.push(Content {
            role: Some("user".to_string()),
            parts: vec![ContentPart::Text {
                text: question.to_string(),
            }],
        });

        GenerateContentRequest { contents }
    }

    async fn send(
        &self,
        url: &str,
        request: &GenerateContentRequest,
    ) -> Result<reqwest::Response, ProviderError> {
        let response = self
            .client
            .post(url)
            .json(request)
            .send()
            .await
            .map_err(|e| ProviderError::NetworkError(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();

            if status.as_u16() == 429 {
                return Err(ProviderError::RateLimited);
            }

            return Err(ProviderError::ApiError(format!(
                "Gemini API error {}: {}",
                status, error_text
            )));
        }

        Ok(response)
    }
}

/// Gemini names the assistant side of a conversation "model".
fn gemini_role(role: &str) -> &'static str {
    match role.to_ascii_lowercase().as_str() {
        "assistant" | "model" | "ai" => "model",
        _ => "user",
    }
}

/// Incremental SSE decoder over raw body bytes.
///
/// Bytes are buffered until a blank line closes an event, so a UTF-8
/// character or a CRLF pair split across network chunks is only decoded
/// once whole.
#[derive(Debug, Default)]
struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    /// Append `chunk` and return the data payload of every completed event.
    fn push(&mut self, chunk: &[u8]) -> Result<Vec<String>, ProviderError> {
        self.buffer.extend_from_slice(chunk);

        let mut events = Vec::new();
        while let Some(end) = event_end(&self.buffer) {
            let event: Vec<u8> = self.buffer.drain(..end).collect();
            if let Some(data) = event_data(&event)? {
                events.push(data);
            }
        }
        Ok(events)
    }

    /// Decode whatever is left once the body ends without a closing blank line.
    fn finish(self) -> Result<Option<String>, ProviderError> {
        event_data(&self.buffer)
    }
}

/// Offset just past the blank line ending the first complete event.
fn event_end(buffer: &[u8]) -> Option<usize> {
    buffer.iter().enumerate().find_map(|(i, &byte)| {
        if byte != b'\n' {
            return None;
        }
        match &buffer[i + 1..] {
            [b'\n', ..] => Some(i + 2),
            [b'\r', b'\n', ..] => Some(i + 3),
            _ => None,
        }
    })
}

fn event_data(event: &[u8]) -> Result<Option<String>, ProviderError> {
    let event = std::str::from_utf8(event)
        .map_err(|e| ProviderError::ApiError(format!("Invalid UTF-8 in SSE event: {}", e)))?;
    let data: Vec<&str> = event
        .lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(str::trim_start)
        .collect();
    Ok((!data.is_empty()).then(|| data.join("\n")))
}

impl GenerateContentResponse {
    fn text(&self) -> String {
        self.candidates
            .first()
            .map(|c| {
                c.content
                    .parts
                    .iter()
                    .map(|ContentPart::Text { text }| text.as_str())
                    .collect::<String>()
            })
            .unwrap_or_default()
    }

    fn is_filtered(&self) -> bool {
        self.candidates
            .first()
            .and_then(|c| c.finish_reason.as_deref())
            == Some("SAFETY")
    }
}

/// Parse one SSE payload and pass its text on. Returns false once the
/// stream should stop, either on an error already sent or because the
/// consumer went away.
async fn forward_event(
    data: &str,
    usage: &mut GenerationUsage,
    tx: &mpsc::Sender<Result<StreamChunk, ProviderError>>,
) -> bool {
    let response = match serde_json::from_str::<GenerateContentResponse>(data) {
        Ok(response) => response,
        Err(e) => {
            tracing::warn!(data_len = data.len(), error = %e, "Unparseable SSE event");
            let _ = tx
                .send(Err(ProviderError::ApiError(format!(
                    "Failed to parse stream event: {}",
                    e
                ))))
                .await;
            return false;
        }
    };

    if let Some(metadata) = &response.usage_metadata {
        usage.prompt_tokens = metadata.prompt_token_count;
        usage.completion_tokens = metadata.candidates_token_count;
    }

    if response.is_filtered() {
        let _ = tx.send(Err(ProviderError::ContentFiltered)).await;
        return false;
    }

    let text = response.text();
    // A failed send means the consumer is gone; dropping the body closes the upstream call.
    text.is_empty() || tx.send(Ok(StreamChunk::Text(text))).await.is_ok()
}

#[async_trait]
impl GenerationBackend for GeminiBackend {
    fn name(&self) -> &'static str {
        "gemini"
    }

    async fn generate(
        &self,
        question: &str,
        history: &[HistoryMessage],
    ) -> Result<Generation, ProviderError> {
        let started = Instant::now();
        let request = Self::build_request(question, history);
        let url = self.api_url("generateContent");

        tracing::debug!(
            model = %self.config.model,
            question_len = question.len(),
            history_len = history.len(),
            "Sending request to Gemini API"
        );

        let response = self.send(&url, &request).await?;

        let api_response: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::ApiError(format!("Failed to parse response: {}", e)))?;

        if api_response.is_filtered() {
            return Err(ProviderError::ContentFiltered);
        }

        let usage = api_response.usage_metadata.clone().unwrap_or_default();

        Ok(Generation {
            answer: api_response.text(),
            usage: GenerationUsage {
                prompt_tokens: usage.prompt_token_count,
                completion_tokens: usage.candidates_token_count,
                latency_ms: Some(started.elapsed().as_millis() as i64),
            },
        })
    }

    async fn generate_stream(
        &self,
        question: &str,
        history: &[HistoryMessage],
    ) -> Result<GenerationStream, ProviderError> {
        let started = Instant::now();
        let request = Self::build_request(question, history);
        let url = format!("{}&alt=sse", self.api_url("streamGenerateContent"));

        tracing::debug!(
            model = %self.config.model,
            question_len = question.len(),
            history_len = history.len(),
            "Starting streaming request to Gemini API"
        );

        let response = self.send(&url, &request).await?;

        let (tx, rx) = mpsc::channel(32);

        tokio::spawn(async move {
            let mut stream = response.bytes_stream();
            let mut decoder = SseDecoder::default();
            let mut usage = GenerationUsage::default();

            while let Some(chunk_result) = stream.next().await {
                let events = match chunk_result
                    .map_err(|e| ProviderError::NetworkError(e.to_string()))
                    .and_then(|chunk| decoder.push(&chunk))
                {
                    Ok(events) => events,
                    Err(e) => {
                        let _ = tx.send(Err(e)).await;
                        return;
                    }
                };

                for data in events {
                    if !forward_event(&data, &mut usage, &tx).await {
                        return;
                    }
                }
            }

            match decoder.finish() {
                Ok(Some(data)) => {
                    if !forward_event(&data, &mut usage, &tx).await {
                        return;
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    let _ = tx.send(Err(e)).await;
                    return;
                }
            }

            usage.latency_ms = Some(started.elapsed().as_millis() as i64);
            let _ = tx.send(Ok(StreamChunk::Complete(usage))).await;
        });

        Ok(Box::pin(ReceiverStream::new(rx)) as GenerationStream)
    }

    async fn health_check(&self) -> Result<(), ProviderError> {
        if self.config.api_key.is_empty() {
            return Err(ProviderError::NotConfigured(
                "Gemini API key not configured".to_string(),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// Gemini API Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<ContentPart>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum ContentPart {
    Text { text: String },
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Content,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    prompt_token_count: Option<i32>,
    candidates_token_count: Option<i32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_history_roles_are_mapped() {
        let history = vec![
            HistoryMessage::new("user", "hi"),
            HistoryMessage::new("assistant", "hello"),
            HistoryMessage::new("user", "   "),
        ];
        let request = GeminiBackend::build_request("2+2?", &history);

        let roles: Vec<_> = request
            .contents
            .iter()
            .map(|c| c.role.as_deref().unwrap())
            .collect();
        assert_eq!(roles, vec!["user", "model", "user"]);

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["contents"][2]["parts"][0]["text"], "2+2?");
    }

    #[test]
    fn test_sse_decoder_keeps_partial_tail() {
        let mut decoder = SseDecoder::default();
        let events = decoder
            .push(b"data: {\"a\":1}\n\ndata: {\"b\":2}\n\ndata: {\"c\"")
            .unwrap();

        assert_eq!(events, vec!["{\"a\":1}", "{\"b\":2}"]);
        assert_eq!(decoder.buffer, b"data: {\"c\"");
    }

    fn text_event(text: &str) -> String {
        format!(
            "data: {{\"candidates\":[{{\"content\":{{\"parts\":[{{\"text\":\"{}\"}}]}}}}]}}\r\n\r\n",
            text
        )
    }

    fn decode_split(body: &[u8], splits: &[usize]) -> Vec<String> {
        let mut decoder = SseDecoder::default();
        let mut texts = Vec::new();
        let mut from = 0;
        for &at in splits.iter().chain(std::iter::once(&body.len())) {
            for data in decoder.push(&body[from..at]).unwrap() {
                let response: GenerateContentResponse = serde_json::from_str(&data).unwrap();
                texts.push(response.text());
            }
            from = at;
        }
        assert!(decoder.finish().unwrap().is_none());
        texts
    }

    #[test]
    fn test_sse_decoder_handles_split_crlf_terminator() {
        let body = format!("{}{}", text_event("中文"), text_event("B"));
        let bytes = body.as_bytes();
        // Cut between the '\r' and '\n' of the first event's closing blank line.
        let first_len = text_event("中文").len();

        assert_eq!(decode_split(bytes, &[first_len - 1]), vec!["中文", "B"]);
        assert_eq!(decode_split(bytes, &[first_len - 3]), vec!["中文", "B"]);
    }

    #[test]
    fn test_sse_decoder_handles_split_multibyte_char() {
        let body = format!("{}{}", text_event("中文"), text_event("B"));
        let bytes = body.as_bytes();
        let inside_char = body.find('中').unwrap() + 1;

        assert_eq!(decode_split(bytes, &[inside_char]), vec!["中文", "B"]);

        let every_byte: Vec<usize> = (1..bytes.len()).collect();
        assert_eq!(decode_split(bytes, &every_byte), vec!["中文", "B"]);
    }

    #[test]
    fn test_sse_decoder_flushes_unterminated_event() {
        let mut decoder = SseDecoder::default();
        assert!(decoder.push(b"data: {\"x\":1}").unwrap().is_empty());
        assert_eq!(decoder.finish().unwrap().as_deref(), Some("{\"x\":1}"));
    }

    #[tokio::test]
    async fn test_unparseable_event_is_an_error() {
        let (tx, mut rx) = mpsc::channel(1);
        let mut usage = GenerationUsage::default();

        assert!(!forward_event("{not json", &mut usage, &tx).await);
        assert!(matches!(
            rx.recv().await,
            Some(Err(ProviderError::ApiError(_)))
        ));
    }

    #[test]
    fn test_response_text_joins_parts() {
        let response: GenerateContentResponse = serde_json::from_str(
            r#"{"candidates":[{"content":{"role":"model","parts":[{"text":"Hel"},{"text":"lo"}]}}],
                "usageMetadata":{"promptTokenCount":4,"candidatesTokenCount":2}}"#,
        )
        .unwrap();

        assert_eq!(response.text(), "Hello");
        assert!(!response.is_filtered());
        assert_eq!(
            response.usage_metadata.unwrap().candidates_token_count,
            Some(2)
        );
    }
}
