//! OpenAI-compatible Providers
//!
//! Text completion and speech synthesis against any server speaking the
//! OpenAI REST dialect.
//!
//! # API
//!
//! - `/chat/completions` - Chat completions; with `"stream": true` the body is
//!   server-sent events: `data: {json}` lines terminated by `data: [DONE]`
//! - `/audio/speech` - Text-to-speech, binary audio response
//!
//! Vision requests attach the image as an `image_url` content part on the
//! last user turn.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::{json, Value};
use tokio::sync::mpsc;

use super::traits::{
    AudioClip, ChatRole, LlmBackend, LlmRequest, LlmResponse, SpeechRequest, SpeechSynthesizer,
    StreamingToken,
};
use super::{http_client, require_key, send_checked};
use crate::error::ProviderError;

const PROVIDER: &str = "OpenAI";
const SPEECH_PROVIDER: &str = "OpenAI TTS";

/// OpenAI-compatible chat completion client
#[derive(Clone)]
pub struct OpenAiBackend {
    /// Base URL including the version prefix (e.g. `https://api.openai.com/v1`)
    base_url: String,
    /// Bearer token
    api_key: Option<String>,
    /// HTTP client
    http_client: reqwest::Client,
}

/// Accumulates raw stream bytes and yields complete lines
///
/// Chunks may split a multi-byte character, so bytes are only decoded once
/// the line they belong to is complete.
#[derive(Debug, Default)]
struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    fn extend(&mut self, bytes: &[u8]) {
        self.pending.extend_from_slice(bytes);
    }

    fn next_line(&mut self) -> Option<String> {
        let pos = self.pending.iter().position(|&b| b == b'\n')?;
        let line: Vec<u8> = self.pending.drain(..=pos).collect();
        Some(String::from_utf8_lossy(&line).trim().to_string())
    }
}

/// One parsed server-sent event line
#[derive(Debug, PartialEq, Eq)]
enum SseLine {
    /// A content delta
    Delta(String),
    /// `[DONE]`
    Done,
    /// Keep-alives, role-only deltas, comments
    Skip,
}

fn parse_sse_line(line: &str) -> Result<SseLine, ProviderError> {
    let Some(data) = line.strip_prefix("data:") else {
        return Ok(SseLine::Skip);
    };
    let data = data.trim();
    if data == "[DONE]" {
        return Ok(SseLine::Done);
    }
    if data.is_empty() {
        return Ok(SseLine::Skip);
    }

    let value: Value =
        serde_json::from_str(data).map_err(|e| ProviderError::transport(PROVIDER, e))?;

    if let Some(message) = value.pointer("/error/message").and_then(Value::as_str) {
        return Err(ProviderError::InvalidRequest {
            provider: PROVIDER.to_string(),
            detail: message.to_string(),
        });
    }

    Ok(value
        .pointer("/choices/0/delta/content")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map_or(SseLine::Skip, |s| SseLine::Delta(s.to_string())))
}

impl OpenAiBackend {
    /// Create a new backend
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            http_client: http_client(PROVIDER, timeout)?,
        })
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    /// Build the `messages` array, attaching the image to the last user turn
    fn build_messages(request: &LlmRequest) -> Vec<Value> {
        let mut messages = Vec::with_capacity(request.turns.len() + 1);

        if let Some(ref system) = request.system {
            messages.push(json!({ "role": "system", "content": system }));
        }

        let last_user = request
            .turns
            .iter()
            .rposition(|turn| turn.role == ChatRole::User);

        for (index, turn) in request.turns.iter().enumerate() {
            let role = match turn.role {
                ChatRole::System => "system",
                ChatRole::User => "user",
                ChatRole::Assistant => "assistant",
            };

            match (&request.image, Some(index) == last_user) {
                (Some(image), true) => messages.push(json!({
                    "role": role,
                    "content": [
                        { "type": "text", "text": turn.content },
                        { "type": "image_url", "image_url": { "url": image.as_str() } },
                    ],
                })),
                _ => messages.push(json!({ "role": role, "content": turn.content })),
            }
        }

        messages
    }

    fn build_body(request: &LlmRequest, stream: bool) -> Value {
        let mut body = json!({
            "model": request.model,
            "messages": Self::build_messages(request),
            "temperature": request.temperature,
            "stream": stream,
        });
        if request.max_tokens > 0 {
            body["max_tokens"] = json!(request.max_tokens);
        }
        body
    }
}

#[async_trait]
impl LlmBackend for OpenAiBackend {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn health_check(&self) -> bool {
        let Some(key) = self.api_key.as_deref() else {
            return false;
        };
        self.http_client
            .get(format!("{}/models", self.base_url))
            .bearer_auth(key)
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .is_ok_and(|r| r.status().is_success())
    }

    async fn send_streaming(
        &self,
        request: &LlmRequest,
    ) -> Result<mpsc::Receiver<StreamingToken>, ProviderError> {
        let key = require_key(PROVIDER, self.api_key.as_deref())?;
        let (tx, rx) = mpsc::channel(100);

        let response = send_checked(
            PROVIDER,
            self.http_client
                .post(self.completions_url())
                .bearer_auth(key)
                .json(&Self::build_body(request, true)),
        )
        .await?;

        let mut stream = response.bytes_stream();

        // Spawn task to process stream
        tokio::spawn(async move {
            let mut lines = LineBuffer::default();
            let mut full_response = String::new();

            while let Some(chunk) = stream.next().await {
                let bytes = match chunk {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        let _ = tx
                            .send(StreamingToken::Error(ProviderError::transport(PROVIDER, e)))
                            .await;
                        return;
                    }
                };
                lines.extend(&bytes);

                while let Some(line) = lines.next_line() {
                    match parse_sse_line(&line) {
                        Ok(SseLine::Delta(text)) => {
                            full_response.push_str(&text);
                            if tx.send(StreamingToken::Token(text)).await.is_err() {
                                // Receiver dropped, stop streaming
                                return;
                            }
                        }
                        Ok(SseLine::Done) => {
                            let _ = tx
                                .send(StreamingToken::Complete {
                                    message: full_response,
                                })
                                .await;
                            return;
                        }
                        Ok(SseLine::Skip) => {}
                        Err(e) => {
                            let _ = tx.send(StreamingToken::Error(e)).await;
                            return;
                        }
                    }
                }
            }

            // Stream ended without [DONE]
            let token = if full_response.is_empty() {
                StreamingToken::Error(ProviderError::transport(
                    PROVIDER,
                    "stream closed before any content",
                ))
            } else {
                StreamingToken::Complete {
                    message: full_response,
                }
            };
            let _ = tx.send(token).await;
        });

        Ok(rx)
    }

    async fn send(&self, request: &LlmRequest) -> Result<LlmResponse, ProviderError> {
        let key = require_key(PROVIDER, self.api_key.as_deref())?;

        let response = send_checked(
            PROVIDER,
            self.http_client
                .post(self.completions_url())
                .bearer_auth(key)
                .json(&Self::build_body(request, false)),
        )
        .await?;

        let data: Value = response
            .json()
            .await
            .map_err(|e| ProviderError::transport(PROVIDER, e))?;

        let content = data
            .pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .ok_or_else(|| ProviderError::transport(PROVIDER, "response has no message content"))?
            .to_string();

        let tokens_used = data
            .pointer("/usage/total_tokens")
            .and_then(Value::as_u64)
            .and_then(|c| u32::try_from(c).ok());

        Ok(LlmResponse {
            content,
            model: data
                .get("model")
                .and_then(Value::as_str)
                .unwrap_or(&request.model)
                .to_string(),
            tokens_used,
        })
    }
}

/// OpenAI-compatible speech synthesis
#[derive(Clone)]
pub struct OpenAiSpeech {
    base_url: String,
    api_key: Option<String>,
    model: String,
    http_client: reqwest::Client,
}

impl OpenAiSpeech {
    /// Create a new synthesizer
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            model: model.into(),
            http_client: http_client(SPEECH_PROVIDER, timeout)?,
        })
    }
}

#[async_trait]
impl SpeechSynthesizer for OpenAiSpeech {
    fn name(&self) -> &str {
        SPEECH_PROVIDER
    }

    async fn synthesize(&self, request: &SpeechRequest) -> Result<AudioClip, ProviderError> {
        let key = require_key(SPEECH_PROVIDER, self.api_key.as_deref())?;

        let response = send_checked(
            SPEECH_PROVIDER,
            self.http_client
                .post(format!("{}/audio/speech", self.base_url))
                .bearer_auth(key)
                .json(&json!({
                    "model": self.model,
                    "input": request.text,
                    "voice": request.voice,
                    "response_format": request.format,
                    "speed": request.speed,
                })),
        )
        .await?;

        let data = response
            .bytes()
            .await
            .map_err(|e| ProviderError::transport(SPEECH_PROVIDER, e))?;

        Ok(AudioClip {
            format: request.format,
            data: data.to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::traits::ChatTurn;
    use crate::error::ErrorCategory;
    use crate::media::MediaRef;

    #[test]
    fn test_parse_sse_lines() {
        assert_eq!(
            parse_sse_line(r#"data: {"choices":[{"delta":{"content":"Hi"}}]}"#).unwrap(),
            SseLine::Delta("Hi".to_string())
        );
        assert_eq!(parse_sse_line("data: [DONE]").unwrap(), SseLine::Done);
        assert_eq!(
            parse_sse_line(r#"data: {"choices":[{"delta":{"role":"assistant"}}]}"#).unwrap(),
            SseLine::Skip
        );
        assert_eq!(parse_sse_line(": keep-alive").unwrap(), SseLine::Skip);
    }

    #[test]
    fn test_line_buffer_joins_split_characters() {
        let line = "data: {\"choices\":[{\"delta\":{\"content\":\"café\"}}]}\n".as_bytes();
        let split = line.iter().position(|&b| b == 0xC3).unwrap() + 1;

        let mut lines = LineBuffer::default();
        lines.extend(&line[..split]);
        assert_eq!(lines.next_line(), None);
        lines.extend(&line[split..]);

        let text = lines.next_line().unwrap();
        assert_eq!(
            parse_sse_line(&text).unwrap(),
            SseLine::Delta("café".to_string())
        );
        assert_eq!(lines.next_line(), None);
    }

    #[test]
    fn test_line_buffer_yields_each_line() {
        let mut lines = LineBuffer::default();
        lines.extend(b": keep-alive\r\ndata: [DONE]\npartial");
        assert_eq!(lines.next_line().as_deref(), Some(": keep-alive"));
        assert_eq!(lines.next_line().as_deref(), Some("data: [DONE]"));
        assert_eq!(lines.next_line(), None);
    }

    #[test]
    fn test_parse_sse_errors() {
        let err = parse_sse_line("data: {not json").unwrap_err();
        assert_eq!(err.category(), ErrorCategory::TransportFailure);

        let err = parse_sse_line(r#"data: {"error":{"message":"bad model"}}"#).unwrap_err();
        assert_eq!(err.category(), ErrorCategory::InvalidRequest);
    }

    #[test]
    fn test_build_messages_with_vision() {
        let request = LlmRequest::new(
            "gpt-4o-mini",
            vec![
                ChatTurn::new(ChatRole::User, "first"),
                ChatTurn::new(ChatRole::Assistant, "reply"),
                ChatTurn::new(ChatRole::User, "describe this"),
            ],
        )
        .with_system("be brief")
        .with_image(MediaRef::new("https://img.test/a.png"));

        let messages = OpenAiBackend::build_messages(&request);
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0]["role"], "system");
        assert_eq!(messages[1]["content"], "first");
        assert_eq!(messages[3]["content"][1]["image_url"]["url"], "https://img.test/a.png");
    }

    #[test]
    fn test_body_max_tokens_optional() {
        let request = LlmRequest::new("m", vec![]);
        assert!(OpenAiBackend::build_body(&request, true).get("max_tokens").is_none());
        let body = OpenAiBackend::build_body(&request.with_max_tokens(64), false);
        assert_eq!(body["max_tokens"], 64);
        assert_eq!(body["stream"], false);
    }

    #[tokio::test]
    async fn test_missing_key_is_not_configured() {
        let backend =
            OpenAiBackend::new("http://127.0.0.1:9", None, Duration::from_secs(1)).unwrap();
        let err = backend
            .send(&LlmRequest::new("m", vec![]))
            .await
            .unwrap_err();
        assert_eq!(err.category(), ErrorCategory::NotConfigured);

        let speech = OpenAiSpeech::new("http://127.0.0.1:9", None, "tts-1", Duration::from_secs(1))
            .unwrap();
        let err = speech
            .synthesize(&SpeechRequest {
                text: "hi".to_string(),
                voice: "alloy".to_string(),
                format: crate::backend::AudioFormat::Mp3,
                speed: 1.0,
            })
            .await
            .unwrap_err();
        assert_eq!(err.category(), ErrorCategory::NotConfigured);
    }
}
