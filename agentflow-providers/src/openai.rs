//! ABOUTME: OpenAI-compatible chat-completions transport over reqwest
//! ABOUTME: Handles SSE streaming, per-call timeouts, and context-overflow classification

use crate::chat::{ChatProvider, ChatRequest, ChatResponse, ChunkObserver, ProviderError};
use async_trait::async_trait;
use futures::StreamExt;
use regex::Regex;
use serde::Deserialize;
use std::sync::LazyLock;
use std::time::Duration;
use tracing::{debug, warn};

static CONTEXT_LIMIT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"available context size \((\d+) tokens\)").expect("valid regex")
});
static PROMPT_TOKENS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"request \((\d+) tokens\)").expect("valid regex"));

/// Detect the llama-server context-overflow phrasing in an error payload.
///
/// Error format: `request (4476 tokens) exceeds the available context size
/// (4096 tokens)`.
pub fn classify_error_payload(status: u16, body: &str) -> ProviderError {
    if body.contains("exceeds the available context size") || body.contains("exceed_context_size") {
        let limit_tokens = CONTEXT_LIMIT
            .captures(body)
            .and_then(|c| c[1].parse().ok())
            .unwrap_or(4096);
        let prompt_tokens = PROMPT_TOKENS.captures(body).and_then(|c| c[1].parse().ok());
        return ProviderError::ContextOverflow {
            limit_tokens,
            prompt_tokens,
        };
    }
    ProviderError::Api {
        status,
        message: truncate_for_log(body, 500),
    }
}

fn truncate_for_log(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        text.to_string()
    } else {
        text.chars().take(limit).collect()
    }
}

#[derive(Debug, Deserialize)]
struct CompletionBody {
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(Debug, Deserialize, Default)]
struct StreamDelta {
    content: Option<String>,
}

/// Chat provider speaking the OpenAI-compatible HTTP API.
pub struct OpenAiCompatProvider {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    timeout: Duration,
}

impl OpenAiCompatProvider {
    /// Build a provider for `base_url` (e.g. `http://127.0.0.1:8080/v1`).
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::Transport {
                message: "failed to build http client".to_string(),
                source: Some(Box::new(e)),
            })?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            timeout,
        })
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    fn map_request_error(&self, err: reqwest::Error) -> ProviderError {
        if err.is_timeout() {
            ProviderError::Timeout {
                seconds: self.timeout.as_secs(),
            }
        } else {
            ProviderError::Transport {
                message: err.to_string(),
                source: Some(Box::new(err)),
            }
        }
    }

    async fn post(&self, request: &ChatRequest) -> Result<reqwest::Response, ProviderError> {
        let response = self
            .http
            .post(self.completions_url())
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| self.map_request_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_error_payload(status.as_u16(), &body));
        }
        Ok(response)
    }
}

#[async_trait]
impl ChatProvider for OpenAiCompatProvider {
    async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse, ProviderError> {
        let request = request.clone().with_stream(false);
        let response = self.post(&request).await?;
        let body: CompletionBody = response.json().await.map_err(|e| ProviderError::Malformed {
            message: format!("invalid completion body: {e}"),
        })?;

        let content = body
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .ok_or_else(|| ProviderError::Malformed {
                message: "completion had no choices".to_string(),
            })?;

        debug!(chars = content.len(), "chat completion received");
        Ok(ChatResponse { content })
    }

    async fn complete_streaming(
        &self,
        request: &ChatRequest,
        observer: Option<ChunkObserver>,
    ) -> Result<ChatResponse, ProviderError> {
        let request = request.clone().with_stream(true);
        let response = self.post(&request).await?;

        let mut content = String::new();
        let mut buffer = String::new();
        let mut stream = response.bytes_stream();

        while let Some(chunk) = stream.next().await {
            let bytes = chunk.map_err(|e| self.map_request_error(e))?;
            buffer.push_str(&String::from_utf8_lossy(&bytes));

            // Server-sent events: one `data: {json}` payload per line.
            while let Some(pos) = buffer.find('\n') {
                let line = buffer[..pos].trim().to_string();
                buffer.drain(..=pos);

                let Some(payload) = line.strip_prefix("data:").map(str::trim) else {
                    continue;
                };
                if payload.is_empty() || payload == "[DONE]" {
                    continue;
                }

                match serde_json::from_str::<StreamChunk>(payload) {
                    Ok(chunk) => {
                        if let Some(delta) = chunk
                            .choices
                            .first()
                            .and_then(|c| c.delta.content.as_deref())
                        {
                            content.push_str(delta);
                            if let Some(observer) = &observer {
                                observer(delta);
                            }
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "skipping undecodable stream chunk");
                    }
                }
            }
        }

        debug!(chars = content.len(), "streamed chat completion assembled");
        Ok(ChatResponse { content })
    }

    fn endpoint(&self) -> &str {
        &self.base_url
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_context_overflow_with_token_counts() {
        let body = r#"{"error":{"message":"request (4476 tokens) exceeds the available context size (4096 tokens)"}}"#;
        match classify_error_payload(400, body) {
            ProviderError::ContextOverflow {
                limit_tokens,
                prompt_tokens,
            } => {
                assert_eq!(limit_tokens, 4096);
                assert_eq!(prompt_tokens, Some(4476));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_classify_context_overflow_defaults_limit() {
        let body = "exceed_context_size";
        match classify_error_payload(400, body) {
            ProviderError::ContextOverflow { limit_tokens, .. } => assert_eq!(limit_tokens, 4096),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_classify_other_errors_as_api() {
        match classify_error_payload(500, "internal server error") {
            ProviderError::Api { status, message } => {
                assert_eq!(status, 500);
                assert_eq!(message, "internal server error");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_base_url_trailing_slash_is_normalized() {
        let provider = OpenAiCompatProvider::new(
            "http://127.0.0.1:8080/v1/",
            "not-needed",
            Duration::from_secs(300),
        )
        .unwrap();
        assert_eq!(
            provider.completions_url(),
            "http://127.0.0.1:8080/v1/chat/completions"
        );
    }
}
