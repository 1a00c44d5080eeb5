//! ABOUTME: Chat-completions abstraction: request/response types and the ChatProvider trait
//! ABOUTME: Transport errors carry a retry classification consumed by the resilience layer

use agentflow_utils::retry::RetryClass;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// Role of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

/// One chat message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }
}

/// A chat-completions request.
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub stream: bool,
}

impl ChatRequest {
    pub fn new(model: impl Into<String>, system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            messages: vec![ChatMessage::system(system), ChatMessage::user(user)],
            temperature: 0.7,
            max_tokens: 2048,
            stream: false,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_stream(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    /// Content of the system message, if present.
    pub fn system_content(&self) -> Option<&str> {
        self.messages
            .iter()
            .find(|m| m.role == ChatRole::System)
            .map(|m| m.content.as_str())
    }

    /// Content of the user message, if present.
    pub fn user_content(&self) -> Option<&str> {
        self.messages
            .iter()
            .find(|m| m.role == ChatRole::User)
            .map(|m| m.content.as_str())
    }
}

/// A completed chat response (streamed responses are concatenated into the
/// same shape).
#[derive(Debug, Clone)]
pub struct ChatResponse {
    pub content: String,
}

/// Callback invoked with each streamed content chunk.
pub type ChunkObserver = Arc<dyn Fn(&str) + Send + Sync>;

/// Errors from a chat provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Connection-level failure (reset, refused, DNS).
    #[error("transport error: {message}")]
    Transport {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The request did not complete within its deadline.
    #[error("request timed out after {seconds} seconds")]
    Timeout { seconds: u64 },

    /// The model rejected the prompt for exceeding its context window.
    #[error("request exceeds the available context size ({limit_tokens} tokens)")]
    ContextOverflow {
        limit_tokens: u32,
        prompt_tokens: Option<u32>,
    },

    /// The endpoint answered with an application-level error.
    #[error("api error (status {status}): {message}")]
    Api { status: u16, message: String },

    /// The response body could not be interpreted.
    #[error("malformed response: {message}")]
    Malformed { message: String },
}

impl ProviderError {
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            source: None,
        }
    }
}

impl RetryClass for ProviderError {
    fn is_retriable(&self) -> bool {
        match self {
            ProviderError::Transport { .. } | ProviderError::Timeout { .. } => true,
            // Context overflow has its own one-shot truncation recovery;
            // API and parse errors are terminal for the call.
            ProviderError::ContextOverflow { .. }
            | ProviderError::Api { .. }
            | ProviderError::Malformed { .. } => false,
        }
    }
}

/// Trait for chat-completion backends.
///
/// The HTTP implementation lives in [`crate::openai`]; tests provide
/// scripted implementations.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Execute a non-streaming completion.
    async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse, ProviderError>;

    /// Execute a streaming completion, invoking `observer` per chunk.
    ///
    /// The returned content must be identical to the non-streamed form.
    async fn complete_streaming(
        &self,
        request: &ChatRequest,
        observer: Option<ChunkObserver>,
    ) -> Result<ChatResponse, ProviderError>;

    /// The endpoint this provider talks to.
    fn endpoint(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_serializes_wire_fields() {
        let request = ChatRequest::new("devstral", "you are helpful", "say hi")
            .with_temperature(0.2)
            .with_max_tokens(1024)
            .with_stream(true);
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["model"], "devstral");
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["role"], "user");
        assert_eq!(json["stream"], true);
        assert_eq!(json["max_tokens"], 1024);
    }

    #[test]
    fn test_retry_classification() {
        assert!(ProviderError::transport("reset").is_retriable());
        assert!(ProviderError::Timeout { seconds: 300 }.is_retriable());
        assert!(!ProviderError::ContextOverflow {
            limit_tokens: 4096,
            prompt_tokens: Some(4476)
        }
        .is_retriable());
        assert!(!ProviderError::Api {
            status: 400,
            message: "bad request".into()
        }
        .is_retriable());
    }

    #[test]
    fn test_context_overflow_display_matches_server_phrase() {
        let err = ProviderError::ContextOverflow {
            limit_tokens: 2048,
            prompt_tokens: None,
        };
        assert!(err
            .to_string()
            .contains("exceeds the available context size (2048 tokens)"));
    }
}
