//! ABOUTME: Error types and handling for agentflow
//! ABOUTME: Provides the AgentFlowError enum and Result type alias

use thiserror::Error;

/// Boxed error source shared by variants that wrap lower-level failures.
pub type BoxedError = Box<dyn std::error::Error + Send + Sync>;

/// Comprehensive error enum for all agentflow operations.
///
/// Each variant corresponds to one kind in the error taxonomy the system
/// distinguishes; recovery policy is decided by the caller (retry layers
/// treat transport errors as retriable, everything else as terminal).
#[derive(Debug, Error)]
pub enum AgentFlowError {
    /// LLM provider failure (transport, API, or malformed response).
    #[error("Provider error: {message}")]
    Provider {
        message: String,
        #[source]
        source: Option<BoxedError>,
    },

    /// The circuit breaker for an endpoint is open.
    #[error("LLM service is temporarily unavailable (circuit breaker open) for {endpoint}")]
    CircuitOpen { endpoint: String },

    /// All retry attempts were exhausted.
    #[error("Failed after {attempts} attempts: {message}")]
    RetryExhausted { attempts: u32, message: String },

    /// The remote model rejected the request for exceeding its context window.
    #[error("Context size exceeded: limit {limit_tokens} tokens")]
    ContextOverflow {
        limit_tokens: u32,
        prompt_tokens: Option<u32>,
    },

    /// A request did not complete within its deadline.
    #[error("Operation timed out after {seconds} seconds")]
    Timeout { seconds: u64 },

    /// Workflow engine failure (bad graph, unknown node, reducer violation).
    #[error("Workflow error: {message}")]
    Workflow { message: String },

    /// Checkpoint or artifact persistence failure.
    #[error("Storage error: {message}")]
    Storage {
        message: String,
        #[source]
        source: Option<BoxedError>,
    },

    /// Invalid configuration; fatal at construction.
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Input validation failure.
    #[error("Validation error: {message}")]
    Validation { message: String },

    /// The workflow was cancelled by an external signal.
    #[error("Workflow cancelled")]
    Cancelled,

    /// Catch-all for unexpected internal failures.
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl AgentFlowError {
    /// Shorthand for a provider error without a source.
    pub fn provider(message: impl Into<String>) -> Self {
        Self::Provider {
            message: message.into(),
            source: None,
        }
    }

    /// Shorthand for a storage error without a source.
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
            source: None,
        }
    }

    /// Shorthand for a workflow error.
    pub fn workflow(message: impl Into<String>) -> Self {
        Self::Workflow {
            message: message.into(),
        }
    }
}

/// Convenience Result type alias.
pub type Result<T> = std::result::Result<T, AgentFlowError>;
