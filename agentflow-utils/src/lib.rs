//! ABOUTME: Shared utilities: retry with backoff, circuit breaker, prompt budget, file extraction
//! ABOUTME: Everything the agent runtime composes around an LLM call lives here

pub mod circuit_breaker;
pub mod extract;
pub mod prompt_budget;
pub mod retry;

pub use circuit_breaker::{
    BreakerError, CircuitBreaker, CircuitBreakerConfig, CircuitBreakerRegistry, CircuitState,
};
pub use extract::{extract, ExtractedFile, Extraction};
pub use prompt_budget::{estimate_tokens, fit, FitResult};
pub use retry::{retry, RetryClass, RetryError, RetryPolicy};
