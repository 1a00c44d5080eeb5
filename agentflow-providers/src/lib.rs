//! ABOUTME: LLM provider layer: chat abstraction, OpenAI-compatible transport, client pool
//! ABOUTME: Providers are created through injected factories so tests can substitute mocks

pub mod chat;
pub mod openai;
pub mod pool;

pub use chat::{
    ChatMessage, ChatProvider, ChatRequest, ChatResponse, ChatRole, ChunkObserver, ProviderError,
};
pub use openai::OpenAiCompatProvider;
pub use pool::{PoolStats, ProviderEndpoint, ProviderFactory, ProviderPool};
