//! ABOUTME: Per-role agent runtime for agentflow
//! ABOUTME: Builds prompts, calls the LLM through the resilience stack, persists extracted files

pub mod digest;
pub mod prompts;
pub mod runtime;
pub mod writer;

pub use digest::digest_value;
pub use prompts::{build_user_prompt, system_prompt, FORMAT_DIRECTIVE};
pub use runtime::{AgentConfig, AgentRuntime};
pub use writer::WorkspaceWriter;
