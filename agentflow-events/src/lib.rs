//! ABOUTME: Progress event system for agentflow workflows
//! ABOUTME: Typed events delivered best-effort over a broadcast channel

pub mod emitter;
pub mod event;

pub use emitter::ProgressEmitter;
pub use event::{completed_step_count, EventEnvelope, WorkflowEvent};
