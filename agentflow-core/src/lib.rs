//! ABOUTME: Core types, workflow state, and error taxonomy for agentflow
//! ABOUTME: Shared by every other agentflow crate; no I/O lives here
//!
//! `agentflow-core` defines the data model of a multi-agent workflow: the
//! [`WorkflowState`] record with its per-field merge policies, the
//! [`StateDelta`] partial updates returned by nodes, the [`NodeResult`]
//! produced by agent runtimes, and the [`AgentFlowError`] taxonomy used
//! across the workspace.

pub mod error;
pub mod state;
pub mod types;

pub use error::{AgentFlowError, Result};
pub use state::{NodeField, StateDelta, WorkflowState};
pub use types::{
    dedup_steps, AgentRole, NodeResult, NodeStatus, Task, TaskType, WorkflowError, WorkflowStatus,
    WorkflowType,
};
