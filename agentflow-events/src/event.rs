//! ABOUTME: WorkflowEvent payloads and the sequenced envelope wrapping them
//! ABOUTME: Envelope carries id, timestamp, and a process-wide monotonic sequence

use agentflow_core::{AgentRole, WorkflowStatus, WorkflowType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

/// Global sequence counter for event ordering.
static SEQUENCE_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Structured progress events emitted during workflow execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum WorkflowEvent {
    WorkflowStarted {
        workflow_id: String,
        workflow_type: WorkflowType,
        requirement: String,
        started_at: DateTime<Utc>,
    },
    NodeStarted {
        workflow_id: String,
        node_name: String,
        role: AgentRole,
    },
    NodeAction {
        workflow_id: String,
        node_name: String,
        description: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        details: Option<String>,
    },
    NodeCompleted {
        workflow_id: String,
        node_name: String,
        summary: String,
        files_created: Vec<String>,
    },
    NodeFailed {
        workflow_id: String,
        node_name: String,
        error: String,
    },
    InterAgentHandoff {
        from_node: String,
        to_node: String,
        message: String,
    },
    ParallelStart {
        targets: Vec<String>,
    },
    ParallelComplete {
        targets: Vec<String>,
    },
    WorkflowStatus {
        workflow_id: String,
        status: WorkflowStatus,
        current_step: String,
        completed_steps: Vec<String>,
    },
    WorkflowCompleted {
        workflow_id: String,
        status: WorkflowStatus,
        completed_at: DateTime<Utc>,
    },
}

impl WorkflowEvent {
    /// Short name of the event kind (matches the serialized tag).
    pub fn kind(&self) -> &'static str {
        match self {
            WorkflowEvent::WorkflowStarted { .. } => "workflow_started",
            WorkflowEvent::NodeStarted { .. } => "node_started",
            WorkflowEvent::NodeAction { .. } => "node_action",
            WorkflowEvent::NodeCompleted { .. } => "node_completed",
            WorkflowEvent::NodeFailed { .. } => "node_failed",
            WorkflowEvent::InterAgentHandoff { .. } => "inter_agent_handoff",
            WorkflowEvent::ParallelStart { .. } => "parallel_start",
            WorkflowEvent::ParallelComplete { .. } => "parallel_complete",
            WorkflowEvent::WorkflowStatus { .. } => "workflow_status",
            WorkflowEvent::WorkflowCompleted { .. } => "workflow_completed",
        }
    }
}

/// Delivery wrapper adding identity and ordering to an event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// Monotonic per-process sequence number.
    pub sequence: u64,
    #[serde(flatten)]
    pub event: WorkflowEvent,
}

impl EventEnvelope {
    pub fn new(event: WorkflowEvent) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            sequence: SEQUENCE_COUNTER.fetch_add(1, Ordering::SeqCst),
            event,
        }
    }
}

/// Number of distinct completed steps.
///
/// `completed_steps` may contain duplicates when a node participates in a
/// join; displays deduplicate, the state does not.
pub fn completed_step_count(completed_steps: &[String]) -> usize {
    completed_steps
        .iter()
        .map(String::as_str)
        .collect::<HashSet<_>>()
        .len()
}
