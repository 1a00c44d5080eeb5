//! ABOUTME: Versioned snapshots of workflow state keyed by (thread_id, sequence)
//! ABOUTME: One trait, two backends: in-process volatile and file-backed durable

pub mod file;
pub mod memory;

pub use file::FileCheckpointer;
pub use memory::MemoryCheckpointer;

use agentflow_core::WorkflowState;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One durable snapshot of a workflow thread.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub thread_id: String,
    pub seq: u64,
    pub state: WorkflowState,
    pub created_at: DateTime<Utc>,
}

/// Checkpointing errors.
#[derive(Debug, Error)]
pub enum StateError {
    /// A save with a sequence at or below the latest was rejected.
    #[error("non-monotonic sequence {seq} for thread {thread_id} (latest is {latest})")]
    NonMonotonicSequence {
        thread_id: String,
        seq: u64,
        latest: u64,
    },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("storage error: {message}")]
    Storage {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl StateError {
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
            source: None,
        }
    }

    pub fn io(message: impl Into<String>, err: std::io::Error) -> Self {
        Self::Storage {
            message: message.into(),
            source: Some(Box::new(err)),
        }
    }
}

/// Pluggable checkpoint store.
///
/// Implementations must guarantee monotonic sequences per thread, atomic
/// saves (a partially written snapshot is never visible), and serialized
/// `save` calls per thread.
#[async_trait]
pub trait Checkpointer: Send + Sync {
    /// Persist a snapshot. Rejects `seq` at or below the latest saved
    /// sequence for the thread.
    async fn save(&self, thread_id: &str, seq: u64, state: &WorkflowState)
        -> Result<(), StateError>;

    /// Most recent snapshot for the thread, if any.
    async fn latest(&self, thread_id: &str) -> Result<Option<Checkpoint>, StateError>;

    /// All snapshots for the thread in ascending sequence order.
    async fn history(&self, thread_id: &str) -> Result<Vec<Checkpoint>, StateError>;
}
