//! Volatile in-process checkpoint store; snapshots are lost on restart.

use crate::{Checkpoint, Checkpointer, StateError};
use agentflow_core::WorkflowState;
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::debug;

/// In-memory checkpoint store.
#[derive(Debug, Default)]
pub struct MemoryCheckpointer {
    threads: RwLock<HashMap<String, Vec<Checkpoint>>>,
}

impl MemoryCheckpointer {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Checkpointer for MemoryCheckpointer {
    async fn save(
        &self,
        thread_id: &str,
        seq: u64,
        state: &WorkflowState,
    ) -> Result<(), StateError> {
        let mut threads = self.threads.write();
        let checkpoints = threads.entry(thread_id.to_string()).or_default();
        if let Some(last) = checkpoints.last() {
            if seq <= last.seq {
                return Err(StateError::NonMonotonicSequence {
                    thread_id: thread_id.to_string(),
                    seq,
                    latest: last.seq,
                });
            }
        }
        checkpoints.push(Checkpoint {
            thread_id: thread_id.to_string(),
            seq,
            state: state.clone(),
            created_at: Utc::now(),
        });
        debug!(thread_id, seq, "checkpoint saved (memory)");
        Ok(())
    }

    async fn latest(&self, thread_id: &str) -> Result<Option<Checkpoint>, StateError> {
        Ok(self
            .threads
            .read()
            .get(thread_id)
            .and_then(|c| c.last().cloned()))
    }

    async fn history(&self, thread_id: &str) -> Result<Vec<Checkpoint>, StateError> {
        Ok(self
            .threads
            .read()
            .get(thread_id)
            .cloned()
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentflow_core::WorkflowType;

    fn state(workflow_id: &str) -> WorkflowState {
        WorkflowState::new(
            "req",
            WorkflowType::FeatureDevelopment,
            workflow_id,
            None,
        )
    }

    #[tokio::test]
    async fn test_save_and_latest() {
        let store = MemoryCheckpointer::new();
        store.save("t1", 1, &state("wf_1")).await.unwrap();
        store.save("t1", 2, &state("wf_1")).await.unwrap();

        let latest = store.latest("t1").await.unwrap().unwrap();
        assert_eq!(latest.seq, 2);
        assert_eq!(latest.state.workflow_id, "wf_1");
    }

    #[tokio::test]
    async fn test_rejects_non_monotonic_seq() {
        let store = MemoryCheckpointer::new();
        store.save("t1", 2, &state("wf_1")).await.unwrap();

        let err = store.save("t1", 2, &state("wf_1")).await.unwrap_err();
        assert!(matches!(err, StateError::NonMonotonicSequence { latest: 2, .. }));
        let err = store.save("t1", 1, &state("wf_1")).await.unwrap_err();
        assert!(matches!(err, StateError::NonMonotonicSequence { .. }));
    }

    #[tokio::test]
    async fn test_history_is_ordered_and_per_thread() {
        let store = MemoryCheckpointer::new();
        store.save("t1", 1, &state("wf_1")).await.unwrap();
        store.save("t2", 1, &state("wf_2")).await.unwrap();
        store.save("t1", 2, &state("wf_1")).await.unwrap();

        let history = store.history("t1").await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].seq, 1);
        assert_eq!(history[1].seq, 2);
        assert!(store.latest("t3").await.unwrap().is_none());
    }
}
