//! ABOUTME: Durable checkpoint store over an append-only directory
//! ABOUTME: One JSON file per (thread, seq); atomic via temp-file + rename

use crate::{Checkpoint, Checkpointer, StateError};
use agentflow_core::WorkflowState;
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

/// File-backed checkpoint store.
///
/// Layout: `<root>/<thread_id>/<seq>.json`. Writes go to a `.tmp` sibling
/// first and are renamed into place, so a crash mid-write never leaves a
/// visible partial snapshot. Saves are serialized per thread.
pub struct FileCheckpointer {
    root: PathBuf,
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl FileCheckpointer {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            locks: DashMap::new(),
        }
    }

    fn thread_dir(&self, thread_id: &str) -> PathBuf {
        // Thread ids become directory names; anything path-hostile is
        // replaced rather than interpreted.
        let safe: String = thread_id
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        let safe = match safe.as_str() {
            "" | "." | ".." => "_".to_string(),
            _ => safe,
        };
        self.root.join(safe)
    }

    fn lock_for(&self, thread_id: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(thread_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    async fn sequences(dir: &Path) -> Result<Vec<u64>, StateError> {
        let mut seqs = Vec::new();
        let mut entries = match tokio::fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(seqs),
            Err(e) => return Err(StateError::io("failed to read checkpoint dir", e)),
        };
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StateError::io("failed to iterate checkpoint dir", e))?
        {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if let Some(stem) = name.strip_suffix(".json") {
                if let Ok(seq) = stem.parse::<u64>() {
                    seqs.push(seq);
                }
            }
        }
        seqs.sort_unstable();
        Ok(seqs)
    }

    async fn read_checkpoint(path: &Path) -> Result<Checkpoint, StateError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| StateError::io("failed to read checkpoint", e))?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

#[async_trait]
impl Checkpointer for FileCheckpointer {
    async fn save(
        &self,
        thread_id: &str,
        seq: u64,
        state: &WorkflowState,
    ) -> Result<(), StateError> {
        let lock = self.lock_for(thread_id);
        let _guard = lock.lock().await;

        let dir = self.thread_dir(thread_id);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| StateError::io("failed to create checkpoint dir", e))?;

        if let Some(latest) = Self::sequences(&dir).await?.last().copied() {
            if seq <= latest {
                return Err(StateError::NonMonotonicSequence {
                    thread_id: thread_id.to_string(),
                    seq,
                    latest,
                });
            }
        }

        let checkpoint = Checkpoint {
            thread_id: thread_id.to_string(),
            seq,
            state: state.clone(),
            created_at: Utc::now(),
        };
        let bytes = serde_json::to_vec_pretty(&checkpoint)?;

        let final_path = dir.join(format!("{seq}.json"));
        let tmp_path = dir.join(format!("{seq}.json.tmp"));
        tokio::fs::write(&tmp_path, &bytes)
            .await
            .map_err(|e| StateError::io("failed to write checkpoint", e))?;
        tokio::fs::rename(&tmp_path, &final_path)
            .await
            .map_err(|e| StateError::io("failed to publish checkpoint", e))?;

        debug!(thread_id, seq, path = %final_path.display(), "checkpoint saved (file)");
        Ok(())
    }

    async fn latest(&self, thread_id: &str) -> Result<Option<Checkpoint>, StateError> {
        let dir = self.thread_dir(thread_id);
        let Some(seq) = Self::sequences(&dir).await?.last().copied() else {
            return Ok(None);
        };
        Ok(Some(
            Self::read_checkpoint(&dir.join(format!("{seq}.json"))).await?,
        ))
    }

    async fn history(&self, thread_id: &str) -> Result<Vec<Checkpoint>, StateError> {
        let dir = self.thread_dir(thread_id);
        let mut checkpoints = Vec::new();
        for seq in Self::sequences(&dir).await? {
            checkpoints.push(Self::read_checkpoint(&dir.join(format!("{seq}.json"))).await?);
        }
        Ok(checkpoints)
    }
}
