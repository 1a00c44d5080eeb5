//! Persists extracted files under the workspace.
//!
//! Default target is `generated/<task_id>/<role>/`; paths starting with
//! `/` or `./` resolve against the workspace root instead.

use agentflow_core::{AgentRole, Result};
use agentflow_utils::extract::Extraction;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

/// Writes agent output files into the workspace.
#[derive(Debug, Clone)]
pub struct WorkspaceWriter {
    workspace_root: PathBuf,
    generated_root: PathBuf,
}

impl WorkspaceWriter {
    pub fn new(workspace_root: impl Into<PathBuf>) -> Self {
        let given = workspace_root.into();
        // Absolute paths in results; fall back to the given path when the
        // workspace does not exist yet.
        let workspace_root = std::fs::canonicalize(&given).unwrap_or(given);
        let generated_root = workspace_root.join("generated");
        Self {
            workspace_root,
            generated_root,
        }
    }

    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }

    /// Resolve where an extracted path lands on disk.
    ///
    /// Paths starting with `/` or `./` resolve against the workspace root;
    /// everything else goes under `generated/<task_id>/<role>/`.
    fn resolve(&self, task_id: &str, role: AgentRole, extracted_path: &str) -> PathBuf {
        if extracted_path.starts_with('/') || extracted_path.starts_with("./") {
            let trimmed = extracted_path.trim_start_matches(['.', '/']);
            self.workspace_root.join(trimmed)
        } else {
            self.generated_root
                .join(task_id)
                .join(role.as_str())
                .join(extracted_path)
        }
    }

    /// Write every extracted file, returning the paths written.
    ///
    /// A failed write is logged and skipped; collisions within a task are
    /// overwrites (last writer wins, logged).
    pub async fn write_files(
        &self,
        task_id: &str,
        role: AgentRole,
        extraction: &Extraction,
    ) -> Result<Vec<String>> {
        let mut created = Vec::new();

        for file in &extraction.files {
            let target = self.resolve(task_id, role, &file.path);

            if let Some(parent) = target.parent() {
                if let Err(e) = tokio::fs::create_dir_all(parent).await {
                    error!(path = %target.display(), error = %e, "failed to create parent directory");
                    continue;
                }
            }

            if tokio::fs::try_exists(&target).await.unwrap_or(false) {
                warn!(path = %target.display(), "overwriting existing file");
            }

            match tokio::fs::write(&target, &file.content).await {
                Ok(()) => {
                    info!(path = %target.display(), "created file");
                    created.push(target.to_string_lossy().into_owned());
                }
                Err(e) => {
                    error!(path = %target.display(), error = %e, "failed to write file");
                }
            }
        }

        Ok(created)
    }

}

#[cfg(test)]
mod tests {
    use super::*;
    use agentflow_utils::extract::extract;

    fn writer() -> (tempfile::TempDir, WorkspaceWriter) {
        let dir = tempfile::tempdir().unwrap();
        let writer = WorkspaceWriter::new(dir.path());
        (dir, writer)
    }

    #[tokio::test]
    async fn test_default_layout_under_generated() {
        let (_dir, writer) = writer();
        let extraction = extract("File: `app.py`\n```python\nprint(\"hi\")\n```\n");

        let created = writer
            .write_files("task_1", AgentRole::Developer, &extraction)
            .await
            .unwrap();

        assert_eq!(created.len(), 1);
        assert!(created[0].ends_with("generated/task_1/developer/app.py"));
        let content = tokio::fs::read_to_string(&created[0]).await.unwrap();
        assert_eq!(content, "print(\"hi\")");
    }

    #[tokio::test]
    async fn test_rooted_paths_resolve_against_workspace() {
        let (dir, writer) = writer();
        let extraction =
            extract("File: ./docs/README.md\n```markdown\n# Title\n```\n");

        let created = writer
            .write_files("task_1", AgentRole::TechnicalWriter, &extraction)
            .await
            .unwrap();

        assert_eq!(created.len(), 1);
        let expected = dir.path().canonicalize().unwrap().join("docs/README.md");
        assert_eq!(PathBuf::from(&created[0]), expected);
    }

    #[tokio::test]
    async fn test_nested_relative_paths_create_parents() {
        let (_dir, writer) = writer();
        let extraction = extract("File: `src/utils/helper.py`\n```python\ndef helper():\n    pass\n```\n");

        let created = writer
            .write_files("t", AgentRole::Developer, &extraction)
            .await
            .unwrap();
        assert!(created[0].ends_with("generated/t/developer/src/utils/helper.py"));
    }

    #[tokio::test]
    async fn test_collision_overwrites_last_writer_wins() {
        let (_dir, writer) = writer();
        let first = extract("File: `app.py`\n```python\nfirst\n```\n");
        let second = extract("File: `app.py`\n```python\nsecond\n```\n");

        writer
            .write_files("t", AgentRole::Developer, &first)
            .await
            .unwrap();
        let created = writer
            .write_files("t", AgentRole::Developer, &second)
            .await
            .unwrap();

        let content = tokio::fs::read_to_string(&created[0]).await.unwrap();
        assert_eq!(content, "second");
    }
}
