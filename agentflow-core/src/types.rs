//! ABOUTME: Shared domain types: roles, statuses, tasks, and node results
//! ABOUTME: Everything here is serde-serializable for checkpoints and artifacts

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Agent specialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentRole {
    BusinessAnalyst,
    Developer,
    QaEngineer,
    DevopsEngineer,
    TechnicalWriter,
}

impl AgentRole {
    /// Get the role name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentRole::BusinessAnalyst => "business_analyst",
            AgentRole::Developer => "developer",
            AgentRole::QaEngineer => "qa_engineer",
            AgentRole::DevopsEngineer => "devops_engineer",
            AgentRole::TechnicalWriter => "technical_writer",
        }
    }
}

impl std::fmt::Display for AgentRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Kind of work a task asks an agent to do.
///
/// Task types parameterize the prompt an agent builds; the same role serves
/// several task types (the developer handles both architecture design and
/// implementation, the QA engineer both testing and bug analysis).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    RequirementsAnalysis,
    ArchitectureDesign,
    Implementation,
    Testing,
    Infrastructure,
    Documentation,
    BugAnalysis,
    BugFix,
    RegressionTesting,
    ReleaseNotes,
}

impl TaskType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::RequirementsAnalysis => "requirements_analysis",
            TaskType::ArchitectureDesign => "architecture_design",
            TaskType::Implementation => "implementation",
            TaskType::Testing => "testing",
            TaskType::Infrastructure => "infrastructure",
            TaskType::Documentation => "documentation",
            TaskType::BugAnalysis => "bug_analysis",
            TaskType::BugFix => "bug_fix",
            TaskType::RegressionTesting => "regression_testing",
            TaskType::ReleaseNotes => "release_notes",
        }
    }
}

impl std::fmt::Display for TaskType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Workflow flavor selected at submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowType {
    FeatureDevelopment,
    BugFix,
    Infrastructure,
    Analysis,
    Documentation,
}

impl WorkflowType {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowType::FeatureDevelopment => "feature_development",
            WorkflowType::BugFix => "bug_fix",
            WorkflowType::Infrastructure => "infrastructure",
            WorkflowType::Analysis => "analysis",
            WorkflowType::Documentation => "documentation",
        }
    }
}

impl std::fmt::Display for WorkflowType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Workflow lifecycle status.
///
/// The only legal transitions are `Running` to one of the terminal states
/// (`Completed`, `Failed`, `Cancelled`) or to `Paused`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Running,
    Completed,
    Failed,
    Cancelled,
    Paused,
}

impl WorkflowStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowStatus::Running => "running",
            WorkflowStatus::Completed => "completed",
            WorkflowStatus::Failed => "failed",
            WorkflowStatus::Cancelled => "cancelled",
            WorkflowStatus::Paused => "paused",
        }
    }

    /// True once no further node execution may be attempted on the thread.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            WorkflowStatus::Completed | WorkflowStatus::Failed | WorkflowStatus::Cancelled
        )
    }
}

impl std::fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Outcome of a node-level agent execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    Completed,
    Failed,
}

/// Result record appended to the per-node sequences of [`crate::WorkflowState`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeResult {
    pub status: NodeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default)]
    pub files_created: Vec<String>,
    pub role: AgentRole,
    pub task_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl NodeResult {
    /// A successful result for `role` with the given created files.
    pub fn completed(role: AgentRole, task_id: impl Into<String>) -> Self {
        Self {
            status: NodeStatus::Completed,
            summary: None,
            files_created: Vec::new(),
            role,
            task_id: task_id.into(),
            raw_output: None,
            error: None,
        }
    }

    /// A failed result carrying the error text.
    pub fn failed(role: AgentRole, task_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            status: NodeStatus::Failed,
            summary: None,
            files_created: Vec::new(),
            role,
            task_id: task_id.into(),
            raw_output: None,
            error: Some(error.into()),
        }
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }

    pub fn with_files(mut self, files: Vec<String>) -> Self {
        self.files_created = files;
        self
    }

    pub fn with_raw_output(mut self, raw: impl Into<String>) -> Self {
        self.raw_output = Some(raw.into());
        self
    }
}

/// An error entry recorded in workflow state when a step fails.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowError {
    pub step: String,
    pub error: String,
    pub timestamp: DateTime<Utc>,
}

impl WorkflowError {
    pub fn new(step: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            step: step.into(),
            error: error.into(),
            timestamp: Utc::now(),
        }
    }
}

/// A unit of work handed to an agent runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub task_id: String,
    pub description: String,
    /// Arbitrary context passed into the prompt; the `files` key, when
    /// present, names input files whose content is appended to the prompt.
    #[serde(default)]
    pub context: Map<String, Value>,
    #[serde(default)]
    pub dependencies: Vec<String>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<NodeResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Task {
    /// Create a task with a role-prefixed unique id.
    pub fn new(prefix: &str, description: impl Into<String>) -> Self {
        Self {
            task_id: format!("{}_{}", prefix, uuid::Uuid::new_v4().simple()),
            description: description.into(),
            context: Map::new(),
            dependencies: Vec::new(),
            created_at: Utc::now(),
            completed_at: None,
            result: None,
            error: None,
        }
    }

    pub fn with_context_value(mut self, key: impl Into<String>, value: Value) -> Self {
        self.context.insert(key.into(), value);
        self
    }

    pub fn with_context(mut self, context: Map<String, Value>) -> Self {
        self.context = context;
        self
    }

    /// Input file paths listed under the `files` context key.
    pub fn input_files(&self) -> Vec<String> {
        match self.context.get("files") {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|v| v.as_str().map(String::from))
                .collect(),
            _ => Vec::new(),
        }
    }
}

/// Deduplicate step names preserving first-seen order (display helper;
/// the state itself may legitimately contain duplicates).
pub fn dedup_steps(steps: &[String]) -> Vec<String> {
    let mut seen: HashMap<&str, ()> = HashMap::new();
    let mut out = Vec::new();
    for step in steps {
        if seen.insert(step.as_str(), ()).is_none() {
            out.push(step.clone());
        }
    }
    out
}
