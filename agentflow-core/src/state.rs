//! ABOUTME: Workflow state record with per-field merge policies and reducer
//! ABOUTME: Nodes receive a snapshot and return a StateDelta; apply() merges it
//!
//! The state is a typed record rather than a dynamic map: append-policy
//! fields are `Vec`s that the reducer only ever extends (never truncates or
//! reorders), replace-policy fields are plain values with last-writer-wins
//! semantics, and `context` is shallow-merged. This makes the reduction of
//! parallel sibling deltas commutative on everything they are allowed to
//! touch.

use crate::types::{NodeResult, WorkflowError, WorkflowStatus, WorkflowType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Shared, mergeable state advanced across workflow nodes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowState {
    // Input, set once at submission.
    pub requirement: String,
    pub workflow_type: WorkflowType,
    pub workflow_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bug_description: Option<String>,
    #[serde(default)]
    pub context: Map<String, Value>,

    // Per-node output sequences (append policy).
    #[serde(default)]
    pub business_analysis: Vec<NodeResult>,
    #[serde(default)]
    pub architecture: Vec<NodeResult>,
    #[serde(default)]
    pub implementation: Vec<NodeResult>,
    #[serde(default)]
    pub tests: Vec<NodeResult>,
    #[serde(default)]
    pub infrastructure: Vec<NodeResult>,
    #[serde(default)]
    pub documentation: Vec<NodeResult>,
    #[serde(default)]
    pub bug_analysis: Vec<NodeResult>,
    #[serde(default)]
    pub bug_fix: Vec<NodeResult>,
    #[serde(default)]
    pub regression_tests: Vec<NodeResult>,
    #[serde(default)]
    pub release_notes: Vec<NodeResult>,

    // Workflow metadata.
    #[serde(default)]
    pub errors: Vec<WorkflowError>,
    #[serde(default)]
    pub files_created: Vec<String>,
    pub current_step: String,
    #[serde(default)]
    pub completed_steps: Vec<String>,

    // Status tracking.
    pub status: WorkflowStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,

    // Human-in-the-loop (reserved).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requires_approval: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approved: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approval_notes: Option<String>,
}

impl WorkflowState {
    /// Initial state for a new submission.
    pub fn new(
        requirement: impl Into<String>,
        workflow_type: WorkflowType,
        workflow_id: impl Into<String>,
        context: Option<Map<String, Value>>,
    ) -> Self {
        Self {
            requirement: requirement.into(),
            workflow_type,
            workflow_id: workflow_id.into(),
            bug_description: None,
            context: context.unwrap_or_default(),
            business_analysis: Vec::new(),
            architecture: Vec::new(),
            implementation: Vec::new(),
            tests: Vec::new(),
            infrastructure: Vec::new(),
            documentation: Vec::new(),
            bug_analysis: Vec::new(),
            bug_fix: Vec::new(),
            regression_tests: Vec::new(),
            release_notes: Vec::new(),
            errors: Vec::new(),
            files_created: Vec::new(),
            current_step: "start".to_string(),
            completed_steps: Vec::new(),
            status: WorkflowStatus::Running,
            started_at: Some(Utc::now()),
            completed_at: None,
            requires_approval: None,
            approved: None,
            approval_notes: None,
        }
    }

    /// Initial state for a bug-fix submission.
    pub fn new_bug_fix(
        requirement: impl Into<String>,
        bug_description: impl Into<String>,
        workflow_id: impl Into<String>,
    ) -> Self {
        let mut state = Self::new(
            requirement,
            WorkflowType::BugFix,
            workflow_id,
            None,
        );
        state.bug_description = Some(bug_description.into());
        state
    }

    /// Merge a node's partial update into this state.
    ///
    /// Append-policy fields are extended in delta order; replace-policy
    /// fields take the delta's value when present; `context` is
    /// shallow-merged key by key. The reducer never removes or reorders
    /// existing entries.
    pub fn apply(&mut self, delta: StateDelta) {
        self.business_analysis.extend(delta.business_analysis);
        self.architecture.extend(delta.architecture);
        self.implementation.extend(delta.implementation);
        self.tests.extend(delta.tests);
        self.infrastructure.extend(delta.infrastructure);
        self.documentation.extend(delta.documentation);
        self.bug_analysis.extend(delta.bug_analysis);
        self.bug_fix.extend(delta.bug_fix);
        self.regression_tests.extend(delta.regression_tests);
        self.release_notes.extend(delta.release_notes);
        self.errors.extend(delta.errors);
        self.files_created.extend(delta.files_created);
        self.completed_steps.extend(delta.completed_steps);

        for (key, value) in delta.context {
            self.context.insert(key, value);
        }

        if let Some(step) = delta.current_step {
            self.current_step = step;
        }
        if let Some(status) = delta.status {
            self.status = status;
        }
        if let Some(at) = delta.completed_at {
            self.completed_at = Some(at);
        }
        if let Some(v) = delta.requires_approval {
            self.requires_approval = Some(v);
        }
        if let Some(v) = delta.approved {
            self.approved = Some(v);
        }
        if let Some(v) = delta.approval_notes {
            self.approval_notes = Some(v);
        }
    }

    /// Latest result appended to the named node-output sequence, if any.
    pub fn latest_result(&self, field: NodeField) -> Option<&NodeResult> {
        self.results(field).last()
    }

    /// The full sequence for a node-output field.
    pub fn results(&self, field: NodeField) -> &[NodeResult] {
        match field {
            NodeField::BusinessAnalysis => &self.business_analysis,
            NodeField::Architecture => &self.architecture,
            NodeField::Implementation => &self.implementation,
            NodeField::Tests => &self.tests,
            NodeField::Infrastructure => &self.infrastructure,
            NodeField::Documentation => &self.documentation,
            NodeField::BugAnalysis => &self.bug_analysis,
            NodeField::BugFix => &self.bug_fix,
            NodeField::RegressionTests => &self.regression_tests,
            NodeField::ReleaseNotes => &self.release_notes,
        }
    }

    /// True if any recorded error belongs to `step`.
    pub fn has_error_for_step(&self, step: &str) -> bool {
        self.errors.iter().any(|e| e.step == step)
    }

    /// True once the step name appears in `completed_steps`.
    pub fn step_completed(&self, step: &str) -> bool {
        self.completed_steps.iter().any(|s| s == step)
    }
}

/// Name of a per-node output sequence in [`WorkflowState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeField {
    BusinessAnalysis,
    Architecture,
    Implementation,
    Tests,
    Infrastructure,
    Documentation,
    BugAnalysis,
    BugFix,
    RegressionTests,
    ReleaseNotes,
}

/// Partial state update returned by a node.
///
/// Everything defaults to "no change"; append fields contribute entries,
/// option fields overwrite when set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StateDelta {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub business_analysis: Vec<NodeResult>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub architecture: Vec<NodeResult>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub implementation: Vec<NodeResult>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tests: Vec<NodeResult>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub infrastructure: Vec<NodeResult>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub documentation: Vec<NodeResult>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bug_analysis: Vec<NodeResult>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bug_fix: Vec<NodeResult>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub regression_tests: Vec<NodeResult>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub release_notes: Vec<NodeResult>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<WorkflowError>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files_created: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub completed_steps: Vec<String>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub context: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_step: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<WorkflowStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requires_approval: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approved: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approval_notes: Option<String>,
}

impl StateDelta {
    /// A delta that only marks a step as the current one and completed.
    pub fn for_step(step: impl Into<String>) -> Self {
        let step = step.into();
        Self {
            current_step: Some(step.clone()),
            completed_steps: vec![step],
            ..Self::default()
        }
    }

    pub fn with_result(mut self, field: NodeField, result: NodeResult) -> Self {
        self.files_created.extend(result.files_created.clone());
        match field {
            NodeField::BusinessAnalysis => self.business_analysis.push(result),
            NodeField::Architecture => self.architecture.push(result),
            NodeField::Implementation => self.implementation.push(result),
            NodeField::Tests => self.tests.push(result),
            NodeField::Infrastructure => self.infrastructure.push(result),
            NodeField::Documentation => self.documentation.push(result),
            NodeField::BugAnalysis => self.bug_analysis.push(result),
            NodeField::BugFix => self.bug_fix.push(result),
            NodeField::RegressionTests => self.regression_tests.push(result),
            NodeField::ReleaseNotes => self.release_notes.push(result),
        }
        self
    }

    pub fn with_error(mut self, error: WorkflowError) -> Self {
        self.errors.push(error);
        self
    }

    pub fn with_status(mut self, status: WorkflowStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_completed_at(mut self, at: DateTime<Utc>) -> Self {
        self.completed_at = Some(at);
        self
    }
}
