//! ABOUTME: Multi-agent orchestrator: feature-development and bug-fix graphs over role runtimes
//! ABOUTME: Entry points execute, cancel, and resume workflow threads and write artifact JSONs

use crate::executor::GraphExecutor;
use crate::graph::{NodeFn, StateGraph};
use crate::route::Route;
use agentflow_agents::{AgentConfig, AgentRuntime, WorkspaceWriter};
use agentflow_config::Settings;
use agentflow_core::{
    AgentFlowError, AgentRole, NodeField, NodeStatus, Result, StateDelta, Task, TaskType,
    WorkflowError, WorkflowState, WorkflowStatus, WorkflowType,
};
use agentflow_events::{ProgressEmitter, WorkflowEvent};
use agentflow_providers::{ProviderEndpoint, ProviderPool};
use agentflow_state::Checkpointer;
use agentflow_utils::circuit_breaker::{CircuitBreakerConfig, CircuitBreakerRegistry};
use agentflow_utils::retry::RetryPolicy;
use chrono::Utc;
use dashmap::DashMap;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Builds the task an agent node submits to its runtime.
type TaskBuilder = Arc<dyn Fn(&WorkflowState) -> Task + Send + Sync>;

/// Handoff message emitted when control passes between agents.
#[derive(Debug, Clone, Copy)]
struct Handoff {
    from: &'static str,
    to: &'static str,
    message: &'static str,
}

/// Orchestrates specialized agents through workflow graphs.
///
/// Dependencies (pool, checkpointer, emitter) are injected at construction;
/// the orchestrator owns no global state.
pub struct AgentOrchestrator {
    settings: Settings,
    pool: Arc<ProviderPool>,
    checkpointer: Arc<dyn Checkpointer>,
    emitter: ProgressEmitter,
    runtimes: HashMap<AgentRole, Arc<AgentRuntime>>,
    cancellations: Arc<DashMap<String, CancellationToken>>,
    active: Arc<AtomicUsize>,
    idle: Arc<Notify>,
}

impl AgentOrchestrator {
    pub fn new(
        settings: Settings,
        pool: Arc<ProviderPool>,
        checkpointer: Arc<dyn Checkpointer>,
        emitter: ProgressEmitter,
    ) -> Self {
        let endpoint = ProviderEndpoint::new(
            settings.llm_base_url.clone(),
            settings.llm_api_key.clone(),
            Duration::from_secs(settings.llm_timeout_secs),
        );
        let breakers = CircuitBreakerRegistry::new(CircuitBreakerConfig {
            failure_threshold: settings.llm_circuit_breaker_threshold,
            recovery_timeout: Duration::from_secs_f64(settings.llm_circuit_breaker_timeout_secs),
            half_open_success_threshold: settings.llm_circuit_breaker_half_open_successes,
        });
        let breaker = breakers.for_endpoint(&settings.llm_base_url);

        let config = AgentConfig {
            endpoint,
            model: settings.llm_model.clone(),
            temperature: settings.llm_temperature,
            max_tokens: settings.llm_max_tokens,
            stream: settings.llm_stream_responses,
            retry: RetryPolicy {
                max_attempts: settings.llm_max_retries,
                initial_delay: Duration::from_secs_f64(settings.llm_retry_initial_delay_secs),
                max_delay: Duration::from_secs_f64(settings.llm_retry_max_delay_secs),
                exponential_base: 2.0,
                jitter: true,
            },
            languages: settings.developer_languages.clone(),
        };
        let writer = WorkspaceWriter::new(&settings.workspace);

        let mut runtimes = HashMap::new();
        for role in [
            AgentRole::BusinessAnalyst,
            AgentRole::Developer,
            AgentRole::QaEngineer,
            AgentRole::DevopsEngineer,
            AgentRole::TechnicalWriter,
        ] {
            runtimes.insert(
                role,
                Arc::new(AgentRuntime::new(
                    role,
                    config.clone(),
                    pool.clone(),
                    breaker.clone(),
                    writer.clone(),
                )),
            );
        }
        info!(agents = runtimes.len(), "orchestrator initialized");

        Self {
            settings,
            pool,
            checkpointer,
            emitter,
            runtimes,
            cancellations: Arc::new(DashMap::new()),
            active: Arc::new(AtomicUsize::new(0)),
            idle: Arc::new(Notify::new()),
        }
    }

    pub fn emitter(&self) -> &ProgressEmitter {
        &self.emitter
    }

    pub fn pool(&self) -> &Arc<ProviderPool> {
        &self.pool
    }

    /// Execute the feature-development workflow for one requirement.
    pub async fn execute_feature_development(
        &self,
        requirement: &str,
        context: Option<Map<String, Value>>,
        thread_id: Option<String>,
    ) -> Result<WorkflowState> {
        let workflow_id = generate_workflow_id("workflow");
        let state = WorkflowState::new(
            requirement,
            WorkflowType::FeatureDevelopment,
            &workflow_id,
            context,
        );
        let thread_id = thread_id.unwrap_or_else(|| workflow_id.clone());
        info!(workflow_id, thread_id, "starting feature development workflow");

        let cancel = CancellationToken::new();
        let graph = self.build_feature_development_graph(&cancel);
        self.run_graph(graph, state, thread_id, 0, None, cancel).await
    }

    /// Execute the bug-fix workflow.
    pub async fn execute_bug_fix(
        &self,
        requirement: &str,
        bug_description: &str,
        thread_id: Option<String>,
    ) -> Result<WorkflowState> {
        let workflow_id = generate_workflow_id("bugfix");
        let state = WorkflowState::new_bug_fix(requirement, bug_description, &workflow_id);
        let thread_id = thread_id.unwrap_or_else(|| workflow_id.clone());
        info!(workflow_id, thread_id, "starting bug fix workflow");

        let cancel = CancellationToken::new();
        let graph = self.build_bug_fix_graph(&cancel);
        self.run_graph(graph, state, thread_id, 0, None, cancel).await
    }

    /// Request cancellation of a running workflow. Non-blocking; returns
    /// false when the thread is unknown or already finished.
    pub fn cancel(&self, thread_id: &str) -> bool {
        match self.cancellations.get(thread_id) {
            Some(token) => {
                info!(thread_id, "cancellation requested");
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Resume a thread from its latest checkpoint.
    ///
    /// A terminal snapshot makes this a no-op returning the final state.
    pub async fn resume(&self, thread_id: &str) -> Result<WorkflowState> {
        let checkpoint = self
            .checkpointer
            .latest(thread_id)
            .await
            .map_err(|e| AgentFlowError::Storage {
                message: format!("failed to load checkpoint for {thread_id}"),
                source: Some(Box::new(e)),
            })?
            .ok_or_else(|| AgentFlowError::Validation {
                message: format!("no checkpoints for thread {thread_id}"),
            })?;

        let state = checkpoint.state;
        if state.status.is_terminal() {
            info!(thread_id, status = %state.status, "resume is a no-op on terminal thread");
            return Ok(state);
        }

        let resume_after = if state.current_step == "start" {
            None
        } else {
            Some(state.current_step.clone())
        };
        info!(thread_id, after = ?resume_after, "resuming workflow");

        let cancel = CancellationToken::new();
        let graph = match state.workflow_type {
            WorkflowType::FeatureDevelopment => self.build_feature_development_graph(&cancel),
            WorkflowType::BugFix => self.build_bug_fix_graph(&cancel),
            other => {
                return Err(AgentFlowError::Validation {
                    message: format!("resume is not supported for workflow type {other}"),
                })
            }
        };
        self.run_graph(
            graph,
            state,
            thread_id.to_string(),
            checkpoint.seq,
            resume_after,
            cancel,
        )
        .await
    }

    /// Wait for in-flight workflows to finish, then release pooled clients.
    pub async fn shutdown(&self) {
        loop {
            let notified = self.idle.notified();
            if self.active.load(Ordering::SeqCst) == 0 {
                break;
            }
            notified.await;
        }
        self.pool.close_all();
        info!("orchestrator shut down");
    }

    async fn run_graph(
        &self,
        graph: StateGraph,
        initial: WorkflowState,
        thread_id: String,
        start_seq: u64,
        resume_after: Option<String>,
        cancel: CancellationToken,
    ) -> Result<WorkflowState> {
        let _active = ActiveGuard::enter(self.active.clone(), self.idle.clone());
        self.cancellations.insert(thread_id.clone(), cancel.clone());

        self.emitter.emit(WorkflowEvent::WorkflowStarted {
            workflow_id: initial.workflow_id.clone(),
            workflow_type: initial.workflow_type,
            requirement: initial.requirement.clone(),
            started_at: initial.started_at.unwrap_or_else(Utc::now),
        });

        let executor = GraphExecutor::new(
            graph,
            self.checkpointer.clone(),
            self.settings.max_concurrent_agents,
            Some(self.emitter.clone()),
        );
        let result = async {
            let mut stream =
                executor.stream(initial, thread_id.clone(), cancel, start_seq, resume_after)?;
            while let Some(event) = stream.next_event().await {
                self.emitter.emit(WorkflowEvent::WorkflowStatus {
                    workflow_id: event.state.workflow_id.clone(),
                    status: event.state.status,
                    current_step: event.state.current_step.clone(),
                    completed_steps: event.state.completed_steps.clone(),
                });
            }
            stream.join().await
        }
        .await;

        self.cancellations.remove(&thread_id);
        let final_state = result?;

        if let Err(e) = self.save_artifact(&final_state).await {
            error!(workflow_id = %final_state.workflow_id, error = %e, "failed to write artifact JSON");
            return Err(e);
        }

        self.emitter.emit(WorkflowEvent::WorkflowCompleted {
            workflow_id: final_state.workflow_id.clone(),
            status: final_state.status,
            completed_at: final_state.completed_at.unwrap_or_else(Utc::now),
        });
        info!(
            workflow_id = %final_state.workflow_id,
            status = %final_state.status,
            files = final_state.files_created.len(),
            "workflow finished"
        );
        Ok(final_state)
    }

    /// Serialize the final state summary to `<output>/langgraph_<id>.json`.
    async fn save_artifact(&self, state: &WorkflowState) -> Result<PathBuf> {
        let output_dir = if self.settings.output_directory.is_absolute() {
            self.settings.output_directory.clone()
        } else {
            self.settings.workspace.join(&self.settings.output_directory)
        };
        tokio::fs::create_dir_all(&output_dir)
            .await
            .map_err(|e| AgentFlowError::Storage {
                message: format!("failed to create output directory {}", output_dir.display()),
                source: Some(Box::new(e)),
            })?;

        let artifact = json!({
            "workflow_id": state.workflow_id,
            "workflow_type": state.workflow_type,
            "status": state.status,
            "requirement": state.requirement,
            "completed_steps": state.completed_steps,
            "files_created": state.files_created,
            "errors": state.errors,
            "started_at": state.started_at,
            "completed_at": state.completed_at.unwrap_or_else(Utc::now),
        });
        let path = output_dir.join(format!("langgraph_{}.json", state.workflow_id));
        let bytes = serde_json::to_vec_pretty(&artifact).map_err(|e| AgentFlowError::Storage {
            message: "failed to serialize artifact".to_string(),
            source: Some(Box::new(e)),
        })?;
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| AgentFlowError::Storage {
                message: format!("failed to write artifact {}", path.display()),
                source: Some(Box::new(e)),
            })?;
        info!(path = %path.display(), "saved workflow artifact");
        Ok(path)
    }

    // ==================== Graph builders ====================

    /// Feature development: analysis, design, implementation, then QA and
    /// infrastructure in parallel, joined by documentation.
    fn build_feature_development_graph(&self, cancel: &CancellationToken) -> StateGraph {
        let mut graph = StateGraph::new();

        graph.add_node_fn(
            "business_analyst",
            self.agent_node(
                "business_analyst",
                NodeField::BusinessAnalysis,
                AgentRole::BusinessAnalyst,
                cancel,
                false,
                None,
                Arc::new(|state: &WorkflowState| {
                    Task::new("ba", "Analyze requirements and create user stories")
                        .with_context_value("requirement", json!(state.requirement))
                        .with_context_value("workflow_type", json!(state.workflow_type.as_str()))
                        .with_context_value(
                            "task_type",
                            json!(TaskType::RequirementsAnalysis.as_str()),
                        )
                }),
            ),
        );

        graph.add_node_fn(
            "architecture_design",
            self.agent_node(
                "architecture_design",
                NodeField::Architecture,
                AgentRole::Developer,
                cancel,
                false,
                Some(Handoff {
                    from: "business_analyst",
                    to: "architecture_design",
                    message: "Requirements and user stories are ready for architecture design",
                }),
                Arc::new(|state: &WorkflowState| {
                    Task::new("dev_design", "Design system architecture based on requirements")
                        .with_context_value("requirement", json!(state.requirement))
                        .with_context_value("workflow_type", json!(state.workflow_type.as_str()))
                        .with_context_value(
                            "task_type",
                            json!(TaskType::ArchitectureDesign.as_str()),
                        )
                        .with_context_value(
                            "business_analysis",
                            latest_result_value(state, NodeField::BusinessAnalysis),
                        )
                }),
            ),
        );

        graph.add_node_fn(
            "implementation",
            self.agent_node(
                "implementation",
                NodeField::Implementation,
                AgentRole::Developer,
                cancel,
                false,
                None,
                Arc::new(|state: &WorkflowState| {
                    Task::new("dev_impl", "Implement the feature based on architecture design")
                        .with_context_value("requirement", json!(state.requirement))
                        .with_context_value("workflow_type", json!(state.workflow_type.as_str()))
                        .with_context_value("task_type", json!(TaskType::Implementation.as_str()))
                        .with_context_value(
                            "architecture",
                            latest_result_value(state, NodeField::Architecture),
                        )
                }),
            ),
        );

        graph.add_node_fn(
            "qa_testing",
            self.agent_node(
                "qa_testing",
                NodeField::Tests,
                AgentRole::QaEngineer,
                cancel,
                false,
                None,
                Arc::new(|state: &WorkflowState| {
                    Task::new("qa", "Create comprehensive tests for the implementation")
                        .with_context_value("requirement", json!(state.requirement))
                        .with_context_value("task_type", json!(TaskType::Testing.as_str()))
                        .with_context_value(
                            "implementation",
                            latest_result_value(state, NodeField::Implementation),
                        )
                }),
            ),
        );

        graph.add_node_fn(
            "infrastructure",
            self.agent_node(
                "infrastructure",
                NodeField::Infrastructure,
                AgentRole::DevopsEngineer,
                cancel,
                false,
                None,
                Arc::new(|state: &WorkflowState| {
                    Task::new("devops", "Create infrastructure and deployment configuration")
                        .with_context_value("requirement", json!(state.requirement))
                        .with_context_value("task_type", json!(TaskType::Infrastructure.as_str()))
                        .with_context_value(
                            "implementation",
                            latest_result_value(state, NodeField::Implementation),
                        )
                }),
            ),
        );

        graph.add_node_fn(
            "documentation",
            self.agent_node(
                "documentation",
                NodeField::Documentation,
                AgentRole::TechnicalWriter,
                cancel,
                true,
                Some(Handoff {
                    from: "system",
                    to: "documentation",
                    message:
                        "All development, testing, and infrastructure work completed. Ready for documentation.",
                }),
                Arc::new(|state: &WorkflowState| {
                    Task::new("writer", "Create comprehensive documentation")
                        .with_context_value("requirement", json!(state.requirement))
                        .with_context_value("task_type", json!(TaskType::Documentation.as_str()))
                        .with_context_value(
                            "implementation",
                            latest_result_value(state, NodeField::Implementation),
                        )
                        .with_context_value("tests", latest_result_value(state, NodeField::Tests))
                        .with_context_value(
                            "infrastructure",
                            latest_result_value(state, NodeField::Infrastructure),
                        )
                }),
            ),
        );

        graph.set_entry_point("business_analyst");
        graph.add_edge("business_analyst", "architecture_design");
        graph.add_edge("architecture_design", "implementation");
        graph.add_conditional_edges("implementation", should_continue_after_implementation);
        graph.add_edge("qa_testing", "documentation");
        graph.add_edge("infrastructure", "documentation");
        graph
    }

    /// Bug fix: analysis, fix, regression tests, release notes.
    fn build_bug_fix_graph(&self, cancel: &CancellationToken) -> StateGraph {
        let mut graph = StateGraph::new();

        graph.add_node_fn(
            "bug_analysis",
            self.agent_node(
                "bug_analysis",
                NodeField::BugAnalysis,
                AgentRole::QaEngineer,
                cancel,
                false,
                None,
                Arc::new(|state: &WorkflowState| {
                    Task::new("bug_analysis", "Analyze and reproduce the bug")
                        .with_context_value("requirement", json!(state.requirement))
                        .with_context_value(
                            "bug_description",
                            json!(state.bug_description.clone().unwrap_or_default()),
                        )
                        .with_context_value("task_type", json!(TaskType::BugAnalysis.as_str()))
                }),
            ),
        );

        graph.add_node_fn(
            "bug_fix",
            self.agent_node(
                "bug_fix",
                NodeField::BugFix,
                AgentRole::Developer,
                cancel,
                false,
                None,
                Arc::new(|state: &WorkflowState| {
                    Task::new("bug_fix", "Fix the bug")
                        .with_context_value("requirement", json!(state.requirement))
                        .with_context_value("task_type", json!(TaskType::BugFix.as_str()))
                        .with_context_value(
                            "bug_analysis",
                            latest_result_value(state, NodeField::BugAnalysis),
                        )
                }),
            ),
        );

        graph.add_node_fn(
            "regression_testing",
            self.agent_node(
                "regression_testing",
                NodeField::RegressionTests,
                AgentRole::QaEngineer,
                cancel,
                false,
                None,
                Arc::new(|state: &WorkflowState| {
                    Task::new("regression", "Run regression tests for the fix")
                        .with_context_value("requirement", json!(state.requirement))
                        .with_context_value(
                            "task_type",
                            json!(TaskType::RegressionTesting.as_str()),
                        )
                        .with_context_value(
                            "bug_fix",
                            latest_result_value(state, NodeField::BugFix),
                        )
                }),
            ),
        );

        graph.add_node_fn(
            "release_notes",
            self.agent_node(
                "release_notes",
                NodeField::ReleaseNotes,
                AgentRole::TechnicalWriter,
                cancel,
                true,
                None,
                Arc::new(|state: &WorkflowState| {
                    Task::new("release_notes", "Update release notes")
                        .with_context_value("requirement", json!(state.requirement))
                        .with_context_value("task_type", json!(TaskType::ReleaseNotes.as_str()))
                        .with_context_value(
                            "bug_fix",
                            latest_result_value(state, NodeField::BugFix),
                        )
                }),
            ),
        );

        graph.set_entry_point("bug_analysis");
        graph.add_edge("bug_analysis", "bug_fix");
        graph.add_edge("bug_fix", "regression_testing");
        graph.add_edge("regression_testing", "release_notes");
        graph
    }

    /// Wrap a role runtime as a graph node.
    ///
    /// Terminal nodes close the workflow (status completed, completed_at
    /// stamped) even when their own task failed; the failure stays on
    /// record in `errors`. Non-terminal failures mark the workflow failed.
    #[allow(clippy::too_many_arguments)]
    fn agent_node(
        &self,
        step: &'static str,
        field: NodeField,
        role: AgentRole,
        cancel: &CancellationToken,
        terminal: bool,
        handoff: Option<Handoff>,
        build_task: TaskBuilder,
    ) -> NodeFn {
        let runtime = self
            .runtimes
            .get(&role)
            .cloned()
            .expect("runtime registered for every role at construction");
        let emitter = self.emitter.clone();
        let cancel = cancel.clone();

        Arc::new(move |state: WorkflowState| {
            let runtime = runtime.clone();
            let emitter = emitter.clone();
            let cancel = cancel.clone();
            let build_task = build_task.clone();
            Box::pin(async move {
                let workflow_id = state.workflow_id.clone();

                if let Some(handoff) = handoff {
                    emitter.emit(WorkflowEvent::InterAgentHandoff {
                        from_node: handoff.from.to_string(),
                        to_node: handoff.to.to_string(),
                        message: handoff.message.to_string(),
                    });
                }
                emitter.emit(WorkflowEvent::NodeStarted {
                    workflow_id: workflow_id.clone(),
                    node_name: step.to_string(),
                    role,
                });

                let task = build_task(&state);
                emitter.emit(WorkflowEvent::NodeAction {
                    workflow_id: workflow_id.clone(),
                    node_name: step.to_string(),
                    description: task.description.clone(),
                    details: None,
                });

                let result = runtime.run(&task, &cancel).await;
                match result.status {
                    NodeStatus::Completed => {
                        emitter.emit(WorkflowEvent::NodeCompleted {
                            workflow_id,
                            node_name: step.to_string(),
                            summary: result
                                .summary
                                .clone()
                                .unwrap_or_else(|| format!("{step} completed")),
                            files_created: result.files_created.clone(),
                        });
                        let mut delta = StateDelta::for_step(step).with_result(field, result);
                        if terminal {
                            delta = delta
                                .with_status(WorkflowStatus::Completed)
                                .with_completed_at(Utc::now());
                        }
                        delta
                    }
                    NodeStatus::Failed => {
                        let message = result
                            .error
                            .clone()
                            .unwrap_or_else(|| "unknown error".to_string());
                        warn!(step, error = %message, "node failed");
                        emitter.emit(WorkflowEvent::NodeFailed {
                            workflow_id,
                            node_name: step.to_string(),
                            error: message.clone(),
                        });
                        let mut delta = StateDelta::for_step(step)
                            .with_result(field, result)
                            .with_error(WorkflowError::new(step, message));
                        if terminal {
                            delta = delta
                                .with_status(WorkflowStatus::Completed)
                                .with_completed_at(Utc::now());
                        } else {
                            delta = delta.with_status(WorkflowStatus::Failed);
                        }
                        delta
                    }
                }
            })
        })
    }
}

/// Conditional routing after implementation: stop on failure, otherwise fan
/// out QA and infrastructure in parallel.
pub fn should_continue_after_implementation(state: &WorkflowState) -> Route {
    if state.has_error_for_step("implementation") {
        warn!("implementation failed, stopping workflow");
        return Route::End;
    }
    if let Some(latest) = state.latest_result(NodeField::Implementation) {
        if latest.status == NodeStatus::Failed {
            warn!("implementation marked as failed");
            return Route::End;
        }
    }
    info!("implementation successful, proceeding with parallel QA and infrastructure");
    Route::parallel(["qa_testing", "infrastructure"], state)
}

fn latest_result_value(state: &WorkflowState, field: NodeField) -> Value {
    state
        .latest_result(field)
        .and_then(|r| serde_json::to_value(r).ok())
        .unwrap_or_else(|| json!({}))
}

fn generate_workflow_id(prefix: &str) -> String {
    let timestamp = Utc::now().format("%Y%m%d_%H%M%S");
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{prefix}_{timestamp}_{}", &suffix[..6])
}

/// Tracks in-flight workflows for graceful shutdown.
struct ActiveGuard {
    active: Arc<AtomicUsize>,
    idle: Arc<Notify>,
}

impl ActiveGuard {
    fn enter(active: Arc<AtomicUsize>, idle: Arc<Notify>) -> Self {
        active.fetch_add(1, Ordering::SeqCst);
        Self { active, idle }
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        if self.active.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.idle.notify_waiters();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentflow_core::NodeResult;

    fn base_state() -> WorkflowState {
        WorkflowState::new(
            "req",
            WorkflowType::FeatureDevelopment,
            "wf_route",
            None,
        )
    }

    #[test]
    fn test_workflow_ids_are_unique_and_prefixed() {
        let a = generate_workflow_id("workflow");
        let b = generate_workflow_id("workflow");
        assert!(a.starts_with("workflow_"));
        assert_ne!(a, b);
    }

    #[test]
    fn test_route_fans_out_on_success() {
        let mut state = base_state();
        state.apply(
            StateDelta::for_step("implementation").with_result(
                NodeField::Implementation,
                NodeResult::completed(AgentRole::Developer, "dev_1"),
            ),
        );
        match should_continue_after_implementation(&state) {
            Route::Parallel(sends) => {
                let targets: Vec<&str> = sends.iter().map(|s| s.target.as_str()).collect();
                assert_eq!(targets, vec!["qa_testing", "infrastructure"]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_route_ends_on_implementation_error() {
        let mut state = base_state();
        state.apply(
            StateDelta::for_step("implementation")
                .with_error(WorkflowError::new("implementation", "boom")),
        );
        assert!(matches!(
            should_continue_after_implementation(&state),
            Route::End
        ));
    }

    #[test]
    fn test_route_ends_on_failed_result_record() {
        let mut state = base_state();
        state.apply(StateDelta::for_step("implementation").with_result(
            NodeField::Implementation,
            NodeResult::failed(AgentRole::Developer, "dev_1", "compile error"),
        ));
        assert!(matches!(
            should_continue_after_implementation(&state),
            Route::End
        ));
    }

    #[test]
    fn test_latest_result_value_defaults_to_empty_object() {
        let state = base_state();
        assert_eq!(latest_result_value(&state, NodeField::Tests), json!({}));
    }
}
