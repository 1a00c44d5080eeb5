//! ABOUTME: Streamed graph execution: node scheduling, reduction, checkpointing, cancellation
//! ABOUTME: Parallel Send siblings run concurrently under a semaphore; joins are barriers

use crate::graph::StateGraph;
use crate::route::{Route, Send as SendRecord};
use agentflow_core::{
    AgentFlowError, Result, StateDelta, WorkflowError, WorkflowState, WorkflowStatus,
};
use agentflow_events::{ProgressEmitter, WorkflowEvent};
use agentflow_state::Checkpointer;
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// One streamed execution step: the node that finished, its partial
/// update, and the post-reduce state.
#[derive(Debug, Clone)]
pub struct NodeEvent {
    pub node: String,
    pub delta: StateDelta,
    pub state: WorkflowState,
}

/// Where the driver picks up work.
enum Cursor {
    /// Execute this node next.
    Execute(String),
    /// This node already ran (resume); continue with its routing.
    RouteAfter(String),
}

/// Handle on a running graph execution.
pub struct ExecutionStream {
    /// Per-node events in completion order.
    pub events: mpsc::Receiver<NodeEvent>,
    handle: tokio::task::JoinHandle<Result<WorkflowState>>,
}

impl ExecutionStream {
    /// Wait for the driver to finish, discarding any unread events.
    pub async fn join(mut self) -> Result<WorkflowState> {
        self.events.close();
        match self.handle.await {
            Ok(result) => result,
            Err(e) => Err(AgentFlowError::Internal {
                message: format!("graph driver task failed: {e}"),
            }),
        }
    }

    /// Receive the next event, or `None` once execution finished.
    pub async fn next_event(&mut self) -> Option<NodeEvent> {
        self.events.recv().await
    }

    /// Drain remaining events and return the final state.
    pub async fn finish(mut self) -> Result<WorkflowState> {
        while self.events.recv().await.is_some() {}
        match self.handle.await {
            Ok(result) => result,
            Err(e) => Err(AgentFlowError::Internal {
                message: format!("graph driver task failed: {e}"),
            }),
        }
    }
}

/// Executes a [`StateGraph`] over a workflow thread.
pub struct GraphExecutor {
    graph: Arc<StateGraph>,
    checkpointer: Arc<dyn Checkpointer>,
    max_concurrency: usize,
    emitter: Option<ProgressEmitter>,
}

impl GraphExecutor {
    pub fn new(
        graph: StateGraph,
        checkpointer: Arc<dyn Checkpointer>,
        max_concurrency: usize,
        emitter: Option<ProgressEmitter>,
    ) -> Self {
        Self {
            graph: Arc::new(graph),
            checkpointer,
            max_concurrency: max_concurrency.max(1),
            emitter,
        }
    }

    /// Start executing and stream per-node events.
    ///
    /// `start_seq` is the checkpoint sequence to continue from (zero for a
    /// fresh thread); `resume_after`, when set, skips straight to the
    /// routing decision of an already-completed node.
    pub fn stream(
        &self,
        initial: WorkflowState,
        thread_id: String,
        cancel: CancellationToken,
        start_seq: u64,
        resume_after: Option<String>,
    ) -> Result<ExecutionStream> {
        self.graph.validate()?;
        let entry = self
            .graph
            .entry_point()
            .map(str::to_string)
            .ok_or_else(|| AgentFlowError::workflow("graph has no entry point"))?;

        let (tx, rx) = mpsc::channel(64);
        let driver = Driver {
            graph: self.graph.clone(),
            checkpointer: self.checkpointer.clone(),
            semaphore: Arc::new(Semaphore::new(self.max_concurrency)),
            emitter: self.emitter.clone(),
            thread_id,
            cancel,
            tx,
        };
        let cursor = match resume_after {
            Some(node) => Cursor::RouteAfter(node),
            None => Cursor::Execute(entry),
        };
        let handle = tokio::spawn(driver.run(initial, start_seq, cursor));
        Ok(ExecutionStream { events: rx, handle })
    }

    /// Execute to completion, ignoring intermediate events.
    pub async fn run(
        &self,
        initial: WorkflowState,
        thread_id: String,
        cancel: CancellationToken,
    ) -> Result<WorkflowState> {
        self.stream(initial, thread_id, cancel, 0, None)?
            .finish()
            .await
    }
}

struct Driver {
    graph: Arc<StateGraph>,
    checkpointer: Arc<dyn Checkpointer>,
    semaphore: Arc<Semaphore>,
    emitter: Option<ProgressEmitter>,
    thread_id: String,
    cancel: CancellationToken,
    tx: mpsc::Sender<NodeEvent>,
}

impl Driver {
    async fn run(
        self,
        mut state: WorkflowState,
        mut seq: u64,
        mut cursor: Cursor,
    ) -> Result<WorkflowState> {
        loop {
            if self.cancel.is_cancelled() {
                return Ok(self.finish_cancelled(state, &mut seq).await);
            }
            if state.status.is_terminal() {
                info!(
                    thread_id = %self.thread_id,
                    status = %state.status,
                    "workflow reached terminal status"
                );
                return Ok(state);
            }

            match cursor {
                Cursor::Execute(node) => {
                    let delta = self.run_node(&node, state.clone()).await;
                    self.reduce_and_checkpoint(&node, delta, &mut state, &mut seq)
                        .await?;
                    cursor = Cursor::RouteAfter(node);
                }
                Cursor::RouteAfter(node) => match self.graph.route_from(&node, &state) {
                    Route::End => {
                        debug!(thread_id = %self.thread_id, after = %node, "graph path ended");
                        return Ok(state);
                    }
                    Route::Next(next) => {
                        cursor = Cursor::Execute(next);
                    }
                    Route::Parallel(sends) => {
                        let join = self.join_target(&sends)?;
                        self.run_parallel(sends, &mut state, &mut seq).await?;
                        if state.status.is_terminal() || self.cancel.is_cancelled() {
                            // Loop head handles terminal/cancelled states.
                            cursor = Cursor::RouteAfter(node);
                            continue;
                        }
                        match join {
                            Some(join) => cursor = Cursor::Execute(join),
                            None => return Ok(state),
                        }
                    }
                },
            }
        }
    }

    /// Invoke one node with a panic safety net: an unexpected panic becomes
    /// a failed step rather than tearing down the workflow.
    async fn run_node(&self, name: &str, snapshot: WorkflowState) -> StateDelta {
        let Some(node) = self.graph.node(name) else {
            return failed_step_delta(name, format!("unknown node '{name}'"));
        };
        debug!(thread_id = %self.thread_id, node = name, "executing node");
        match tokio::spawn(node(snapshot)).await {
            Ok(delta) => delta,
            Err(e) => {
                error!(thread_id = %self.thread_id, node = name, error = %e, "node panicked");
                failed_step_delta(name, format!("node panicked: {e}"))
            }
        }
    }

    /// Merge a delta, checkpoint, and publish the step event.
    ///
    /// A checkpoint failure aborts the workflow with failed status.
    async fn reduce_and_checkpoint(
        &self,
        node: &str,
        delta: StateDelta,
        state: &mut WorkflowState,
        seq: &mut u64,
    ) -> Result<()> {
        state.apply(delta.clone());
        *seq += 1;
        if let Err(e) = self.checkpointer.save(&self.thread_id, *seq, state).await {
            error!(
                thread_id = %self.thread_id,
                seq = *seq,
                error = %e,
                "checkpoint save failed, aborting workflow"
            );
            state.status = WorkflowStatus::Failed;
            state
                .errors
                .push(WorkflowError::new(node, format!("checkpoint save failed: {e}")));
        }
        let event = NodeEvent {
            node: node.to_string(),
            delta,
            state: state.clone(),
        };
        // The receiver may have been dropped (fire-and-forget execution).
        let _ = self.tx.send(event).await;
        Ok(())
    }

    /// The unique join node the parallel targets converge on, if any.
    fn join_target(&self, sends: &[SendRecord]) -> Result<Option<String>> {
        let mut joins: Vec<String> = Vec::new();
        for send in sends {
            for successor in self.graph.successors(&send.target) {
                if !joins.contains(successor) {
                    joins.push(successor.clone());
                }
            }
        }
        match joins.len() {
            0 => Ok(None),
            1 => Ok(Some(joins.remove(0))),
            _ => Err(AgentFlowError::workflow(format!(
                "parallel branches must converge on a single join, found {joins:?}"
            ))),
        }
    }

    /// Run Send siblings concurrently; deltas are reduced in completion
    /// order, which is safe because siblings only touch append fields.
    async fn run_parallel(
        &self,
        sends: Vec<SendRecord>,
        state: &mut WorkflowState,
        seq: &mut u64,
    ) -> Result<()> {
        let targets: Vec<String> = sends.iter().map(|s| s.target.clone()).collect();
        info!(thread_id = %self.thread_id, ?targets, "dispatching parallel branches");
        if let Some(emitter) = &self.emitter {
            emitter.emit(WorkflowEvent::ParallelStart {
                targets: targets.clone(),
            });
        }

        let mut join_set: JoinSet<(String, StateDelta)> = JoinSet::new();
        for send in sends {
            let name = send.target.clone();
            let Some(node) = self.graph.node(&name) else {
                let delta = failed_step_delta(&name, format!("unknown node '{name}'"));
                self.reduce_and_checkpoint(&name, delta, state, seq).await?;
                continue;
            };
            let semaphore = self.semaphore.clone();
            let snapshot = send.state;
            join_set.spawn(async move {
                // The semaphore is never closed while the driver lives.
                let _permit = semaphore.acquire_owned().await.ok();
                let delta = node(snapshot).await;
                (name, delta)
            });
        }

        loop {
            let joined = tokio::select! {
                _ = self.cancel.cancelled() => {
                    // Cancelled mid-fan-out: abort siblings and skip the
                    // reduction of any still-running node's return value.
                    warn!(thread_id = %self.thread_id, "cancellation during parallel execution");
                    join_set.abort_all();
                    while join_set.join_next().await.is_some() {}
                    return Ok(());
                }
                joined = join_set.join_next() => joined,
            };
            let Some(result) = joined else { break };
            match result {
                Ok((name, delta)) => {
                    self.reduce_and_checkpoint(&name, delta, state, seq).await?;
                }
                Err(e) if e.is_cancelled() => {}
                Err(e) => {
                    error!(thread_id = %self.thread_id, error = %e, "parallel branch panicked");
                    let delta = failed_step_delta("parallel", format!("branch panicked: {e}"));
                    self.reduce_and_checkpoint("parallel", delta, state, seq)
                        .await?;
                }
            }
        }

        if let Some(emitter) = &self.emitter {
            emitter.emit(WorkflowEvent::ParallelComplete { targets });
        }
        Ok(())
    }

    /// Stamp the cancelled status and persist a final checkpoint.
    async fn finish_cancelled(&self, mut state: WorkflowState, seq: &mut u64) -> WorkflowState {
        info!(thread_id = %self.thread_id, "workflow cancelled");
        state.status = WorkflowStatus::Cancelled;
        state.completed_at = Some(Utc::now());
        *seq += 1;
        if let Err(e) = self.checkpointer.save(&self.thread_id, *seq, &state).await {
            error!(thread_id = %self.thread_id, error = %e, "failed to persist cancellation checkpoint");
        }
        state
    }
}

/// Delta recording a failed step; the step still enters `completed_steps`
/// so each node is visited at most once per path.
fn failed_step_delta(step: &str, error: String) -> StateDelta {
    StateDelta::for_step(step)
        .with_error(WorkflowError::new(step, error))
        .with_status(WorkflowStatus::Failed)
}
