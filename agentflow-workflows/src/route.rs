//! Routing decisions returned by conditional edges.

use agentflow_core::WorkflowState;

/// Dispatch of a state snapshot to a named target node.
///
/// A conditional edge returning several of these fans execution out into
/// concurrent sibling branches, each with its own snapshot.
#[derive(Debug, Clone)]
pub struct Send {
    pub target: String,
    pub state: WorkflowState,
}

impl Send {
    pub fn new(target: impl Into<String>, state: WorkflowState) -> Self {
        Self {
            target: target.into(),
            state,
        }
    }
}

/// Decision of a conditional edge.
#[derive(Debug, Clone)]
pub enum Route {
    /// Terminate this path of the graph.
    End,
    /// Continue with a single successor.
    Next(String),
    /// Fan out to several targets in parallel.
    Parallel(Vec<Send>),
}

impl Route {
    /// Convenience for the common two-way fan-out.
    pub fn parallel<I, S>(targets: I, state: &WorkflowState) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Route::Parallel(
            targets
                .into_iter()
                .map(|t| Send::new(t, state.clone()))
                .collect(),
        )
    }
}
