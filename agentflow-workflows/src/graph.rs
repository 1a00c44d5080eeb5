//! ABOUTME: Directed workflow graph: named nodes, plain and conditional edges, entry point
//! ABOUTME: Nodes are async callables from a state snapshot to a partial update

use crate::route::Route;
use agentflow_core::{AgentFlowError, Result, StateDelta, WorkflowState};
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

/// A node callable: immutable state snapshot in, partial update out.
pub type NodeFn = Arc<dyn Fn(WorkflowState) -> BoxFuture<'static, StateDelta> + Send + Sync>;

/// A conditional edge: maps the reduced state to a routing decision.
pub type RouteFn = Arc<dyn Fn(&WorkflowState) -> Route + Send + Sync>;

/// Workflow graph definition.
///
/// Plain edges give each node its successors; a node with several plain
/// successors fans out, and a node with several plain predecessors is a
/// join that runs only after all branches arrive. Conditional edges
/// override plain edges for their source node.
#[derive(Default)]
pub struct StateGraph {
    nodes: HashMap<String, NodeFn>,
    edges: HashMap<String, Vec<String>>,
    conditional: HashMap<String, RouteFn>,
    entry: Option<String>,
}

impl StateGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a node under `name`.
    pub fn add_node<F, Fut>(&mut self, name: impl Into<String>, node: F)
    where
        F: Fn(WorkflowState) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = StateDelta> + Send + 'static,
    {
        self.nodes
            .insert(name.into(), Arc::new(move |state| Box::pin(node(state))));
    }

    /// Register an already-boxed node.
    pub fn add_node_fn(&mut self, name: impl Into<String>, node: NodeFn) {
        self.nodes.insert(name.into(), node);
    }

    /// Add a directed plain edge.
    pub fn add_edge(&mut self, from: impl Into<String>, to: impl Into<String>) {
        self.edges.entry(from.into()).or_default().push(to.into());
    }

    /// Bind a conditional edge to `from`.
    pub fn add_conditional_edges<F>(&mut self, from: impl Into<String>, route: F)
    where
        F: Fn(&WorkflowState) -> Route + Send + Sync + 'static,
    {
        self.conditional.insert(from.into(), Arc::new(route));
    }

    /// Set the node execution begins at.
    pub fn set_entry_point(&mut self, name: impl Into<String>) {
        self.entry = Some(name.into());
    }

    pub fn entry_point(&self) -> Option<&str> {
        self.entry.as_deref()
    }

    pub fn node(&self, name: &str) -> Option<NodeFn> {
        self.nodes.get(name).cloned()
    }

    pub fn has_node(&self, name: &str) -> bool {
        self.nodes.contains_key(name)
    }

    /// Plain-edge successors of `name`.
    pub fn successors(&self, name: &str) -> &[String] {
        self.edges.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Routing decision for the state after `node` completed.
    ///
    /// A conditional edge wins over plain edges; zero plain successors
    /// terminates the path, one continues sequentially, several fan out.
    pub fn route_from(&self, node: &str, state: &WorkflowState) -> Route {
        if let Some(route) = self.conditional.get(node) {
            return route(state);
        }
        let successors = self.successors(node);
        match successors {
            [] => Route::End,
            [single] => Route::Next(single.clone()),
            many => Route::parallel(many.iter().map(String::clone), state),
        }
    }

    /// Number of distinct plain-edge predecessors of `name` (join arity).
    pub fn predecessor_count(&self, name: &str) -> usize {
        self.edges
            .values()
            .filter(|targets| targets.iter().any(|t| t == name))
            .count()
    }

    /// Check the graph is runnable: an entry point exists and every edge
    /// endpoint names a registered node.
    pub fn validate(&self) -> Result<()> {
        let entry = self
            .entry
            .as_deref()
            .ok_or_else(|| AgentFlowError::workflow("graph has no entry point"))?;
        if !self.nodes.contains_key(entry) {
            return Err(AgentFlowError::workflow(format!(
                "entry point '{entry}' is not a registered node"
            )));
        }
        for (from, targets) in &self.edges {
            if !self.nodes.contains_key(from) {
                return Err(AgentFlowError::workflow(format!(
                    "edge source '{from}' is not a registered node"
                )));
            }
            for to in targets {
                if !self.nodes.contains_key(to) {
                    return Err(AgentFlowError::workflow(format!(
                        "edge target '{to}' is not a registered node"
                    )));
                }
            }
        }
        for from in self.conditional.keys() {
            if !self.nodes.contains_key(from) {
                return Err(AgentFlowError::workflow(format!(
                    "conditional edge source '{from}' is not a registered node"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentflow_core::WorkflowType;

    fn noop_delta(step: &str) -> StateDelta {
        StateDelta::for_step(step)
    }

    fn graph_with_nodes(names: &[&'static str]) -> StateGraph {
        let mut graph = StateGraph::new();
        for name in names {
            let step = *name;
            graph.add_node(step, move |_state| {
                let step = step.to_string();
                async move { noop_delta(&step) }
            });
        }
        graph
    }

    fn state() -> WorkflowState {
        WorkflowState::new("req", WorkflowType::FeatureDevelopment, "wf", None)
    }

    #[test]
    fn test_validate_requires_entry_point() {
        let graph = graph_with_nodes(&["a"]);
        assert!(graph.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_unknown_edge_target() {
        let mut graph = graph_with_nodes(&["a"]);
        graph.set_entry_point("a");
        graph.add_edge("a", "missing");
        assert!(graph.validate().is_err());
    }

    #[test]
    fn test_route_plain_edges() {
        let mut graph = graph_with_nodes(&["a", "b", "c"]);
        graph.set_entry_point("a");
        graph.add_edge("a", "b");
        let s = state();
        assert!(matches!(graph.route_from("a", &s), Route::Next(n) if n == "b"));
        assert!(matches!(graph.route_from("c", &s), Route::End));
    }

    #[test]
    fn test_route_multiple_plain_edges_fans_out() {
        let mut graph = graph_with_nodes(&["a", "b", "c"]);
        graph.add_edge("a", "b");
        graph.add_edge("a", "c");
        match graph.route_from("a", &state()) {
            Route::Parallel(sends) => {
                let targets: Vec<&str> = sends.iter().map(|s| s.target.as_str()).collect();
                assert_eq!(targets, vec!["b", "c"]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_conditional_edge_wins_over_plain() {
        let mut graph = graph_with_nodes(&["a", "b"]);
        graph.add_edge("a", "b");
        graph.add_conditional_edges("a", |_state| Route::End);
        assert!(matches!(graph.route_from("a", &state()), Route::End));
    }

    #[test]
    fn test_predecessor_count_for_join() {
        let mut graph = graph_with_nodes(&["qa", "infra", "doc"]);
        graph.add_edge("qa", "doc");
        graph.add_edge("infra", "doc");
        assert_eq!(graph.predecessor_count("doc"), 2);
        assert_eq!(graph.predecessor_count("qa"), 0);
    }
}
