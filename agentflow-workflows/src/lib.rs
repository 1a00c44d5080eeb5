//! ABOUTME: Workflow graph engine and orchestrator for agentflow
//! ABOUTME: Graph definition, Send-style parallel routing, streamed execution, resume

pub mod executor;
pub mod graph;
pub mod orchestrator;
pub mod route;

pub use executor::{ExecutionStream, GraphExecutor, NodeEvent};
pub use graph::StateGraph;
pub use orchestrator::AgentOrchestrator;
pub use route::{Route, Send};
