//! Error types for graph construction and pipeline execution.

use crate::graph::NodeId;
use std::sync::Arc;

/// Failure raised by a node callable, carrying the classifier state the retry
/// evaluator needs since Rust has no runtime exception hierarchy to match
/// against (see DESIGN.md).
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct NodeError {
    pub message: String,
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl NodeError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into(), source: None }
    }

    pub fn from_source(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        let source = err.into();
        Self { message: source.to_string(), source: Some(source) }
    }
}

/// Fatal errors raised while assembling a `Graph` + `NodeTable` with
/// `GraphBuilder`, before `Scheduler::run` is ever called.
#[derive(Debug, thiserror::Error, PartialEq, Eq, Clone)]
pub enum BuildError {
    #[error("node '{0}' is not present in the node table")]
    MissingNode(NodeId),
    #[error("output node '{0}' is unreachable from input node '{1}'")]
    OutputUnreachable(NodeId, NodeId),
    #[error("switch node '{0}' has no decider edge")]
    MissingDecider(NodeId),
    #[error("switch node '{0}' has duplicate case label '{1}'")]
    DuplicateCaseLabel(NodeId, String),
    #[error("one-of head '{0}' has an empty candidate list")]
    EmptyOneOf(NodeId),
    #[error("recurrent destination '{0}' has no start node")]
    MissingStartNode(NodeId),
    #[error("recurrent destination '{0}' has max_iterations=0")]
    ZeroIterations(NodeId),
    #[error("graph contains a cycle among normal edges")]
    Cycle,
}

/// Errors surfaced to pipeline callers, carried by `PipelineResult::error`.
#[derive(Debug, thiserror::Error)]
pub enum DagError {
    #[error("node '{node}' execution failed: {source}")]
    NodeExecution { node: NodeId, #[source] source: NodeError },

    #[error("input into node '{node}' was itself an error")]
    InputPropagation { node: NodeId, #[source] source: Arc<DagError> },

    #[error("one-of head '{0}' has no successful candidate")]
    OneOfExhausted(NodeId),

    #[error(
        "recurrent subgraph (start='{start}', dest='{dest}') did not converge within max_iterations, last_value={last_value}"
    )]
    RecurrenceExhausted { start: NodeId, dest: NodeId, last_value: serde_json::Value },

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error("required worker pool unavailable for node '{0}'")]
    PoolUnavailable(NodeId),

    #[error("scheduler task panicked: {0}")]
    TaskPanicked(String),
}

pub type DagResult<T> = Result<T, DagError>;
