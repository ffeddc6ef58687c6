//! Node descriptors: the callable, its retry policy and its execution-pool tag.

use crate::error::NodeError;
use crate::graph::NodeId;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

/// Keyword inputs assembled for a node from its dependency edges, plus an
/// optional `additional_data` payload for recurrent start nodes.
pub type NodeKwargs = HashMap<String, serde_json::Value>;

pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

/// What a node callable returned.
#[derive(Debug, Clone)]
pub enum NodeOutcome {
    /// A regular value, published under the node's id.
    Value(serde_json::Value),
    /// A request for another iteration of the enclosing recurrent subgraph.
    Recurrent(serde_json::Value),
}

pub type NodeResult = Result<NodeOutcome, NodeError>;

/// Produces the node's default value from the same kwargs the failing
/// attempt received. Only invoked when the descriptor's `use_default` is set.
pub type DefaultProducer = Arc<dyn Fn(&NodeKwargs) -> Result<serde_json::Value, NodeError> + Send + Sync>;

/// Decides whether a given failure belongs to the descriptor's retryable set.
/// Defaults to "any failure is retryable".
pub type RetryClassifier = Arc<dyn Fn(&NodeError) -> bool + Send + Sync>;

/// The callable a node runs. `Cooperative` callables are polled in the
/// scheduler's own dispatch task (suspension only at `.await` points);
/// `Blocking` callables are synchronous and get offloaded to a worker pool
/// chosen by the node's `Process` tag (see `pool.rs`).
#[derive(Clone)]
pub enum NodeCallable {
    Cooperative(Arc<dyn Fn(NodeKwargs) -> BoxFuture<NodeResult> + Send + Sync>),
    Blocking(Arc<dyn Fn(NodeKwargs) -> NodeResult + Send + Sync>),
}

impl fmt::Debug for NodeCallable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeCallable::Cooperative(_) => f.write_str("NodeCallable::Cooperative(..)"),
            NodeCallable::Blocking(_) => f.write_str("NodeCallable::Blocking(..)"),
        }
    }
}

/// Tags controlling storage and dispatch of a node: whether its result is
/// persisted to the artifact store, and which worker pool its callable runs
/// on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeTag {
    /// Do not call `ArtifactStore::save` for this node's results.
    SkipStore,
    /// Run `Blocking` callables on the dedicated process-parallel pool
    /// instead of the general thread pool.
    Process,
}

/// Immutable description of one node: its callable, retry parameters and
/// optional default-value producer.
#[derive(Clone)]
pub struct NodeDescriptor {
    pub id: NodeId,
    pub callable: NodeCallable,
    pub default: Option<DefaultProducer>,
    pub attempts: usize,
    pub delay: Duration,
    pub retryable: RetryClassifier,
    pub use_default: bool,
    pub tags: HashSet<NodeTag>,
}

impl fmt::Debug for NodeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeDescriptor")
            .field("id", &self.id)
            .field("callable", &self.callable)
            .field("attempts", &self.attempts)
            .field("delay", &self.delay)
            .field("use_default", &self.use_default)
            .field("tags", &self.tags)
            .finish()
    }
}

impl NodeDescriptor {
    pub fn new(id: impl Into<NodeId>, callable: NodeCallable) -> Self {
        Self {
            id: id.into(),
            callable,
            default: None,
            attempts: 1,
            delay: Duration::ZERO,
            retryable: Arc::new(|_| true),
            use_default: false,
            tags: HashSet::new(),
        }
    }

    pub fn with_retry(mut self, attempts: usize, delay: Duration) -> Self {
        assert!(attempts >= 1, "attempts must be >= 1");
        self.attempts = attempts;
        self.delay = delay;
        self
    }

    pub fn with_retryable(mut self, classifier: RetryClassifier) -> Self {
        self.retryable = classifier;
        self
    }

    pub fn with_default(mut self, producer: DefaultProducer) -> Self {
        self.default = Some(producer);
        self.use_default = true;
        self
    }

    pub fn with_tag(mut self, tag: NodeTag) -> Self {
        self.tags.insert(tag);
        self
    }

    pub fn skip_store(&self) -> bool {
        self.tags.contains(&NodeTag::SkipStore)
    }

    pub fn is_process_tagged(&self) -> bool {
        self.tags.contains(&NodeTag::Process)
    }
}

/// `NodeId -> NodeDescriptor` mapping supplied by the (out of scope) graph
/// builder alongside the `Graph` itself.
pub type NodeTable = HashMap<NodeId, NodeDescriptor>;
