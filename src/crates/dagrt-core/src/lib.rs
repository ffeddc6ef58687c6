//! Execution engine for typed dependency graphs: a cooperative scheduler
//! over a `Graph` + `NodeTable` that supports retry/default policy,
//! switch/case branching, one-of (first-success) selection and bounded
//! recurrent subgraph iteration.
//!
//! A pipeline is built with [`builder::GraphBuilder`] into a validated
//! `(Graph, NodeTable)` pair, handed to a [`scheduler::Scheduler`], and run
//! against a [`context::PipelineContext`] to produce a
//! [`context::PipelineResult`].
//!
//! ```no_run
//! use dagrt_core::builder::GraphBuilder;
//! use dagrt_core::context::PipelineContext;
//! use dagrt_core::node::{NodeCallable, NodeDescriptor, NodeOutcome};
//! use dagrt_core::artifact::NoOpArtifactStore;
//! use dagrt_core::scheduler::Scheduler;
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let (graph, table) = GraphBuilder::new()
//!     .node(NodeDescriptor::new(
//!         "double",
//!         NodeCallable::Cooperative(Arc::new(|kwargs| {
//!             Box::pin(async move {
//!                 let x = kwargs["x"].as_i64().unwrap_or(0);
//!                 Ok(NodeOutcome::Value(serde_json::json!(x * 2)))
//!             })
//!         })),
//!     ))
//!     .build("double", "double")?;
//!
//! let scheduler = Scheduler::new(graph, table, "double", "double");
//! let mut input = dagrt_core::node::NodeKwargs::new();
//! input.insert("x".to_string(), serde_json::json!(21));
//! let ctx = PipelineContext::new("run-1", "demo", input, Arc::new(NoOpArtifactStore));
//! let result = scheduler.run(ctx).await;
//! assert_eq!(result.value, Some(serde_json::json!(42)));
//! # Ok(())
//! # }
//! ```

pub mod artifact;
pub mod builder;
pub mod config;
pub mod context;
pub mod error;
pub mod graph;
pub mod lock;
pub mod node;
pub mod pool;
pub mod retry;
pub mod scheduler;
pub mod store;
pub mod subgraph;

pub use builder::GraphBuilder;
pub use context::{HookList, ObservabilityHook, PipelineContext, PipelineResult};
pub use error::{DagError, DagResult, NodeError};
pub use graph::{Graph, NodeId};
pub use node::{NodeCallable, NodeDescriptor, NodeKwargs, NodeOutcome, NodeTable};
pub use scheduler::Scheduler;
