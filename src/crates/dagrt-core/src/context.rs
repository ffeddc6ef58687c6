//! Pipeline context, observability hooks and the `PipelineResult` callers
//! receive from `Scheduler::run`.

use crate::error::DagError;
use crate::node::NodeKwargs;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;

/// Opaque payload threaded through a run for caller bookkeeping; the core
/// never inspects it.
pub type Meta = Arc<serde_json::Value>;

/// What the scheduler hands each node-execution task and what the four
/// observability hooks receive.
#[derive(Clone)]
pub struct PipelineContext {
    pub pipeline_id: String,
    pub model_name: String,
    pub input_kwargs: NodeKwargs,
    pub meta: Meta,
    pub artifact_store: Arc<dyn crate::artifact::ArtifactStore>,
    pub hooks: Arc<HookList>,
}

impl PipelineContext {
    pub fn new(
        pipeline_id: impl Into<String>,
        model_name: impl Into<String>,
        input_kwargs: NodeKwargs,
        artifact_store: Arc<dyn crate::artifact::ArtifactStore>,
    ) -> Self {
        Self {
            pipeline_id: pipeline_id.into(),
            model_name: model_name.into(),
            input_kwargs,
            meta: Arc::new(serde_json::Value::Null),
            artifact_store,
            hooks: Arc::new(HookList::default()),
        }
    }

    pub fn with_meta(mut self, meta: serde_json::Value) -> Self {
        self.meta = Arc::new(meta);
        self
    }

    pub fn with_hooks(mut self, hooks: HookList) -> Self {
        self.hooks = Arc::new(hooks);
        self
    }
}

/// One of the four observability callbacks fired around a pipeline run and
/// each node's execution. Implementors must never let an error escape; the
/// caller awaits hooks in registration order and ignores their outcome.
#[async_trait]
pub trait ObservabilityHook: Send + Sync {
    async fn pipeline_start(&self, _pipeline_id: &str) {}
    async fn pipeline_complete(&self, _pipeline_id: &str, _result: &PipelineResult) {}
    async fn node_start(&self, _pipeline_id: &str, _node_id: &str) {}
    async fn node_complete(&self, _pipeline_id: &str, _node_id: &str, _error: Option<&DagError>) {}
}

/// Registration-ordered list of hooks, awaited in order; a panicking or
/// erroring hook never affects pipeline success (hooks return nothing
/// fallible by construction, so there is nothing to swallow but we still
/// catch panics at the call site in `scheduler.rs`).
#[derive(Default)]
pub struct HookList {
    hooks: Vec<Arc<dyn ObservabilityHook>>,
}

impl HookList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(mut self, hook: Arc<dyn ObservabilityHook>) -> Self {
        self.hooks.push(hook);
        self
    }

    pub async fn pipeline_start(&self, pipeline_id: &str) {
        for h in &self.hooks {
            h.pipeline_start(pipeline_id).await;
        }
    }

    pub async fn pipeline_complete(&self, pipeline_id: &str, result: &PipelineResult) {
        for h in &self.hooks {
            h.pipeline_complete(pipeline_id, result).await;
        }
    }

    pub async fn node_start(&self, pipeline_id: &str, node_id: &str) {
        for h in &self.hooks {
            h.node_start(pipeline_id, node_id).await;
        }
    }

    pub async fn node_complete(&self, pipeline_id: &str, node_id: &str, error: Option<&DagError>) {
        for h in &self.hooks {
            h.node_complete(pipeline_id, node_id, error).await;
        }
    }
}

/// `tracing`-backed hook turning the four callbacks into structured log
/// events.
pub struct TracingHook;

#[async_trait]
impl ObservabilityHook for TracingHook {
    async fn pipeline_start(&self, pipeline_id: &str) {
        tracing::info!(pipeline_id, "pipeline_start");
    }

    async fn pipeline_complete(&self, pipeline_id: &str, result: &PipelineResult) {
        match &result.error {
            Some(e) => tracing::error!(pipeline_id, error = %e, "pipeline_complete"),
            None => tracing::info!(pipeline_id, "pipeline_complete"),
        }
    }

    async fn node_start(&self, pipeline_id: &str, node_id: &str) {
        tracing::debug!(pipeline_id, node_id, "node_start");
    }

    async fn node_complete(&self, pipeline_id: &str, node_id: &str, error: Option<&DagError>) {
        match error {
            Some(e) => tracing::warn!(pipeline_id, node_id, error = %e, "node_complete"),
            None => tracing::debug!(pipeline_id, node_id, "node_complete"),
        }
    }
}

/// One recorded call, for tests that assert on the observability trace —
/// e.g. that every failed one-of candidate's error shows up in the trace.
#[derive(Debug, Clone)]
pub enum TraceEvent {
    PipelineStart(String),
    PipelineComplete { pipeline_id: String, has_error: bool },
    NodeStart { pipeline_id: String, node_id: String },
    NodeComplete { pipeline_id: String, node_id: String, error: Option<String> },
}

/// In-memory hook that records every call, for assertions in integration
/// tests.
#[derive(Default, Clone)]
pub struct RecordingHook {
    events: Arc<Mutex<Vec<TraceEvent>>>,
}

impl RecordingHook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<TraceEvent> {
        self.events.lock().clone()
    }
}

#[async_trait]
impl ObservabilityHook for RecordingHook {
    async fn pipeline_start(&self, pipeline_id: &str) {
        self.events.lock().push(TraceEvent::PipelineStart(pipeline_id.to_string()));
    }

    async fn pipeline_complete(&self, pipeline_id: &str, result: &PipelineResult) {
        self.events.lock().push(TraceEvent::PipelineComplete {
            pipeline_id: pipeline_id.to_string(),
            has_error: result.error.is_some(),
        });
    }

    async fn node_start(&self, pipeline_id: &str, node_id: &str) {
        self.events.lock().push(TraceEvent::NodeStart {
            pipeline_id: pipeline_id.to_string(),
            node_id: node_id.to_string(),
        });
    }

    async fn node_complete(&self, pipeline_id: &str, node_id: &str, error: Option<&DagError>) {
        self.events.lock().push(TraceEvent::NodeComplete {
            pipeline_id: pipeline_id.to_string(),
            node_id: node_id.to_string(),
            error: error.map(|e| e.to_string()),
        });
    }
}

/// What `Scheduler::run` returns: the output node's value, or the first
/// fatal error observed.
#[derive(Debug, Clone)]
pub struct PipelineResult {
    pub pipeline_id: String,
    pub value: Option<serde_json::Value>,
    pub error: Option<Arc<DagError>>,
}

impl PipelineResult {
    pub fn ok(pipeline_id: impl Into<String>, value: serde_json::Value) -> Self {
        Self { pipeline_id: pipeline_id.into(), value: Some(value), error: None }
    }

    pub fn err(pipeline_id: impl Into<String>, error: DagError) -> Self {
        Self { pipeline_id: pipeline_id.into(), value: None, error: Some(Arc::new(error)) }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    /// Rethrows the stored error by cloning it into an owned `DagError`-like
    /// string wrapper; callers that only need `.value` never call this.
    pub fn raise_on_error(&self) -> Result<&serde_json::Value, Arc<DagError>> {
        match (&self.value, &self.error) {
            (_, Some(e)) => Err(e.clone()),
            (Some(v), None) => Ok(v),
            (None, None) => unreachable!("PipelineResult must carry a value or an error"),
        }
    }
}
