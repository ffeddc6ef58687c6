//! The scheduler: cooperative dispatch over a `Graph` + `NodeTable`, driving
//! retry/default policy, switch resolution, one-of candidate racing and
//! bounded recurrence.
//!
//! Dispatch is organized around four task shapes, chosen per node by
//! [`dispatch_one`]:
//!
//! - a plain node just runs [`run_node_once`] (claim, wait for readiness,
//!   execute with retry/default, publish);
//! - a switch head runs [`drive_switch`] (resolve the decider, pick the
//!   matching case edge, run the chosen branch's ancestry);
//! - a one-of head runs [`drive_one_of`] (launch candidates in order,
//!   cancelling the rest on first success);
//! - the first encounter of a recurrent destination runs
//!   [`drive_recurrence_owner`], which owns the iterate-until-converged loop;
//!   any re-entry of that same `(start, dest)` pair while the marker is
//!   active falls through to the plain `run_node_once` path instead, so the
//!   loop has exactly one owner.
//!
//! Node failures are either fatal (recorded on `RunState`, which ends the
//! whole run) or captured locally (recorded on a [`CaptureContext`] scoped to
//! one one-of candidate or one recurrence iteration, which only ends that
//! sub-run). Every task that can fail is handed an `Option<Arc<CaptureContext>>`
//! to decide which of the two it means.

use crate::artifact::ArtifactValue;
use crate::context::PipelineContext;
use crate::error::{DagError, NodeError};
use crate::graph::{Graph, NodeId};
use crate::lock::{Condition, LockOrchestrator};
use crate::node::{NodeCallable, NodeDescriptor, NodeKwargs, NodeOutcome, NodeTable};
use crate::pool::WorkerPools;
use crate::retry::{self, RetryDecision};
use crate::store::{CaseResult, ResultStore, StoredValue};
use crate::subgraph;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Ties a validated `(Graph, NodeTable)` pair to a chosen input/output and
/// runs it to completion. Stateless between runs: every `run()` call starts
/// a fresh [`RunState`], so one `Scheduler` can execute the same pipeline
/// definition concurrently for independent inputs.
pub struct Scheduler {
    graph: Graph,
    table: Arc<NodeTable>,
    input_node: NodeId,
    output_node: NodeId,
    pools: Arc<WorkerPools>,
}

impl Scheduler {
    pub fn new(graph: Graph, table: NodeTable, input_node: impl Into<NodeId>, output_node: impl Into<NodeId>) -> Self {
        Self {
            graph,
            table: Arc::new(table),
            input_node: input_node.into(),
            output_node: output_node.into(),
            pools: Arc::new(WorkerPools::new()),
        }
    }

    pub fn with_pools(mut self, pools: WorkerPools) -> Self {
        self.pools = Arc::new(pools);
        self
    }

    pub async fn run(&self, ctx: PipelineContext) -> crate::context::PipelineResult {
        let state = Arc::new(RunState::new(
            self.graph.clone(),
            self.table.clone(),
            self.pools.clone(),
            ctx.clone(),
            self.input_node.clone(),
        ));

        ctx.hooks.pipeline_start(&ctx.pipeline_id).await;

        let reduced = subgraph::reduced_for_run(&self.graph, &self.input_node, &self.output_node);
        let handles = spawn_reduced(state.clone(), Arc::new(reduced), None);

        let outcome = await_result(&state, &None, &self.output_node).await;

        cancel_all(handles).await;
        state.cancel_all();

        let result = match outcome {
            Ok(StoredValue::Value(v)) => crate::context::PipelineResult::ok(ctx.pipeline_id.clone(), v),
            Ok(StoredValue::Error(e)) => {
                crate::context::PipelineResult { pipeline_id: ctx.pipeline_id.clone(), value: None, error: Some(e) }
            }
            Ok(StoredValue::Recurrent(_)) => unreachable!("output node cannot settle on a Recurrent sentinel"),
            Err(e) => crate::context::PipelineResult { pipeline_id: ctx.pipeline_id.clone(), value: None, error: Some(e) },
        };

        ctx.hooks.pipeline_complete(&ctx.pipeline_id, &result).await;
        result
    }
}

/// Per-node-subtree failure tracking for a one-of candidate or a recurrence
/// iteration: a failure here never reaches [`RunState::fail`], so it doesn't
/// end the whole pipeline, only the sub-run that owns this context.
struct CaptureContext {
    failed: AtomicBool,
    error: Mutex<Option<Arc<DagError>>>,
}

impl CaptureContext {
    fn new() -> Self {
        Self { failed: AtomicBool::new(false), error: Mutex::new(None) }
    }

    fn has_failed(&self) -> bool {
        self.failed.load(Ordering::SeqCst)
    }

    fn fail(&self, err: Arc<DagError>) {
        let mut guard = self.error.lock();
        if guard.is_none() {
            *guard = Some(err);
        }
        self.failed.store(true, Ordering::SeqCst);
    }

    fn error(&self) -> Option<Arc<DagError>> {
        self.error.lock().clone()
    }
}

/// State shared by every task spawned within one `Scheduler::run` call:
/// the Result Store, the Lock Orchestrator, per-node `additional_data`
/// injected by recurrence owners, and the run's single fatal-error slot.
struct RunState {
    original_graph: Graph,
    table: Arc<NodeTable>,
    pools: Arc<WorkerPools>,
    ctx: PipelineContext,
    input_node: NodeId,
    store: ResultStore,
    locks: LockOrchestrator,
    ready_cond: Condition,
    additional_data: Mutex<HashMap<NodeId, serde_json::Value>>,
    fatal_failed: AtomicBool,
    fatal_error: Mutex<Option<Arc<DagError>>>,
    tasks: Mutex<Vec<tokio::task::AbortHandle>>,
}

impl RunState {
    fn new(original_graph: Graph, table: Arc<NodeTable>, pools: Arc<WorkerPools>, ctx: PipelineContext, input_node: NodeId) -> Self {
        Self {
            original_graph,
            table,
            pools,
            ctx,
            input_node,
            store: ResultStore::new(),
            locks: LockOrchestrator::new(),
            ready_cond: Condition::new(),
            additional_data: Mutex::new(HashMap::new()),
            fatal_failed: AtomicBool::new(false),
            fatal_error: Mutex::new(None),
            tasks: Mutex::new(Vec::new()),
        }
    }

    fn fail(&self, err: Arc<DagError>) {
        let mut guard = self.fatal_error.lock();
        if guard.is_none() {
            *guard = Some(err);
        }
        self.fatal_failed.store(true, Ordering::SeqCst);
        self.ready_cond.notify_all();
    }

    fn has_fatal_error(&self) -> bool {
        self.fatal_failed.load(Ordering::SeqCst)
    }

    fn fatal_error(&self) -> Option<Arc<DagError>> {
        self.fatal_error.lock().clone()
    }

    fn track(&self, handle: tokio::task::AbortHandle) {
        self.tasks.lock().push(handle);
    }

    fn cancel_all(&self) {
        for h in self.tasks.lock().iter() {
            h.abort();
        }
    }

    fn set_additional_data(&self, node_id: &str, value: serde_json::Value) {
        self.additional_data.lock().insert(node_id.to_string(), value);
    }

    fn get_additional_data(&self, node_id: &str) -> Option<serde_json::Value> {
        self.additional_data.lock().get(node_id).cloned()
    }

    async fn save_artifact(&self, node_id: &str, value: ArtifactValue) {
        if self.table.get(node_id).map(|d| d.skip_store()).unwrap_or(false) {
            return;
        }
        self.ctx.artifact_store.save(&self.ctx.pipeline_id, &self.ctx.model_name, node_id, &value).await;
    }
}

/// What a node's one execution attempt, after retries and default
/// substitution, settled on. Distinct from `NodeOutcome` only in that a
/// `Recurrent` here has already run the full retry ladder.
enum NodeExecOutcome {
    Value(serde_json::Value),
    Recurrent(serde_json::Value),
}

/// Resolves a switch alias chain: if `producer` is a switch node with a
/// recorded `CaseResult`, follow it to the chosen branch (possibly through
/// nested switches); otherwise return `producer` unchanged.
fn resolve_alias(graph: &Graph, store: &ResultStore, producer: &str) -> NodeId {
    let mut current = producer.to_string();
    while graph.attrs(&current).map(|a| a.is_switch).unwrap_or(false) {
        match store.get_switch_result(&current) {
            Some(case) => current = case.node_id,
            None => break,
        }
    }
    current
}

/// A node is ready once every live (`kwarg_name`-bound) predecessor, after
/// switch-alias resolution, has settled on a value or an error. A transient
/// `Recurrent` result never counts as settled.
fn is_ready(graph: &Graph, store: &ResultStore, node_id: &str) -> bool {
    graph.predecessors(node_id).filter(|e| e.attrs.kwarg_name.is_some()).all(|e| {
        let producer = resolve_alias(graph, store, &e.from);
        matches!(store.get_node_result(&producer, false), Some(StoredValue::Value(_)) | Some(StoredValue::Error(_)))
    })
}

fn assemble_kwargs(graph: &Graph, state: &RunState, node_id: &str) -> Result<NodeKwargs, DagError> {
    let mut kwargs = NodeKwargs::new();
    if node_id == state.input_node {
        kwargs.extend(state.ctx.input_kwargs.clone());
    }
    for edge in graph.predecessors(node_id) {
        let Some(kwarg_name) = edge.attrs.kwarg_name.clone() else { continue };
        let producer = resolve_alias(graph, &state.store, &edge.from);
        match state.store.get_node_result(&producer, false) {
            Some(StoredValue::Value(v)) => {
                kwargs.insert(kwarg_name, v);
            }
            Some(StoredValue::Error(e)) => {
                return Err(DagError::InputPropagation { node: node_id.to_string(), source: e });
            }
            Some(StoredValue::Recurrent(_)) | None => {
                unreachable!("predecessor '{producer}' not ready when assembling kwargs for '{node_id}'");
            }
        }
    }
    if let Some(data) = state.get_additional_data(node_id) {
        kwargs.insert("additional_data".to_string(), data);
    }
    Ok(kwargs)
}

async fn wait_ready(state: &Arc<RunState>, graph: &Graph, node_id: &str, capture: &Option<Arc<CaptureContext>>) -> bool {
    state
        .ready_cond
        .wait_for(|| {
            state.has_fatal_error()
                || capture.as_ref().map(|c| c.has_failed()).unwrap_or(false)
                || is_ready(graph, &state.store, node_id)
        })
        .await;
    !(state.has_fatal_error() || capture.as_ref().map(|c| c.has_failed()).unwrap_or(false))
}

/// Waits until `node_id` has ANY stored result, including a transient
/// `Recurrent` sentinel. Used only by [`drive_recurrence_owner`]'s own
/// iteration loop, which needs to distinguish "ask for another lap" from
/// "converged" — unlike [`await_result`], which no other caller may observe
/// a `Recurrent` sentinel through.
async fn await_node_settled(
    state: &Arc<RunState>,
    capture: &Option<Arc<CaptureContext>>,
    node_id: &str,
) -> Option<StoredValue> {
    state
        .ready_cond
        .wait_for(|| {
            state.has_fatal_error()
                || capture.as_ref().map(|c| c.has_failed()).unwrap_or(false)
                || state.store.exists_node_result(node_id, false)
        })
        .await;
    state.store.get_node_result(node_id, false)
}

/// Waits until `node_id` has settled (value or error), the local `capture`
/// context has recorded a failure, or the whole run has failed. Returns the
/// node's own stored result when present; otherwise the recorded error.
async fn await_result(
    state: &Arc<RunState>,
    capture: &Option<Arc<CaptureContext>>,
    node_id: &str,
) -> Result<StoredValue, Arc<DagError>> {
    state
        .ready_cond
        .wait_for(|| {
            state.has_fatal_error()
                || capture.as_ref().map(|c| c.has_failed()).unwrap_or(false)
                || matches!(state.store.get_node_result(node_id, false), Some(StoredValue::Value(_)) | Some(StoredValue::Error(_)))
        })
        .await;

    if let Some(v) = state.store.get_node_result(node_id, false) {
        if matches!(v, StoredValue::Value(_) | StoredValue::Error(_)) {
            return Ok(v);
        }
    }
    if let Some(c) = capture {
        if let Some(e) = c.error() {
            return Err(e);
        }
    }
    Err(state.fatal_error().unwrap_or_else(|| Arc::new(DagError::TaskPanicked("run aborted with no recorded error".into()))))
}

async fn invoke_callable(state: &Arc<RunState>, descriptor: &NodeDescriptor, kwargs: NodeKwargs) -> Result<NodeOutcome, NodeError> {
    match &descriptor.callable {
        NodeCallable::Cooperative(f) => f(kwargs).await,
        NodeCallable::Blocking(f) => {
            let f = f.clone();
            let handle = if descriptor.is_process_tagged() {
                state.pools.spawn_process(move || f(kwargs)).expect("process pool presence checked before dispatch")
            } else {
                state.pools.spawn_thread(move || f(kwargs))
            };
            match handle.await {
                Ok(result) => result,
                Err(join_err) => Err(NodeError::new(format!("worker pool task failed: {join_err}"))),
            }
        }
    }
}

/// One settle-or-retry-or-default pass for `node_id`, using whichever
/// `graph` view the caller is currently executing under (so predecessor
/// wiring reflects the right reduced subgraph). Does not touch the store.
async fn execute_once(state: &Arc<RunState>, graph: &Graph, node_id: &str) -> Result<NodeExecOutcome, DagError> {
    let descriptor = state.table.get(node_id).expect("node present in table (validated at build time)");

    if descriptor.is_process_tagged() && !state.pools.has_process_pool() {
        return Err(DagError::PoolUnavailable(node_id.to_string()));
    }

    let kwargs = assemble_kwargs(graph, state, node_id)?;

    let mut attempt = 0usize;
    loop {
        attempt += 1;
        match invoke_callable(state, descriptor, kwargs.clone()).await {
            Ok(NodeOutcome::Value(v)) => return Ok(NodeExecOutcome::Value(v)),
            Ok(NodeOutcome::Recurrent(d)) => return Ok(NodeExecOutcome::Recurrent(d)),
            Err(node_err) => match retry::evaluate(descriptor, attempt, &node_err) {
                RetryDecision::Retry { delay } => {
                    let transient = DagError::NodeExecution { node: node_id.to_string(), source: node_err };
                    state.ctx.hooks.node_complete(&state.ctx.pipeline_id, node_id, Some(&transient)).await;
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }
                RetryDecision::UseDefault => {
                    let producer = descriptor.default.as_ref().expect("use_default implies a default producer");
                    return match producer(&kwargs) {
                        Ok(v) => Ok(NodeExecOutcome::Value(v)),
                        Err(e) => Err(DagError::NodeExecution { node: node_id.to_string(), source: e }),
                    };
                }
                RetryDecision::Propagate => {
                    return Err(DagError::NodeExecution { node: node_id.to_string(), source: node_err });
                }
            },
        }
    }
}

/// Publishes a node's terminal outcome: stores it, fires the artifact
/// store, wakes waiters, emits `node_complete`, and — on error — routes the
/// failure to the local capture context if one applies, or fails the whole
/// run otherwise.
async fn finish_node(
    state: &Arc<RunState>,
    node_id: &str,
    result: Result<serde_json::Value, Arc<DagError>>,
    capture: Option<&Arc<CaptureContext>>,
) {
    match result {
        Ok(v) => {
            state.store.set_node_result(node_id, StoredValue::Value(v.clone()));
            state.save_artifact(node_id, ArtifactValue::Value(v)).await;
            state.locks.event(node_id).set();
            state.ready_cond.notify_all();
            state.ctx.hooks.node_complete(&state.ctx.pipeline_id, node_id, None).await;
        }
        Err(arc_e) => {
            state.store.set_node_result(node_id, StoredValue::Error(arc_e.clone()));
            state.save_artifact(node_id, ArtifactValue::Error(arc_e.to_string())).await;
            state.locks.event(node_id).set();
            state.ready_cond.notify_all();
            state.ctx.hooks.node_complete(&state.ctx.pipeline_id, node_id, Some(&arc_e)).await;
            match capture {
                Some(cap) => cap.fail(arc_e),
                None => state.fail(arc_e),
            }
        }
    }
}

async fn run_node_once(state: Arc<RunState>, graph: Arc<Graph>, node_id: NodeId, capture: Option<Arc<CaptureContext>>) {
    if !state.store.try_claim(&node_id) {
        state.locks.event(&node_id).wait().await;
        return;
    }

    if !wait_ready(&state, &graph, &node_id, &capture).await {
        return;
    }

    state.ctx.hooks.node_start(&state.ctx.pipeline_id, &node_id).await;
    match execute_once(&state, &graph, &node_id).await {
        Ok(NodeExecOutcome::Value(v)) => finish_node(&state, &node_id, Ok(v), capture.as_ref()).await,
        Ok(NodeExecOutcome::Recurrent(d)) => {
            state.store.set_node_result(&node_id, StoredValue::Recurrent(d));
            state.locks.event(&node_id).set();
            state.ready_cond.notify_all();
        }
        Err(e) => finish_node(&state, &node_id, Err(Arc::new(e)), capture.as_ref()).await,
    }
}

async fn drive_switch(state: Arc<RunState>, graph: Arc<Graph>, switch_node: NodeId, capture: Option<Arc<CaptureContext>>) {
    let dedup_key = format!("__switch__{switch_node}");
    if !state.store.try_claim(&dedup_key) {
        state.locks.event(&dedup_key).wait().await;
        return;
    }

    let decider = match graph.predecessors(&switch_node).find(|e| e.attrs.is_switch) {
        Some(e) => e.from.clone(),
        None => {
            state.locks.event(&dedup_key).set();
            return;
        }
    };

    let label_value = match await_result(&state, &capture, &decider).await {
        Err(_) => {
            state.locks.event(&dedup_key).set();
            return;
        }
        Ok(StoredValue::Error(e)) => {
            let err = Arc::new(DagError::InputPropagation { node: switch_node.clone(), source: e });
            match &capture {
                Some(c) => c.fail(err),
                None => state.fail(err),
            }
            state.locks.event(&dedup_key).set();
            return;
        }
        Ok(StoredValue::Value(v)) => v,
        Ok(StoredValue::Recurrent(_)) => unreachable!("decider settled on a Recurrent sentinel"),
    };

    let label_str = match &label_value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    };

    let branch = state
        .original_graph
        .predecessors(&switch_node)
        .find(|e| e.attrs.case_branch.as_deref() == Some(label_str.as_str()))
        .map(|e| e.from.clone());

    let Some(branch) = branch else {
        let err = Arc::new(DagError::NodeExecution {
            node: switch_node.clone(),
            source: NodeError::new(format!("no case branch matches label '{label_str}'")),
        });
        match &capture {
            Some(c) => c.fail(err),
            None => state.fail(err),
        }
        state.locks.event(&dedup_key).set();
        return;
    };

    state.store.set_switch_result(&switch_node, CaseResult { label: label_value, node_id: branch.clone() });

    let branch_reduced = subgraph::reduced_for_switch(&state.original_graph, &state.input_node, &branch);
    let handles = spawn_reduced(state.clone(), Arc::new(branch_reduced), capture.clone());
    let branch_result = await_result(&state, &capture, &branch).await;
    cancel_all(handles).await;

    // Mirror the branch's settled result under the switch node's own id, so
    // a consumer reading the switch node directly (rather than through the
    // `CaseResult` alias, e.g. when it is the pipeline's own output node)
    // still sees it.
    state.store.copy_node_result(&branch, &switch_node);
    if let Ok(StoredValue::Error(e)) = &branch_result {
        match &capture {
            Some(c) => c.fail(e.clone()),
            None => state.fail(e.clone()),
        }
    }

    state.ready_cond.notify_all();
    state.locks.event(&dedup_key).set();
}

async fn drive_one_of(state: Arc<RunState>, _graph: Arc<Graph>, head: NodeId, capture: Option<Arc<CaptureContext>>) {
    if !state.store.try_claim(&head) {
        state.locks.event(&head).wait().await;
        return;
    }

    state.ctx.hooks.node_start(&state.ctx.pipeline_id, &head).await;

    let candidates = state.original_graph.attrs(&head).map(|a| a.oneof_nodes.clone()).unwrap_or_default();
    let nested = capture.is_some();

    for candidate in &candidates {
        let reduced = subgraph::reduced_for_one_of(&state.original_graph, &state.input_node, candidate, nested);
        let iter_capture = Arc::new(CaptureContext::new());
        let handles = spawn_reduced(state.clone(), Arc::new(reduced.graph), Some(iter_capture.clone()));
        let outcome = await_result(&state, &Some(iter_capture.clone()), candidate).await;
        cancel_all(handles).await;

        if matches!(outcome, Ok(StoredValue::Value(_))) {
            state.store.copy_node_result(candidate, &head);
            state.locks.event(&head).set();
            state.ready_cond.notify_all();
            state.ctx.hooks.node_complete(&state.ctx.pipeline_id, &head, None).await;
            return;
        }
    }

    let err = Arc::new(DagError::OneOfExhausted(head.clone()));
    state.store.set_node_result(&head, StoredValue::Error(err.clone()));
    state.save_artifact(&head, ArtifactValue::Error(err.to_string())).await;
    state.locks.event(&head).set();
    state.ready_cond.notify_all();
    state.ctx.hooks.node_complete(&state.ctx.pipeline_id, &head, Some(&err)).await;
    match capture {
        Some(cap) => cap.fail(err),
        None => state.fail(err),
    }
}

/// Owns a recurrent destination's whole lifetime: the initial attempt, then
/// (if it asked for another iteration) the hide/re-inject/re-run loop, up to
/// `max_iterations` more invocations, and finally default substitution or
/// `RecurrenceExhausted` if it never converged.
async fn drive_recurrence_owner(state: Arc<RunState>, graph: Arc<Graph>, dest: NodeId, capture: Option<Arc<CaptureContext>>) {
    if !state.store.try_claim(&dest) {
        state.locks.event(&dest).wait().await;
        return;
    }

    let attrs = state.original_graph.attrs(&dest).cloned().unwrap_or_default();
    let start = attrs.start_node.clone().expect("recurrent destination has a start_node (validated at build time)");
    let max_iterations = attrs.max_iterations.expect("recurrent destination has max_iterations (validated at build time)");

    state.store.set_active_recurrence(&start, &dest);
    state.ctx.hooks.node_start(&state.ctx.pipeline_id, &dest).await;

    if !wait_ready(&state, &graph, &dest, &capture).await {
        state.store.remove_active_recurrence(&start, &dest);
        return;
    }

    let mut data = match execute_once(&state, &graph, &dest).await {
        Ok(NodeExecOutcome::Value(v)) => {
            finish_node(&state, &dest, Ok(v), capture.as_ref()).await;
            state.store.remove_active_recurrence(&start, &dest);
            return;
        }
        Ok(NodeExecOutcome::Recurrent(d)) => d,
        Err(e) => {
            finish_node(&state, &dest, Err(Arc::new(e)), capture.as_ref()).await;
            state.store.remove_active_recurrence(&start, &dest);
            return;
        }
    };

    let mut last_data = data.clone();
    let mut converged: Option<Result<serde_json::Value, Arc<DagError>>> = None;

    for _ in 0..max_iterations {
        let reduced = subgraph::reduced_for_recurrence(&state.original_graph, &start, &dest);
        let ids: Vec<NodeId> = reduced.graph.nodes().cloned().collect();
        state.store.hide_all(&ids);
        for id in &ids {
            state.locks.reset_event(id);
        }
        state.set_additional_data(&start, data.clone());

        let iter_capture = Arc::new(CaptureContext::new());
        let handles = spawn_reduced(state.clone(), Arc::new(reduced.graph), Some(iter_capture.clone()));
        let settled = await_node_settled(&state, &Some(iter_capture.clone()), &dest).await;
        cancel_all(handles).await;

        match settled {
            None => {
                let err = iter_capture
                    .error()
                    .or_else(|| state.fatal_error())
                    .unwrap_or_else(|| Arc::new(DagError::TaskPanicked("recurrence iteration aborted with no recorded error".into())));
                converged = Some(Err(err));
                break;
            }
            Some(StoredValue::Error(e)) => {
                converged = Some(Err(e));
                break;
            }
            Some(StoredValue::Value(v)) => {
                converged = Some(Ok(v));
                break;
            }
            Some(StoredValue::Recurrent(next)) => {
                last_data = next.clone();
                data = next;
            }
        }
    }

    let final_result: Result<serde_json::Value, Arc<DagError>> = match converged {
        Some(r) => r,
        None => {
            let descriptor = state.table.get(&dest).expect("node present in table");
            if descriptor.use_default {
                state.store.hide_node_result(&dest);
                match assemble_kwargs(&state.original_graph, &state, &dest) {
                    Ok(kwargs) => match descriptor.default.as_ref().expect("use_default implies a default producer")(&kwargs) {
                        Ok(v) => Ok(v),
                        Err(e) => Err(Arc::new(DagError::NodeExecution { node: dest.clone(), source: e })),
                    },
                    Err(e) => Err(Arc::new(e)),
                }
            } else {
                Err(Arc::new(DagError::RecurrenceExhausted { start: start.clone(), dest: dest.clone(), last_value: last_data }))
            }
        }
    };

    finish_node(&state, &dest, final_result, capture.as_ref()).await;
    state.store.remove_active_recurrence(&start, &dest);
}

fn dispatch_one(state: Arc<RunState>, graph: Arc<Graph>, node_id: NodeId, capture: Option<Arc<CaptureContext>>) -> JoinHandle<()> {
    let attrs = graph.attrs(&node_id).cloned().unwrap_or_default();
    let is_recurrence_owner =
        attrs.start_node.as_ref().map(|s| !state.store.exists_active_recurrence(s, &node_id)).unwrap_or(false);

    let tracked = state.clone();
    let handle = tokio::spawn(async move {
        if attrs.is_switch {
            drive_switch(state, graph, node_id, capture).await;
        } else if attrs.is_oneof_head {
            drive_one_of(state, graph, node_id, capture).await;
        } else if is_recurrence_owner {
            drive_recurrence_owner(state, graph, node_id, capture).await;
        } else {
            run_node_once(state, graph, node_id, capture).await;
        }
    });
    tracked.track(handle.abort_handle());
    handle
}

fn spawn_reduced(state: Arc<RunState>, graph: Arc<Graph>, capture: Option<Arc<CaptureContext>>) -> Vec<JoinHandle<()>> {
    graph.nodes().map(|id| dispatch_one(state.clone(), graph.clone(), id.clone(), capture.clone())).collect()
}

async fn cancel_all(handles: Vec<JoinHandle<()>>) {
    for h in &handles {
        h.abort();
    }
    for h in handles {
        let _ = h.await;
    }
}
