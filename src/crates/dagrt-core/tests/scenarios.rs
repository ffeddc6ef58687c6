//! End-to-end pipeline scenarios exercising the scheduler's four node
//! shapes together: a plain linear chain, switch resolution (including a
//! nested switch), one-of candidate selection, and bounded recurrence.

use dagrt_core::artifact::NoOpArtifactStore;
use dagrt_core::builder::GraphBuilder;
use dagrt_core::context::{PipelineContext, RecordingHook, TraceEvent};
use dagrt_core::error::{DagError, NodeError};
use dagrt_core::node::{NodeCallable, NodeDescriptor, NodeKwargs, NodeOutcome};
use dagrt_core::scheduler::Scheduler;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn cooperative(f: impl Fn(NodeKwargs) -> Result<NodeOutcome, NodeError> + Send + Sync + 'static) -> NodeCallable {
    NodeCallable::Cooperative(Arc::new(move |kwargs| {
        let r = f(kwargs);
        Box::pin(async move { r })
    }))
}

fn num_input(value: f64) -> NodeKwargs {
    let mut kwargs = NodeKwargs::new();
    kwargs.insert("num".to_string(), json!(value));
    kwargs
}

fn ctx(input: NodeKwargs) -> PipelineContext {
    PipelineContext::new("scenario-run", "demo-model", input, Arc::new(NoOpArtifactStore))
}

/// Scenario 1: linear chain with negation and doubling.
#[tokio::test]
async fn linear_chain_inverts_adds_and_doubles() {
    let (graph, table) = GraphBuilder::new()
        .node(NodeDescriptor::new("invert", cooperative(|k| Ok(NodeOutcome::Value(json!(-k["num"].as_f64().unwrap()))))))
        .node(NodeDescriptor::new(
            "add_const",
            cooperative(|k| Ok(NodeOutcome::Value(json!(k["x"].as_f64().unwrap() + 0.1)))),
        ))
        .node(NodeDescriptor::new("double", cooperative(|k| Ok(NodeOutcome::Value(json!(k["x"].as_f64().unwrap() * 2.0))))))
        .edge("invert", "x", "add_const")
        .edge("add_const", "x", "double")
        .build("invert", "double")
        .unwrap();

    let scheduler = Scheduler::new(graph, table, "invert", "double");
    let result = scheduler.run(ctx(num_input(2.5))).await;
    assert_eq!(result.value, Some(json!(-4.8)));
    assert!(result.error.is_none());
}

/// Scenario 2: switch on sign routes to the "invert" branch, which returns a
/// fixed sentinel.
#[tokio::test]
async fn switch_on_sign_picks_the_matching_branch() {
    let (graph, table) = GraphBuilder::new()
        .node(NodeDescriptor::new(
            "decider",
            cooperative(|k| {
                let label = if k["num"].as_f64().unwrap() < 0.0 { "invert" } else { "positive" };
                Ok(NodeOutcome::Value(json!(label)))
            }),
        ))
        .node(NodeDescriptor::new("branch_invert", cooperative(|_| Ok(NodeOutcome::Value(json!(99))))))
        .node(NodeDescriptor::new("branch_positive", cooperative(|_| Ok(NodeOutcome::Value(json!(-1))))))
        .edge("decider", "num", "branch_invert")
        .edge("decider", "num", "branch_positive")
        .switch("sw", "decider", vec![("invert".into(), "branch_invert".into()), ("positive".into(), "branch_positive".into())])
        .build("decider", "sw")
        .unwrap();

    let scheduler = Scheduler::new(graph, table, "decider", "sw");
    let result = scheduler.run(ctx(num_input(-1.0))).await;
    assert_eq!(result.value, Some(json!(99)));
}

/// Scenario 3: a switch whose chosen branch is itself another switch head,
/// exercising `resolve_alias`'s chase through nested `CaseResult`s.
#[tokio::test]
async fn nested_switch_resolves_through_both_levels() {
    let (graph, table) = GraphBuilder::new()
        .node(NodeDescriptor::new("input", cooperative(|k| Ok(NodeOutcome::Value(k["num"].clone())))))
        .node(NodeDescriptor::new("outer_decider", cooperative(|_| Ok(NodeOutcome::Value(json!("nested_switch"))))))
        .node(NodeDescriptor::new("inner_decider", cooperative(|_| Ok(NodeOutcome::Value(json!("triple"))))))
        .node(NodeDescriptor::new(
            "triple_branch",
            cooperative(|k| {
                let n = k["num"].as_f64().unwrap();
                Ok(NodeOutcome::Value(json!(n * n * n)))
            }),
        ))
        .edge("input", "num", "outer_decider")
        .edge("input", "num", "inner_decider")
        .edge("input", "num", "triple_branch")
        .switch("inner_sw", "inner_decider", vec![("triple".into(), "triple_branch".into())])
        .switch("outer_sw", "outer_decider", vec![("nested_switch".into(), "inner_sw".into())])
        .build("input", "outer_sw")
        .unwrap();

    let scheduler = Scheduler::new(graph, table, "input", "outer_sw");
    let result = scheduler.run(ctx(num_input(2.0))).await;
    assert_eq!(result.value, Some(json!(8.0)));
}

/// Scenario 4: the first candidate raises, so the result is the second
/// candidate's output.
#[tokio::test]
async fn one_of_falls_back_to_the_second_candidate() {
    let (graph, table) = GraphBuilder::new()
        .node(NodeDescriptor::new("input", cooperative(|_| Ok(NodeOutcome::Value(json!(1))))))
        .node(NodeDescriptor::new("feature_ok", cooperative(|_| Err(NodeError::new("feature unavailable")))))
        .node(NodeDescriptor::new("feature_fallback", cooperative(|_| Ok(NodeOutcome::Value(json!(777_777))))))
        .node(NodeDescriptor::new("result", cooperative(|k| Ok(NodeOutcome::Value(k["v"].clone())))))
        .edge("input", "seed", "feature_ok")
        .edge("input", "seed", "feature_fallback")
        .edge("input", "trigger", "feature_head")
        .one_of("feature_head", vec!["feature_ok".into(), "feature_fallback".into()], "result", "v")
        .build("input", "result")
        .unwrap();

    let scheduler = Scheduler::new(graph, table, "input", "result");
    let result = scheduler.run(ctx(NodeKwargs::new())).await;
    assert_eq!(result.value, Some(json!(777_777)));
}

/// Scenario 5: a recurrent destination that asks for two more iterations
/// before converging, invoked exactly three times total.
#[tokio::test]
async fn recurrence_converges_on_its_third_invocation() {
    let invocations = Arc::new(AtomicUsize::new(0));
    let invocations2 = invocations.clone();

    let (graph, table) = GraphBuilder::new()
        .node(NodeDescriptor::new("invert", cooperative(|k| Ok(NodeOutcome::Value(json!(-k["num"].as_f64().unwrap()))))))
        .node(NodeDescriptor::new("pass", cooperative(|k| Ok(NodeOutcome::Value(k["x"].clone())))))
        .node(NodeDescriptor::new(
            "double",
            cooperative(move |_| {
                let n = invocations2.fetch_add(1, Ordering::SeqCst);
                match n {
                    0 => Ok(NodeOutcome::Recurrent(json!(5))),
                    1 => Ok(NodeOutcome::Recurrent(json!(7))),
                    _ => Ok(NodeOutcome::Value(json!(11))),
                }
            }),
        ))
        .edge("invert", "x", "pass")
        .edge("pass", "x", "double")
        .recurrent("invert", "double", 3)
        .build("invert", "double")
        .unwrap();

    let scheduler = Scheduler::new(graph, table, "invert", "double");
    let result = scheduler.run(ctx(num_input(2.5))).await;
    assert_eq!(result.value, Some(json!(11)));
    assert_eq!(invocations.load(Ordering::SeqCst), 3);
}

/// Scenario 6: every one-of candidate raises; the run fails with
/// `OneOfExhausted` and all three candidate failures are observable in the
/// trace.
#[tokio::test]
async fn one_of_exhausted_records_every_candidate_error_in_the_trace() {
    let (graph, table) = GraphBuilder::new()
        .node(NodeDescriptor::new("input", cooperative(|_| Ok(NodeOutcome::Value(json!(1))))))
        .node(NodeDescriptor::new("c1", cooperative(|_| Err(NodeError::new("c1 unavailable")))))
        .node(NodeDescriptor::new("c2", cooperative(|_| Err(NodeError::new("c2 unavailable")))))
        .node(NodeDescriptor::new("c3", cooperative(|_| Err(NodeError::new("c3 unavailable")))))
        .node(NodeDescriptor::new("sink", cooperative(|_| Ok(NodeOutcome::Value(json!(null))))))
        .edge("input", "seed", "c1")
        .edge("input", "seed", "c2")
        .edge("input", "seed", "c3")
        .edge("input", "trigger", "head")
        .one_of("head", vec!["c1".into(), "c2".into(), "c3".into()], "sink", "v")
        .build("input", "head")
        .unwrap();

    let recorder = Arc::new(RecordingHook::new());
    let ctx = ctx(NodeKwargs::new()).with_hooks(dagrt_core::context::HookList::new().push(recorder.clone()));
    let scheduler = Scheduler::new(graph, table, "input", "head");
    let result = scheduler.run(ctx).await;

    assert!(matches!(result.error.as_deref(), Some(DagError::OneOfExhausted(_))));

    let errored_nodes: Vec<String> = recorder
        .events()
        .into_iter()
        .filter_map(|e| match e {
            TraceEvent::NodeComplete { node_id, error: Some(_), .. } => Some(node_id),
            _ => None,
        })
        .collect();
    for candidate in ["c1", "c2", "c3"] {
        assert!(errored_nodes.iter().any(|n| n == candidate), "missing error trace for {candidate}");
    }
}
