//! Scheduler throughput on a synthetic fan-out graph: one source feeding
//! `width` independent branches that converge on a single sink, run
//! repeatedly under criterion's async harness.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use dagrt_core::artifact::NoOpArtifactStore;
use dagrt_core::builder::GraphBuilder;
use dagrt_core::context::PipelineContext;
use dagrt_core::node::{NodeCallable, NodeDescriptor, NodeKwargs, NodeOutcome};
use dagrt_core::scheduler::Scheduler;
use serde_json::json;
use std::sync::Arc;

fn identity() -> NodeCallable {
    NodeCallable::Cooperative(Arc::new(|kwargs| {
        Box::pin(async move { Ok(NodeOutcome::Value(kwargs.get("x").cloned().unwrap_or(json!(0)))) })
    }))
}

fn fan_out_pipeline(width: usize) -> Scheduler {
    let mut builder = GraphBuilder::new().node(NodeDescriptor::new("source", identity()));
    for i in 0..width {
        let branch = format!("branch_{i}");
        builder = builder.node(NodeDescriptor::new(branch.clone(), identity())).edge("source", "x", branch);
    }
    builder = builder.node(NodeDescriptor::new("sink", identity()));
    for i in 0..width {
        builder = builder.edge(format!("branch_{i}"), format!("x{i}"), "sink");
    }
    let (graph, table) = builder.build("source", "sink").unwrap();
    Scheduler::new(graph, table, "source", "sink")
}

fn bench_fan_out(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let mut group = c.benchmark_group("scheduler_fan_out");
    for width in [4usize, 16, 64] {
        let scheduler = fan_out_pipeline(width);
        group.bench_with_input(BenchmarkId::from_parameter(width), &width, |b, _| {
            b.to_async(&rt).iter(|| async {
                let mut input = NodeKwargs::new();
                input.insert("x".to_string(), json!(1));
                let ctx = PipelineContext::new("bench-run", "bench-model", input, Arc::new(NoOpArtifactStore));
                scheduler.run(ctx).await
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_fan_out);
criterion_main!(benches);
