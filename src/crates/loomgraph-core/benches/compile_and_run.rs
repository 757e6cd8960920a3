use criterion::{black_box, criterion_group, criterion_main, Criterion};
use futures::future::FutureExt;
use loomgraph_core::definition::BuildSpec;
use loomgraph_core::handler::{Arg, HandlerKind};
use loomgraph_core::{Builder, NodeDefinition};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;

/// Build a `width`-wide, `depth`-deep fan-out/fan-in chain: each layer has
/// `width` independent handler nodes depending on every node in the layer
/// below, collapsing to a single combined output.
fn build_chain(width: usize, depth: usize) -> Builder {
    let mut builder = Builder::new("bench");
    builder.add(NodeDefinition::literal("seed", json!(1))).unwrap();

    let mut prev_layer: Vec<String> = vec!["seed".to_string()];
    for layer in 0..depth {
        let mut next_layer = Vec::with_capacity(width);
        for lane in 0..width {
            let name = format!("l{layer}n{lane}");
            let mut def = NodeDefinition::handler(
                name.clone(),
                Arc::new(|args: Vec<Arg>| {
                    async move {
                        let mut sum = 0i64;
                        for a in &args {
                            sum += a.get()?.as_i64().unwrap_or(0);
                        }
                        Ok(json!(sum + 1))
                    }
                    .boxed()
                }),
            );
            def = def.args(prev_layer.clone()).builds(
                prev_layer
                    .iter()
                    .map(|p| BuildSpec::new(p.clone(), p.clone()))
                    .collect(),
            );
            builder.add(def).unwrap();
            next_layer.push(name);
        }
        prev_layer = next_layer;
    }

    for (i, name) in prev_layer.iter().enumerate() {
        builder.provide(format!("out{i}"), name.clone());
    }
    builder
}

fn compile_benchmark(c: &mut Criterion) {
    c.bench_function("compile 4x4 chain", |b| {
        b.iter(|| {
            let builder = build_chain(black_box(4), black_box(4));
            builder.compile(&[], Default::default()).unwrap()
        });
    });
}

fn run_benchmark(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let builder = build_chain(4, 4);
    let plan = builder.compile(&[], Default::default()).unwrap();

    c.bench_function("run 4x4 chain", |b| {
        b.to_async(&runtime).iter(|| {
            let plan = plan.clone();
            let builder = &builder;
            async move { builder.run(plan, HashMap::new(), Default::default()).await.unwrap() }
        });
    });
}

criterion_group!(benches, compile_benchmark, run_benchmark);
criterion_main!(benches);
