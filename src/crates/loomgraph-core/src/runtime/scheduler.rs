//! Runtime scheduler: executes one [`CompiledPlan`] for one set of runtime inputs
//!
//! `spec.md` §4.5 describes a manual reactor driven by per-node pending-
//! input counters. This crate gets the same guarantees — topological
//! ordering, bounded concurrency, at-most-once-per-node, at-most-once-per-
//! `nonImportantHash`, important-fence ordering, partial-failure isolation,
//! and stack safety on deep graphs — from `tokio::spawn` plus
//! [`futures::future::Shared`] instead (see `SPEC_FULL.md` §4.5 for the full
//! equivalence argument): every node's handler call runs as its own spawned
//! task, so a long dependency chain never grows one task's call stack, and
//! `Shared` gives every consumer the same cached `Arc`-wrapped result without
//! a manual counter or callback list.

use crate::compiled::{ArgSlot, CompiledInput, CompiledNode, CompiledPlan};
use crate::error::{FailureContext, GraphError};
use crate::handler::{self, Arg, Getter};
use crate::runtime::results::{NodeFut, NodeResult, ResultsStore};
use futures::future::{BoxFuture, FutureExt};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{debug, warn};

struct Scheduler {
    plan: Arc<CompiledPlan>,
    results: ResultsStore,
    runtime_inputs: HashMap<String, Arc<Value>>,
    builder_name: String,
}

/// Run `plan` to completion against `inputs`, returning the builder's
/// requested output fields or the first (un-recovered) failure to reach the
/// builder's output node.
pub async fn run(
    plan: Arc<CompiledPlan>,
    inputs: HashMap<String, Value>,
    builder_name: &str,
) -> Result<HashMap<String, Value>, GraphError> {
    let runtime_inputs = inputs.into_iter().map(|(k, v)| (k, Arc::new(v))).collect();
    let sched = Arc::new(Scheduler {
        plan: plan.clone(),
        results: ResultsStore::new(),
        runtime_inputs,
        builder_name: builder_name.to_string(),
    });
    debug!(builder = %sched.builder_name, nodes = sched.plan.nodes.len(), "starting run");

    for (&idx, value) in &sched.plan.input_literals {
        let v = Arc::new(value.clone());
        let fut: BoxFuture<'static, NodeResult> = Box::pin(async move { Ok(v) });
        sched.results.node_future(idx, || fut.shared());
    }

    // Fire every zero-input node immediately and concurrently, rather than
    // waiting for something downstream to demand it.
    for &idx in &sched.plan.starting_nodes {
        get_node_future(&sched, idx);
    }

    let result = get_node_future(&sched, sched.plan.output_index).await;
    debug!(
        builder = %sched.builder_name,
        hit_ratio = sched.results.metrics.hit_ratio(),
        invoked = sched.results.metrics.nodes_invoked.load(Ordering::Relaxed),
        "run finished"
    );
    match result {
        Ok(v) => match Arc::try_unwrap(v).unwrap_or_else(|v| (*v).clone()) {
            Value::Object(map) => Ok(map.into_iter().collect()),
            other => Ok(HashMap::from([("output".to_string(), other)])),
        },
        Err(e) => {
            warn!(builder = %sched.builder_name, error = %e, "run failed");
            Err((*e).clone())
        }
    }
}

fn get_node_future(sched: &Arc<Scheduler>, idx: usize) -> NodeFut {
    sched.results.node_future(idx, || {
        let sched = sched.clone();
        let handle = tokio::spawn(async move { run_node(sched, idx).await });
        let fut: BoxFuture<'static, NodeResult> = Box::pin(async move {
            match handle.await {
                Ok(result) => result,
                Err(join_err) => {
                    Err(Arc::new(GraphError::handler(format!("node task failed: {join_err}"))))
                }
            }
        });
        fut.shared()
    })
}

async fn run_node(sched: Arc<Scheduler>, idx: usize) -> NodeResult {
    let node: CompiledNode = sched.plan.nodes[idx].clone();

    let dep_indices = node.unique_input_indices();
    let dep_futures: Vec<NodeFut> =
        dep_indices.iter().map(|&d| get_node_future(&sched, d)).collect();
    let dep_results = futures::future::join_all(dep_futures).await;
    let dep_map: HashMap<usize, NodeResult> =
        dep_indices.into_iter().zip(dep_results).collect();

    for input in &node.inputs {
        if input.kind.is_guard() {
            if let Err(e) = resolve_input(&sched, input, &dep_map) {
                return Err(Arc::new(GraphError::propagate(
                    &node.original_name,
                    (*e).clone(),
                    failure_context(&sched, &node, vec![input.local_name.clone()]),
                )));
            }
        }
    }

    let mut args = Vec::with_capacity(node.arg_slots.len());
    for slot in &node.arg_slots {
        match slot {
            ArgSlot::RequiredFields => {
                args.push(Arg::Value(Arc::new(node.required_fields.as_value())));
            }
            ArgSlot::Input { index, use_getter } => {
                let input = &node.inputs[*index];
                let resolved = resolve_input(&sched, input, &dep_map);
                if *use_getter {
                    match resolved {
                        Ok(v) => args.push(Arg::Getter(Getter::ok(v))),
                        Err(e) => args.push(Arg::Getter(Getter::err(e))),
                    }
                } else {
                    match resolved {
                        Ok(v) => args.push(Arg::Value(v)),
                        Err(e) => {
                            return Err(Arc::new(GraphError::propagate(
                                &node.original_name,
                                (*e).clone(),
                                failure_context(&sched, &node, vec![input.local_name.clone()]),
                            )))
                        }
                    }
                }
            }
        }
    }

    let handler_kind = node.handler.clone();
    let memo_fut = sched.results.hash_memo(node.non_important_hash, move || {
        let fut: BoxFuture<'static, NodeResult> = Box::pin(async move {
            handler::invoke(&handler_kind, args).await.map(Arc::new).map_err(Arc::new)
        });
        fut.shared()
    });

    let result = memo_fut.await;
    sched.results.metrics.nodes_invoked.fetch_add(1, Ordering::Relaxed);

    match result {
        Ok(v) => Ok(v),
        Err(e) => {
            warn!(node = %node.original_name, error = %e, "handler failed");
            Err(Arc::new(GraphError::propagate(
                &node.original_name,
                (*e).clone(),
                failure_context(&sched, &node, node.inputs.iter().map(|i| i.local_name.clone()).collect()),
            )))
        }
    }
}

fn resolve_input(
    sched: &Scheduler,
    input: &CompiledInput,
    dep_map: &HashMap<usize, NodeResult>,
) -> NodeResult {
    let base: NodeResult = match input.global_index {
        Some(idx) => dep_map[&idx].clone(),
        None => {
            let name = input.runtime_input_name.as_deref().unwrap_or("");
            Ok(sched.runtime_inputs.get(name).cloned().unwrap_or_else(|| Arc::new(Value::Null)))
        }
    };
    base.map(|v| Arc::new(extract_member_path(&v, &input.member_path)))
}

fn extract_member_path(value: &Value, path: &[String]) -> Value {
    let mut cur = value;
    for seg in path {
        match cur.get(seg) {
            Some(next) => cur = next,
            None => return Value::Null,
        }
    }
    cur.clone()
}

fn failure_context(sched: &Scheduler, node: &CompiledNode, failure_inputs: Vec<String>) -> FailureContext {
    FailureContext {
        builder_name: sched.builder_name.clone(),
        callers: node.callers.clone(),
        failure_node_chain: node.failure_chain.clone(),
        failure_inputs,
    }
}
