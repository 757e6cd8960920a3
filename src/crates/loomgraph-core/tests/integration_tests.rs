//! End-to-end scenarios mirroring the six literal I/O cases the runtime's
//! concurrency and hashing guarantees are built on: a plain pipeline, dedup
//! of structurally-identical peers, the cache-disabled escape hatch,
//! important-guard fencing, partial-output failure isolation, and
//! `_requiredFields` member-path reflection.

use futures::future::FutureExt;
use loomgraph_core::definition::BuildSpec;
use loomgraph_core::handler::{Arg, HandlerKind};
use loomgraph_core::{Builder, GraphError, NodeDefinition};
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

#[tokio::test]
async fn pipeline_uppercases_a_runtime_input() {
    let mut builder = Builder::new("pipeline");
    builder
        .add(
            NodeDefinition::handler(
                "upper",
                Arc::new(|args: Vec<Arg>| {
                    async move {
                        let s = args[0].get()?;
                        Ok(json!(s.as_str().unwrap_or("").to_uppercase()))
                    }
                    .boxed()
                }),
            )
            .args(["str"]),
        )
        .unwrap();
    builder.provide("upper", "upper");

    let plan = builder.compile(&["str"], Default::default()).unwrap();
    let out = builder
        .run(plan, HashMap::from([("str".to_string(), json!("hello"))]), Default::default())
        .await
        .unwrap();
    assert_eq!(out["upper"], json!("HELLO"));
}

fn counting_handler(counter: Arc<AtomicU64>) -> loomgraph_core::handler::HandlerFn {
    Arc::new(move |_args: Vec<Arg>| {
        let counter = counter.clone();
        async move { Ok(json!(counter.fetch_add(1, Ordering::SeqCst))) }.boxed()
    })
}

#[tokio::test]
async fn identical_peers_dedup_to_a_single_invocation() {
    let counter = Arc::new(AtomicU64::new(0));
    let mut builder = Builder::new("dedup");
    builder.add(NodeDefinition::handler("now", counting_handler(counter.clone()))).unwrap();
    builder
        .add(
            NodeDefinition::new("a", HandlerKind::Subgraph)
                .args(["now"])
                .builds(vec![BuildSpec::new("now", "now")]),
        )
        .unwrap();
    builder
        .add(
            NodeDefinition::new("b", HandlerKind::Subgraph)
                .args(["now"])
                .builds(vec![BuildSpec::new("now", "now")]),
        )
        .unwrap();
    builder.provide("a", "a");
    builder.provide("b", "b");

    let plan = builder.compile(&[], Default::default()).unwrap();
    // `now` dedups to one node, and `a`/`b` are themselves structurally
    // identical (same Subgraph handler, same single input) so they collapse
    // into one node too: one `now`, one merged `a`/`b`, one output node.
    assert_eq!(plan.nodes.len(), 3);

    let out = builder.run(plan, HashMap::new(), Default::default()).await.unwrap();
    assert_eq!(out["a"], out["b"]);
    assert_eq!(counter.load(Ordering::SeqCst), 1, "now should fire exactly once");
}

#[tokio::test]
async fn cache_disabled_peers_stay_independent() {
    let counter = Arc::new(AtomicU64::new(0));
    let mut builder = Builder::new("cache-disabled");
    builder
        .add(NodeDefinition::handler("now", counting_handler(counter.clone())).disable_cache())
        .unwrap();
    builder
        .add(
            NodeDefinition::new("a", HandlerKind::Subgraph)
                .args(["now"])
                .builds(vec![BuildSpec::new("now", "now")]),
        )
        .unwrap();
    builder
        .add(
            NodeDefinition::new("b", HandlerKind::Subgraph)
                .args(["now"])
                .builds(vec![BuildSpec::new("now", "now")]),
        )
        .unwrap();
    builder.provide("a", "a");
    builder.provide("b", "b");

    let plan = builder.compile(&[], Default::default()).unwrap();
    // each cache-disabled `now` gets its own salted hash, so `a` and `b` stay
    // independent too: two `now`s, `a`, `b`, and the output node.
    assert_eq!(plan.nodes.len(), 5, "cache-disabled peers must not dedup");

    let out = builder.run(plan, HashMap::new(), Default::default()).await.unwrap();
    assert_ne!(out["a"], out["b"]);
    assert_eq!(counter.load(Ordering::SeqCst), 2, "each cache-disabled peer fires its own handler");
}

#[tokio::test]
async fn important_guard_short_circuits_before_the_handler_runs() {
    let invoked = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let invoked2 = invoked.clone();
    let mut builder = Builder::new("important-guard");
    builder
        .add(
            NodeDefinition::handler(
                "checkAuth",
                Arc::new(|args: Vec<Arg>| {
                    async move {
                        let user = args[0].get()?;
                        if user.is_null() {
                            Err(GraphError::handler("user is null"))
                        } else {
                            Ok(json!(true))
                        }
                    }
                    .boxed()
                }),
            )
            .args(["user"]),
        )
        .unwrap();
    builder
        .add(
            NodeDefinition::handler(
                "loadProfile",
                Arc::new(move |args: Vec<Arg>| {
                    let invoked2 = invoked2.clone();
                    async move {
                        invoked2.store(true, Ordering::SeqCst);
                        let user = args[0].get()?;
                        Ok(json!({ "user": *user }))
                    }
                    .boxed()
                }),
            )
            .args(["!checkAuth", "user"])
            .builds(vec![BuildSpec::new("checkAuth", "checkAuth")]),
        )
        .unwrap();
    builder.provide("profile", "loadProfile");

    let plan = builder.compile(&["user"], Default::default()).unwrap();
    let err = builder
        .run(plan, HashMap::from([("user".to_string(), json!(null))]), Default::default())
        .await
        .unwrap_err();

    assert!(err.to_string().contains("checkAuth"));
    assert!(!invoked.load(Ordering::SeqCst), "loadProfile's handler must never run");
}

#[tokio::test]
async fn important_fence_reaches_into_a_nested_builds_scope() {
    // `p` is an important guard on a root-level sibling (`r`); `d` sits not
    // among `p`/`r`'s own root-group siblings but one `builds` scope deeper,
    // nested under `s`. The important fence (`spec.md` §4.3 pass 4, §8) must
    // still force `d` to wait for `p`, even though `d` is never a literal
    // member of the group `p` was marked important in.
    let timeline: Arc<Mutex<Vec<(&'static str, std::time::Instant)>>> =
        Arc::new(Mutex::new(Vec::new()));

    let timeline_p = timeline.clone();
    let p_handler: loomgraph_core::handler::HandlerFn = Arc::new(move |_args: Vec<Arg>| {
        let timeline_p = timeline_p.clone();
        async move {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            timeline_p.lock().unwrap().push(("p", std::time::Instant::now()));
            Ok(json!(true))
        }
        .boxed()
    });

    let timeline_d = timeline.clone();
    let d_handler: loomgraph_core::handler::HandlerFn = Arc::new(move |_args: Vec<Arg>| {
        let timeline_d = timeline_d.clone();
        async move {
            timeline_d.lock().unwrap().push(("d", std::time::Instant::now()));
            Ok(json!("d done"))
        }
        .boxed()
    });

    let mut builder = Builder::new("nested-important-fence");
    builder.add(NodeDefinition::handler("p", p_handler)).unwrap();
    builder.add(NodeDefinition::handler("d", d_handler)).unwrap();
    builder
        .add(
            NodeDefinition::handler(
                "r",
                Arc::new(|_args: Vec<Arg>| async { Ok(json!("r done")) }.boxed()),
            )
            .args(["!p"]),
        )
        .unwrap();
    builder
        .add(
            NodeDefinition::new("s", HandlerKind::Subgraph)
                .args(["d"])
                .builds(vec![BuildSpec::new("d", "d")]),
        )
        .unwrap();
    builder.provide("p", "p");
    builder.provide("r", "r");
    builder.provide("s", "s");

    let plan = builder.compile(&[], Default::default()).unwrap();
    builder.run(plan, HashMap::new(), Default::default()).await.unwrap();

    let timeline = timeline.lock().unwrap();
    let p_at = timeline.iter().find(|(name, _)| *name == "p").unwrap().1;
    let d_at = timeline.iter().find(|(name, _)| *name == "d").unwrap().1;
    assert!(d_at >= p_at, "d must not start before the important guard p finishes");
}

#[tokio::test]
async fn partial_failure_is_isolated_to_the_requested_outputs() {
    let mut failing_builder = Builder::new("partial-failure");
    failing_builder
        .add(NodeDefinition::handler(
            "x",
            Arc::new(|_args: Vec<Arg>| async { Err(GraphError::handler("x always fails")) }.boxed()),
        ))
        .unwrap();
    failing_builder
        .add(NodeDefinition::handler(
            "y",
            Arc::new(|_args: Vec<Arg>| async { Ok(json!("y ok")) }.boxed()),
        ))
        .unwrap();
    failing_builder.provide("x", "x");
    failing_builder.provide("y", "y");

    let plan = failing_builder.compile(&[], Default::default()).unwrap();
    let result = failing_builder.run(plan, HashMap::new(), Default::default()).await;
    assert!(result.is_err());

    let mut y_only_builder = Builder::new("partial-failure-y-only");
    y_only_builder
        .add(NodeDefinition::handler(
            "x",
            Arc::new(|_args: Vec<Arg>| async { Err(GraphError::handler("x always fails")) }.boxed()),
        ))
        .unwrap();
    y_only_builder
        .add(NodeDefinition::handler(
            "y",
            Arc::new(|_args: Vec<Arg>| async { Ok(json!("y ok")) }.boxed()),
        ))
        .unwrap();
    y_only_builder.provide("y", "y");

    let plan = y_only_builder.compile(&[], Default::default()).unwrap();
    let out = y_only_builder.run(plan, HashMap::new(), Default::default()).await.unwrap();
    assert_eq!(out["y"], json!("y ok"));
}

#[tokio::test]
async fn required_fields_reflects_member_path_reads() {
    let captured = Arc::new(Mutex::new(None));
    let captured2 = captured.clone();
    let mut builder = Builder::new("required-fields-partial");
    builder
        .add(
            NodeDefinition::handler(
                "getUser",
                Arc::new(move |args: Vec<Arg>| {
                    let captured2 = captured2.clone();
                    async move {
                        let rf = args[0].get()?;
                        *captured2.lock().unwrap() = Some((*rf).clone());
                        Ok(json!({ "name": "ada", "id": 1 }))
                    }
                    .boxed()
                }),
            )
            .args(["_requiredFields"]),
        )
        .unwrap();
    builder
        .add(
            NodeDefinition::new("nameOnly", HandlerKind::Subgraph)
                .args(["getUser.name"])
                .builds(vec![BuildSpec::new("getUser", "getUser")]),
        )
        .unwrap();
    builder.provide("name", "nameOnly");

    let plan = builder.compile(&[], Default::default()).unwrap();
    builder.run(plan, HashMap::new(), Default::default()).await.unwrap();
    assert_eq!(*captured.lock().unwrap(), Some(json!(["name"])));

    let captured_whole = Arc::new(Mutex::new(None));
    let captured_whole2 = captured_whole.clone();
    let mut whole_builder = Builder::new("required-fields-whole");
    whole_builder
        .add(
            NodeDefinition::handler(
                "getUser",
                Arc::new(move |args: Vec<Arg>| {
                    let captured_whole2 = captured_whole2.clone();
                    async move {
                        let rf = args[0].get()?;
                        *captured_whole2.lock().unwrap() = Some((*rf).clone());
                        Ok(json!({ "name": "ada", "id": 1 }))
                    }
                    .boxed()
                }),
            )
            .args(["_requiredFields"]),
        )
        .unwrap();
    whole_builder.provide("whole", "getUser");

    let plan = whole_builder.compile(&[], Default::default()).unwrap();
    whole_builder.run(plan, HashMap::new(), Default::default()).await.unwrap();
    assert_eq!(*captured_whole.lock().unwrap(), Some(json!("*")));
}
