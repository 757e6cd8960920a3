//! Property-based checks of the compiler's structural invariants: forward
//! dependency ordering, dedup stability across a variable fan-out, and
//! idempotence of repeated compiles against the same runtime-input names.

use loomgraph_core::definition::BuildSpec;
use loomgraph_core::handler::HandlerKind;
use loomgraph_core::{Builder, NodeDefinition};
use proptest::prelude::*;
use serde_json::json;
use std::sync::Arc;

proptest! {
    /// Every compiled node's dependencies always appear at a strictly lower
    /// index than the node itself, for chains of any length the peer
    /// compiler can produce (`compiler::hash`'s single forward pass relies
    /// on exactly this).
    #[test]
    fn dependencies_always_precede_their_dependents(chain_len in 1usize..12) {
        let mut builder = Builder::new("chain");
        builder.add(NodeDefinition::literal("n0", json!(0))).unwrap();
        for i in 1..chain_len {
            builder
                .add(
                    NodeDefinition::new(format!("n{i}"), HandlerKind::Subgraph)
                        .args([format!("n{}", i - 1)])
                        .builds(vec![BuildSpec::new(format!("n{}", i - 1), format!("n{}", i - 1))]),
                )
                .unwrap();
        }
        builder.provide("out", format!("n{}", chain_len - 1));

        let plan = builder.compile(&[], Default::default()).unwrap();
        for (i, node) in plan.nodes.iter().enumerate() {
            for input in &node.inputs {
                if let Some(dep) = input.global_index {
                    prop_assert!(dep < i, "dependency {dep} did not precede dependent {i}");
                }
            }
        }
    }

    /// Any number of structurally-identical literal peers (same value,
    /// different registry names) dedup to a single compiled node.
    #[test]
    fn identical_literals_always_dedup_to_one_node(fanout in 2usize..10) {
        let mut builder = Builder::new("fanout");
        for i in 0..fanout {
            builder.add(NodeDefinition::literal(format!("lit{i}"), json!(42))).unwrap();
            builder.provide(format!("f{i}"), format!("lit{i}"));
        }

        let plan = builder.compile(&[], Default::default()).unwrap();
        // one surviving literal node plus the output node.
        prop_assert_eq!(plan.nodes.len(), 2);

        let survivor = plan.nodes[plan.output_index].inputs[0].global_index;
        for input in &plan.nodes[plan.output_index].inputs {
            prop_assert_eq!(input.global_index, survivor);
        }
    }

    /// Compiling twice with the same declared runtime-input names returns
    /// the identical cached `Arc`, regardless of graph shape.
    #[test]
    fn compile_is_idempotent_for_any_graph_shape(fanout in 1usize..6) {
        let mut builder = Builder::new("idempotent");
        for i in 0..fanout {
            builder.add(NodeDefinition::literal(format!("lit{i}"), json!(i))).unwrap();
            builder.provide(format!("f{i}"), format!("lit{i}"));
        }

        let a = builder.compile(&[], Default::default()).unwrap();
        let b = builder.compile(&[], Default::default()).unwrap();
        prop_assert!(Arc::ptr_eq(&a, &b));
    }
}
