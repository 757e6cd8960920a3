//! Minimal Graphviz DOT emitter for a compiled plan
//!
//! `spec.md` explicitly scopes a full visualization surface out; this is
//! just enough to dump a plan's shape while debugging a compile — one
//! `digraph` with one edge per compiled-plan input, annotated with the
//! input's modifier kind.

use crate::compiled::CompiledPlan;
use crate::name::InputKind;
use std::fmt::Write as _;

/// Render `plan` as a Graphviz DOT digraph. Every node is labeled with its
/// `new_name`; every edge is labeled `!`/`?`/`%` for important/void/partial
/// inputs and left unlabeled for plain arguments.
pub fn to_dot(plan: &CompiledPlan) -> String {
    let mut out = String::new();
    writeln!(out, "digraph loomgraph {{").unwrap();
    writeln!(out, "  rankdir=LR;").unwrap();

    for (i, node) in plan.nodes.iter().enumerate() {
        let shape = if node.is_output {
            "doublecircle"
        } else if node.is_input {
            "box"
        } else {
            "ellipse"
        };
        writeln!(out, "  n{i} [label=\"{}\" shape={shape}];", escape(&node.new_name)).unwrap();
    }

    for (i, node) in plan.nodes.iter().enumerate() {
        for input in &node.inputs {
            let Some(target) = input.global_index else { continue };
            let label = match input.kind {
                InputKind::Important | InputKind::ImplicitImportant => "!",
                InputKind::Void => "?",
                InputKind::Partial => "%",
                InputKind::Argument => "",
            };
            writeln!(out, "  n{target} -> n{i} [label=\"{label}\"];").unwrap();
        }
    }

    writeln!(out, "}}").unwrap();
    out
}

fn escape(s: &str) -> String {
    s.replace('"', "\\\"")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::{self, BuildRequest};
    use crate::definition::{NodeDefinition, Registry};

    #[test]
    fn renders_a_digraph() {
        let mut registry = Registry::new();
        registry.add(NodeDefinition::literal("one", serde_json::json!(1))).unwrap();
        let plan = compiler::compile(&registry, &[], &[BuildRequest::new("out", "one")]).unwrap();
        let dot = to_dot(&plan);
        assert!(dot.starts_with("digraph loomgraph {"));
        assert!(dot.contains("doublecircle"));
    }
}
