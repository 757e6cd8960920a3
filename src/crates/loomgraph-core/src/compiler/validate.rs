//! Validator: confirms every unresolved reference is a declared runtime input
//!
//! `spec.md` §4.4. The peer compiler resolves every bare reference it can
//! against sibling, ancestor, and `args.*` scopes; anything left over is
//! provisionally recorded as "presumably a runtime input" (see
//! `compiler::peer`'s module doc). This pass is what actually checks that
//! presumption: after dead-code pruning, every node left in the plan is
//! reachable from the builder's output, so a single scan over their inputs
//! is a complete check of the transitively-required closure.

use crate::compiled::CompiledPlan;
use crate::error::{GraphError, MissingNode, Result};
use std::collections::HashSet;

pub fn validate(plan: &CompiledPlan) -> Result<()> {
    let declared: HashSet<&str> = plan.runtime_input_names.iter().map(String::as_str).collect();
    let mut missing = Vec::new();
    let mut seen = HashSet::new();

    for node in &plan.nodes {
        for input in &node.inputs {
            if let Some(name) = &input.runtime_input_name {
                if input.global_index.is_none() && !declared.contains(name.as_str()) {
                    let mut requested_by = node.failure_chain.clone();
                    requested_by.reverse();
                    let key = (name.clone(), requested_by.clone());
                    if seen.insert(key) {
                        missing.push(MissingNode { name: name.clone(), requested_by });
                    }
                }
            }
        }
    }

    if missing.is_empty() {
        Ok(())
    } else {
        Err(GraphError::Compile { errors: missing })
    }
}
