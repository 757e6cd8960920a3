//! The compiler: registry + output selection -> frozen [`crate::compiled::CompiledPlan`]
//!
//! `spec.md` §4 end to end: the peer compiler lowers the builder's
//! requested output fields (and everything they transitively `builds`) into
//! a flat node list, the hasher assigns every node its two content hashes,
//! the rewriter runs its nine passes over the result, and the validator
//! confirms every reference the peer compiler couldn't resolve locally
//! really is a declared runtime input.

pub mod hash;
pub mod peer;
pub mod resolver;
pub mod rewrite;
pub mod validate;

use crate::compiled::CompiledPlan;
use crate::definition::Registry;
use crate::error::Result;
pub use peer::BuildRequest;
use tracing::debug;

/// Compile a registry's requested output selection into a frozen plan.
///
/// `root_requests` is the builder's own `builds` list: the field names it
/// asked for, each bound to the registry node that produces it.
pub fn compile(
    registry: &Registry,
    runtime_input_names: &[String],
    root_requests: &[BuildRequest],
) -> Result<CompiledPlan> {
    let draft = peer::compile_root(registry, runtime_input_names, root_requests)?;
    let raw_count = draft.nodes.len();
    let plan = rewrite::run(draft, runtime_input_names.to_vec());
    validate::validate(&plan)?;
    debug!(
        raw_nodes = raw_count,
        compiled_nodes = plan.nodes.len(),
        starting_nodes = plan.starting_nodes.len(),
        "compiled plan"
    );
    Ok(plan)
}
