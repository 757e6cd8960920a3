//! The compiled plan: the central compile-time data model
//!
//! A [`CompiledPlan`] is a flat, frozen `Vec<CompiledNode>` plus the indexes
//! the runtime needs to walk it. It is the only thing the peer compiler,
//! hasher, rewriter, and validator produce, and the only thing the runtime
//! scheduler consumes — the coupling `spec.md` §1 calls "the compiler's
//! output is the runtime's only input", made explicit as a type boundary.

use crate::handler::HandlerKind;
use crate::name::InputKind;
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};

/// One input wired into a compiled node: a local name (what the handler's
/// positional-argument slot, or the guard check, calls it) resolved to a
/// global index into the plan's node vector.
#[derive(Debug, Clone)]
pub struct CompiledInput {
    pub local_name: String,
    /// Index into `CompiledPlan::nodes`, or `None` if this input refers to
    /// a declared runtime input rather than another compiled node.
    pub global_index: Option<usize>,
    /// The declared runtime-input name, set iff `global_index` is `None`.
    pub runtime_input_name: Option<String>,
    pub kind: InputKind,
    /// Dotted member path to extract from the resolved value, e.g.
    /// `["user", "id"]` for a reference to `!checkAuth.user.id`.
    pub member_path: Vec<String>,
}

/// What paths any consumer reads from a node: either every consumer reads
/// the whole value (`All`), or every consumer reads only specific member
/// paths (`Some`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequiredFields {
    All,
    Some(BTreeSet<String>),
}

impl RequiredFields {
    pub fn as_value(&self) -> Value {
        match self {
            RequiredFields::All => Value::String("*".to_string()),
            RequiredFields::Some(fields) => {
                Value::Array(fields.iter().cloned().map(Value::String).collect())
            }
        }
    }
}

/// One entry in the finalized execution plan.
///
/// See `spec.md` §3 for the field-by-field contract; every field here has a
/// one-to-one counterpart there.
#[derive(Debug, Clone)]
pub struct CompiledNode {
    /// The registry key this node was lowered from.
    pub original_name: String,
    /// Globally unique name in the compiled plan.
    pub new_name: String,
    pub inputs: Vec<CompiledInput>,
    pub handler: HandlerKind,
    /// When true, this node's hashes include a unique salt and it never
    /// coalesces with a structurally-identical peer.
    pub cache_disabled: bool,
    pub complete_hash: u64,
    pub non_important_hash: u64,
    pub required_fields: RequiredFields,
    pub priority: u32,
    /// Indices of compiled nodes that read this node.
    pub output_nodes: Vec<usize>,
    /// Count of distinct compiled-plan inputs (de-duplicated by
    /// `global_index`), used as an activation counter in the spec's
    /// reference scheduler design; retained here for introspection and
    /// property tests even though this crate's `futures`-based scheduler
    /// does not need to consult it directly (see `runtime::scheduler`).
    pub num_unique_inputs: usize,
    /// Ordered `originalName`s from this node up to the builder output,
    /// precomputed as immutable debug context.
    pub failure_chain: Vec<String>,
    /// Ordered `originalName`s of the nodes that (transitively) required
    /// this node.
    pub callers: Vec<String>,
    pub is_output: bool,
    pub is_input: bool,
    /// Positional handler-argument slots, in call order. Most slots draw from
    /// `inputs` by index; `_requiredFields` is a magic substitution that
    /// never appears in `inputs` at all (it gates nothing and is never
    /// hashed).
    pub arg_slots: Vec<ArgSlot>,
    /// Which peer group (`compiler::peer`'s unit of sibling compilation) this
    /// node belongs to. Used only by the rewriter's implicit-important-
    /// injection pass; meaningless once the plan is handed to the runtime.
    pub group_id: usize,
}

/// One positional argument slot in a node's handler call, in declared order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgSlot {
    /// Draws from `CompiledNode::inputs[_]`, which must have
    /// `InputKind::Argument`. `use_getter` mirrors the definition's
    /// `with_getter` flag for this argument: when true the handler receives
    /// `Arg::Getter` instead of `Arg::Value`.
    Input { index: usize, use_getter: bool },
    /// The magic `_requiredFields` pseudo-argument: the node's own
    /// `RequiredFields`, computed by the rewriter, substituted at run time
    /// without ever being wired as a dependency.
    RequiredFields,
}

impl CompiledNode {
    /// Distinct global indices this node depends on (deduplicated, in
    /// first-seen order).
    pub fn unique_input_indices(&self) -> Vec<usize> {
        let mut seen = std::collections::HashSet::new();
        let mut out = Vec::new();
        for inp in &self.inputs {
            if let Some(idx) = inp.global_index {
                if seen.insert(idx) {
                    out.push(idx);
                }
            }
        }
        out
    }
}

/// The frozen artifact `compile()` returns.
#[derive(Debug, Clone)]
pub struct CompiledPlan {
    pub nodes: Vec<CompiledNode>,
    /// `newName` -> index into `nodes`.
    pub name_index: HashMap<String, usize>,
    /// Compile-time constants hoisted out of the node vector's execution
    /// path: copied directly into a run's results at start, never invoked
    /// as a handler.
    pub input_literals: HashMap<usize, Value>,
    /// Indices of nodes with zero unique inputs that are not pure input
    /// literals — fired unconditionally at the start of every run.
    pub starting_nodes: Vec<usize>,
    /// Names the builder declared as runtime inputs (from `compile(names)`).
    pub runtime_input_names: Vec<String>,
    /// Index of the single synthetic node representing the builder's
    /// requested output selection.
    pub output_index: usize,
}

impl CompiledPlan {
    pub fn node(&self, idx: usize) -> &CompiledNode {
        &self.nodes[idx]
    }

    pub fn index_of(&self, new_name: &str) -> Option<usize> {
        self.name_index.get(new_name).copied()
    }
}
