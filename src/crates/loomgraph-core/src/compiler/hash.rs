//! Hasher: complete hash (dedup key) and non-important hash (per-run memo key)
//!
//! `spec.md` §4.2. Every compiled node gets two hashes:
//!
//! - **complete hash** — folds in *every* input that contributes to the
//!   node's observable behavior (arguments, important guards, void guards).
//!   An important/implicit-important input folds in its dependency's
//!   *complete* hash (an important guard is observable in full — if the
//!   thing it fences on changes identity, so does the fence); every other
//!   contributing input folds in the dependency's *non-important* hash
//!   instead, since only the argument-level work the dependency does is
//!   observable to this node, not whatever it's independently fenced on.
//!   Two nodes with equal complete hashes are interchangeable at compile
//!   time; the rewriter's dedup pass coalesces them.
//! - **non-important hash** — the same fold, but skipping important/
//!   implicit-important inputs. It's the key the runtime's per-run memo
//!   (`runtime::results`) uses to decide "has a node doing this same
//!   argument-level work already run in this run" — important inputs are
//!   ordering fences, not part of what the work *is*.
//!
//! Cache-disabled nodes fold in a unique per-node salt into *both* hashes
//! (`spec.md` §4.2), which is what keeps them out of both the compile-time
//! dedup pass and the per-run memo.
//!
//! Because the peer compiler always places a node's dependencies at lower
//! indices than the node itself (every reference resolves to something
//! already compiled), a single forward pass over `nodes` computes every
//! hash from already-known dependency hashes — no recursion needed.

use crate::compiled::CompiledNode;
use crate::name::InputKind;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_CACHE_SALT: AtomicU64 = AtomicU64::new(1);

/// Allocate a fresh, process-wide unique salt for a cache-disabled node.
pub fn fresh_cache_salt() -> u64 {
    NEXT_CACHE_SALT.fetch_add(1, Ordering::Relaxed)
}

/// Compute and fill in `complete_hash`/`non_important_hash` for every node in
/// `nodes`, in place, in a single forward pass.
pub fn compute_hashes(nodes: &mut [CompiledNode]) {
    for i in 0..nodes.len() {
        let (complete, non_important) = hash_one(nodes, i);
        nodes[i].complete_hash = complete;
        nodes[i].non_important_hash = non_important;
    }
}

fn hash_one(nodes: &[CompiledNode], idx: usize) -> (u64, u64) {
    let node = &nodes[idx];
    let salt = if node.cache_disabled { Some(fresh_cache_salt()) } else { None };

    let mut complete = DefaultHasher::new();
    let mut non_important = DefaultHasher::new();

    hash_handler_identity(&node.handler, &mut complete);
    hash_handler_identity(&node.handler, &mut non_important);
    salt.hash(&mut complete);
    salt.hash(&mut non_important);

    for input in &node.inputs {
        if !input.kind.contributes_to_hash() {
            continue;
        }
        let (dep_complete_hash, dep_non_important_hash) = match input.global_index {
            Some(dep_idx) => (nodes[dep_idx].complete_hash, nodes[dep_idx].non_important_hash),
            None => {
                let mut h = DefaultHasher::new();
                input.runtime_input_name.as_deref().unwrap_or("").hash(&mut h);
                let v = h.finish();
                (v, v)
            }
        };

        let is_important = matches!(input.kind, InputKind::Important | InputKind::ImplicitImportant);

        input.local_name.hash(&mut complete);
        input.kind_tag().hash(&mut complete);
        input.member_path.hash(&mut complete);
        if is_important { dep_complete_hash } else { dep_non_important_hash }.hash(&mut complete);

        if is_important {
            continue;
        }
        input.local_name.hash(&mut non_important);
        input.kind_tag().hash(&mut non_important);
        input.member_path.hash(&mut non_important);
        dep_non_important_hash.hash(&mut non_important);
    }

    (complete.finish(), non_important.finish())
}

fn hash_handler_identity(handler: &crate::handler::HandlerKind, h: &mut DefaultHasher) {
    use crate::handler::HandlerKind;
    match handler {
        HandlerKind::User { id, .. } => {
            "user".hash(h);
            id.0.hash(h);
        }
        HandlerKind::Literal(v) => {
            "literal".hash(h);
            v.to_string().hash(h);
        }
        HandlerKind::Subgraph => "subgraph".hash(h),
        HandlerKind::ArgsToArray => "args_to_array".hash(h),
        HandlerKind::CombineOutputs { aliases, .. } => {
            "combine_outputs".hash(h);
            aliases.hash(h);
        }
    }
}

impl crate::compiled::CompiledInput {
    fn kind_tag(&self) -> u8 {
        match self.kind {
            InputKind::Argument => 0,
            InputKind::Important => 1,
            InputKind::Void => 2,
            InputKind::Partial => 3,
            InputKind::ImplicitImportant => 4,
        }
    }
}
