//! Rewriter: the compile-time passes that turn a raw peer-compiled plan into
//! the frozen [`CompiledPlan`] the runtime consumes.
//!
//! `spec.md` §4.3, run in this fixed order:
//!
//! 1. dedup by complete hash
//! 2. required-fields reflection
//! 3. prioritization
//! 4. implicit-important injection
//! 5. input-count materialization
//! 6. literal hoisting
//! 7. dead-code pruning
//! 8. starting-node enumeration
//! 9. failure-chain precomputation

use crate::compiled::{CompiledInput, CompiledNode, CompiledPlan, RequiredFields};
use crate::compiler::peer::{GroupInfo, PeerPlanDraft};
use crate::name::InputKind;
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

/// Halving bonus seed for important-of-important priority boosts
/// (`spec.md` §4.3 / Open Question resolution in `SPEC_FULL.md` §4.3).
pub const PRIORITY_IMPORTANT_BONUS: u32 = 1_000_000;

pub fn run(draft: PeerPlanDraft, runtime_input_names: Vec<String>) -> CompiledPlan {
    let PeerPlanDraft { mut nodes, groups, output_index } = draft;

    crate::compiler::hash::compute_hashes(&mut nodes);
    let (mut nodes, mut groups, output_index) = dedup(nodes, groups, output_index);

    compute_output_nodes(&mut nodes);
    reflect_required_fields(&mut nodes, output_index);
    prioritize(&mut nodes, output_index);
    inject_implicit_important(&mut nodes, &mut groups);

    recompute_input_counts(&mut nodes);
    compute_output_nodes(&mut nodes);

    // Dead-code pruning runs before literal hoisting (a reordering of
    // `spec.md`'s listed pass sequence that doesn't change the resulting
    // plan: hoisting is pure bookkeeping over whichever nodes survive
    // pruning, and literal-hoisted nodes are always reachable from the
    // output or they wouldn't have been compiled at all).
    let (mut nodes, output_index) = prune_dead_code(nodes, output_index);
    compute_output_nodes(&mut nodes);
    recompute_input_counts(&mut nodes);

    let input_literals = hoist_literals(&mut nodes);

    let starting_nodes = nodes
        .iter()
        .enumerate()
        .filter(|(_, n)| n.num_unique_inputs == 0 && !n.is_input)
        .map(|(i, _)| i)
        .collect();

    precompute_failure_chains(&mut nodes, output_index);

    let name_index: HashMap<String, usize> =
        nodes.iter().enumerate().map(|(i, n)| (n.new_name.clone(), i)).collect();

    CompiledPlan { nodes, name_index, input_literals, starting_nodes, runtime_input_names, output_index }
}

fn dedup(
    nodes: Vec<CompiledNode>,
    groups: Vec<GroupInfo>,
    output_index: usize,
) -> (Vec<CompiledNode>, Vec<GroupInfo>, usize) {
    let mut first_seen: HashMap<u64, usize> = HashMap::new();
    let mut redirect: Vec<usize> = (0..nodes.len()).collect();

    for (i, node) in nodes.iter().enumerate() {
        let survivor = *first_seen.entry(node.complete_hash).or_insert(i);
        redirect[i] = survivor;
    }

    let keep: Vec<bool> = (0..nodes.len()).map(|i| redirect[i] == i).collect();
    compact(nodes, keep, redirect, groups, output_index)
}

/// Remove unreachable (non-output) nodes; identity redirect, since dead-code
/// pruning never merges two nodes, only drops them.
fn prune_dead_code(nodes: Vec<CompiledNode>, output_index: usize) -> (Vec<CompiledNode>, usize) {
    let mut reachable = vec![false; nodes.len()];
    let mut queue = VecDeque::new();
    reachable[output_index] = true;
    queue.push_back(output_index);
    while let Some(i) = queue.pop_front() {
        for dep in nodes[i].unique_input_indices() {
            if !reachable[dep] {
                reachable[dep] = true;
                queue.push_back(dep);
            }
        }
    }

    let redirect: Vec<usize> = (0..nodes.len()).collect();
    let (nodes, _groups, output_index) = compact(nodes, reachable, redirect, vec![], output_index);
    (nodes, output_index)
}

/// Core compaction helper: apply `redirect` to every `global_index`
/// reference (merging duplicates onto their survivor), drop every node for
/// which `keep[i]` is false, and renumber everything that survives,
/// preserving relative order.
fn compact(
    mut nodes: Vec<CompiledNode>,
    keep: Vec<bool>,
    redirect: Vec<usize>,
    groups: Vec<GroupInfo>,
    output_index: usize,
) -> (Vec<CompiledNode>, Vec<GroupInfo>, usize) {
    for node in &mut nodes {
        for input in &mut node.inputs {
            if let Some(idx) = input.global_index {
                input.global_index = Some(redirect[idx]);
            }
        }
    }

    let mut old_to_new: Vec<Option<usize>> = vec![None; nodes.len()];
    let mut next = 0usize;
    for (i, k) in keep.iter().enumerate() {
        if *k {
            old_to_new[i] = Some(next);
            next += 1;
        }
    }

    let mut new_nodes = Vec::with_capacity(next);
    for (i, mut node) in nodes.into_iter().enumerate() {
        if !keep[i] {
            continue;
        }
        for input in &mut node.inputs {
            if let Some(idx) = input.global_index {
                input.global_index = old_to_new[idx];
            }
        }
        new_nodes.push(node);
    }

    let new_groups = groups
        .into_iter()
        .map(|g| GroupInfo {
            members: g.members.into_iter().filter_map(|m| old_to_new[m]).collect(),
            important_members: g
                .important_members
                .into_iter()
                .filter_map(|m| old_to_new[m])
                .collect(),
            owner_node: g.owner_node.and_then(|o| old_to_new[o]),
        })
        .collect();

    let new_output = old_to_new[output_index].expect("output node is always reachable/kept");
    (new_nodes, new_groups, new_output)
}

fn compute_output_nodes(nodes: &mut [CompiledNode]) {
    for n in nodes.iter_mut() {
        n.output_nodes.clear();
    }
    for i in 0..nodes.len() {
        for dep in nodes[i].unique_input_indices() {
            if !nodes[dep].output_nodes.contains(&i) {
                nodes[dep].output_nodes.push(i);
            }
        }
    }
}

fn recompute_input_counts(nodes: &mut [CompiledNode]) {
    for n in nodes.iter_mut() {
        n.num_unique_inputs = n.unique_input_indices().len();
    }
}

fn reflect_required_fields(nodes: &mut [CompiledNode], output_index: usize) {
    let mut fields: Vec<RequiredFields> =
        vec![RequiredFields::Some(BTreeSet::new()); nodes.len()];

    for i in 0..nodes.len() {
        let consumers = nodes[i].output_nodes.clone();
        if consumers.is_empty() || i == output_index {
            fields[i] = RequiredFields::All;
            continue;
        }
        let mut whole_read = false;
        let mut segs = BTreeSet::new();
        for &c in &consumers {
            for input in &nodes[c].inputs {
                if input.global_index == Some(i) {
                    match input.member_path.first() {
                        Some(seg) => {
                            segs.insert(seg.clone());
                        }
                        None => whole_read = true,
                    }
                }
            }
        }
        fields[i] = if whole_read { RequiredFields::All } else { RequiredFields::Some(segs) };
    }

    for (node, field) in nodes.iter_mut().zip(fields.into_iter()) {
        node.required_fields = field;
    }
}

fn prioritize(nodes: &mut [CompiledNode], output_index: usize) {
    let n = nodes.len();
    let mut priority = vec![0u32; n];
    let mut bonus = vec![0u32; n];
    priority[output_index] = 0;
    bonus[output_index] = PRIORITY_IMPORTANT_BONUS;

    let mut queue = VecDeque::new();
    queue.push_back(output_index);

    while let Some(a) = queue.pop_front() {
        let deps = nodes[a].unique_input_indices();
        for dep in deps {
            let is_important = nodes[a].inputs.iter().any(|inp| {
                inp.global_index == Some(dep)
                    && matches!(inp.kind, InputKind::Important | InputKind::ImplicitImportant)
            });
            let candidate_priority =
                if is_important { priority[a] + bonus[a] } else { priority[a] };
            let candidate_bonus =
                if is_important { (bonus[a] / 2).max(1) } else { bonus[a] };

            let mut changed = false;
            if candidate_priority > priority[dep] {
                priority[dep] = candidate_priority;
                changed = true;
            }
            if candidate_bonus > bonus[dep] {
                bonus[dep] = candidate_bonus;
                changed = true;
            }
            if changed {
                queue.push_back(dep);
            }
        }
    }

    for (i, node) in nodes.iter_mut().enumerate() {
        node.priority = priority[i];
    }
}

/// Walk from `group_id` into every nested group owned by one of its own
/// members, recursively, collecting every node reachable that way. The
/// important fence (`spec.md` §4.3 pass 4, §8 "Important fence") extends to
/// any non-important descendant in the output's closure, not just a group's
/// direct, literal members — a node nested several `builds` scopes deep is
/// still fenced by an important sibling of an ancestor scope that owns it.
fn group_closure(
    groups: &[GroupInfo],
    owner_to_group: &HashMap<usize, usize>,
    group_id: usize,
) -> Vec<usize> {
    let mut out = Vec::new();
    let mut stack = vec![group_id];
    let mut visited_groups = HashSet::new();
    while let Some(gid) = stack.pop() {
        if !visited_groups.insert(gid) {
            continue;
        }
        for &m in &groups[gid].members {
            out.push(m);
            if let Some(&child_gid) = owner_to_group.get(&m) {
                stack.push(child_gid);
            }
        }
    }
    out
}

fn inject_implicit_important(nodes: &mut Vec<CompiledNode>, groups: &mut [GroupInfo]) {
    let owner_to_group: HashMap<usize, usize> = groups
        .iter()
        .enumerate()
        .filter_map(|(gid, g)| g.owner_node.map(|o| (o, gid)))
        .collect();

    for group_idx in 0..groups.len() {
        let important_members = groups[group_idx].important_members.clone();
        if important_members.is_empty() {
            continue;
        }
        let closure = group_closure(groups, &owner_to_group, group_idx);
        for &p in &important_members {
            for &d in &closure {
                if d == p {
                    continue;
                }
                if already_important(nodes, d, p) {
                    continue;
                }
                if depends_on(nodes, d, p) {
                    continue;
                }
                if nodes[p].priority > nodes[d].priority {
                    nodes[d].inputs.push(CompiledInput {
                        local_name: format!("__implicit_{p}"),
                        global_index: Some(p),
                        runtime_input_name: None,
                        kind: InputKind::ImplicitImportant,
                        member_path: vec![],
                    });
                }
            }
        }
    }
}

fn already_important(nodes: &[CompiledNode], from: usize, target: usize) -> bool {
    nodes[from].inputs.iter().any(|inp| {
        inp.global_index == Some(target)
            && matches!(inp.kind, InputKind::Important | InputKind::ImplicitImportant)
    })
}

fn depends_on(nodes: &[CompiledNode], from: usize, target: usize) -> bool {
    let mut visited = HashSet::new();
    let mut queue = VecDeque::new();
    queue.push_back(from);
    while let Some(i) = queue.pop_front() {
        if i == target {
            return true;
        }
        if !visited.insert(i) {
            continue;
        }
        for dep in nodes[i].unique_input_indices() {
            queue.push_back(dep);
        }
    }
    false
}

fn hoist_literals(nodes: &mut [CompiledNode]) -> HashMap<usize, serde_json::Value> {
    let mut literals = HashMap::new();
    for (i, node) in nodes.iter_mut().enumerate() {
        if node.num_unique_inputs == 0 {
            if let crate::handler::HandlerKind::Literal(v) = &node.handler {
                literals.insert(i, v.clone());
                node.is_input = true;
            }
        }
    }
    literals
}

fn precompute_failure_chains(nodes: &mut [CompiledNode], output_index: usize) {
    let n = nodes.len();
    let mut path: Vec<Option<Vec<String>>> = vec![None; n];
    path[output_index] = Some(vec![nodes[output_index].original_name.clone()]);

    let mut queue = VecDeque::new();
    queue.push_back(output_index);
    while let Some(a) = queue.pop_front() {
        let a_path = path[a].clone().unwrap();
        for dep in nodes[a].unique_input_indices() {
            if path[dep].is_none() {
                let mut p = a_path.clone();
                p.push(nodes[dep].original_name.clone());
                path[dep] = Some(p);
                queue.push_back(dep);
            }
        }
    }

    for (i, node) in nodes.iter_mut().enumerate() {
        if let Some(p) = &path[i] {
            let mut chain = p.clone();
            chain.reverse();
            node.callers = chain[1..].to_vec();
            node.failure_chain = chain;
        }
    }
}
