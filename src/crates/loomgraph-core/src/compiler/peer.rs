//! Peer compiler: lowers one registry + a builder's output selection into a
//! flat `Vec<CompiledNode>`.
//!
//! `spec.md` §4.1. A *peer group* is one scope's worth of sibling nodes: the
//! builder's own requested output fields form the root group; every node
//! that itself declares `builds` children spawns one more nested group,
//! compiled before the node that owns it. Three kinds of reference a
//! group's members can make are resolved here:
//!
//! - another member of the same group (an ordinary sibling dependency)
//! - an ancestor group's member, visible to every descendant scope unless
//!   its alias is private (trailing `_`)
//! - `args.NAME` / `args.*`, forwarding the *enclosing node's own* declared
//!   arguments one level further down
//!
//! A reference that matches none of these is provisionally treated as a
//! runtime input by name; `compiler::validate` is what actually confirms
//! that presumption against the declared runtime-input list, so this module
//! never fails just because a name doesn't resolve locally.

use crate::compiled::{ArgSlot, CompiledInput, CompiledNode, RequiredFields};
use crate::definition::Registry;
use crate::error::{GraphError, Result};
use crate::handler::HandlerKind;
use crate::name::{self, InputKind, RefTarget};
use std::collections::HashMap;

/// One entry in a peer group: the alias this child is bound to within its
/// scope, and the registry definition it instantiates.
#[derive(Debug, Clone)]
pub struct BuildRequest {
    pub alias: String,
    pub node_name: String,
    /// Whether `alias` carried the `+` output-field modifier (`spec.md` §6):
    /// build and wire this node like any other requested output, but drop it
    /// from the final output map. Only meaningful for a root-level request;
    /// `compile_root` is the only caller that reads this.
    pub silent: bool,
}

impl BuildRequest {
    pub fn new(alias: impl Into<String>, node_name: impl Into<String>) -> Self {
        let alias = alias.into();
        let silent = name::parse_ref(&alias).map(|p| p.silent).unwrap_or(false);
        let alias = alias.strip_prefix('+').map(str::to_string).unwrap_or(alias);
        Self { alias, node_name: node_name.into(), silent }
    }
}

/// Debug/rewrite-time metadata about one peer group, retained only for the
/// rewriter's implicit-important-injection pass (`compiler::rewrite`); not
/// part of the public [`crate::compiled::CompiledPlan`].
#[derive(Debug, Clone, Default)]
pub struct GroupInfo {
    pub members: Vec<usize>,
    pub important_members: Vec<usize>,
    /// The node (if any) whose `builds` list spawned this group — `None` for
    /// the root group. Lets the rewriter's implicit-important-injection pass
    /// walk from a group into a member's own nested child group.
    pub owner_node: Option<usize>,
}

/// Everything the peer compiler produces, before hashing/rewriting/
/// validation.
pub struct PeerPlanDraft {
    pub nodes: Vec<CompiledNode>,
    pub groups: Vec<GroupInfo>,
    pub output_index: usize,
}

#[derive(Clone)]
enum EnclosingArgRef {
    Node(usize, Vec<String>),
    RuntimeInput(String, Vec<String>),
}

/// Ordered `(short_name, target)` pairs available to a group's members via
/// `args.NAME` / `args.*`.
type EnclosingArgs = Vec<(String, EnclosingArgRef)>;

struct Ctx<'a> {
    registry: &'a Registry,
    nodes: Vec<CompiledNode>,
    groups: Vec<GroupInfo>,
}

/// Compile the builder's requested output selection (the root peer group)
/// plus every node it transitively `builds`, into a flat plan.
pub fn compile_root(
    registry: &Registry,
    runtime_input_names: &[String],
    root_requests: &[BuildRequest],
) -> Result<PeerPlanDraft> {
    let mut ctx = Ctx { registry, nodes: Vec::new(), groups: Vec::new() };

    let root_enclosing_args: EnclosingArgs = runtime_input_names
        .iter()
        .map(|name| (name.clone(), EnclosingArgRef::RuntimeInput(name.clone(), vec![])))
        .collect();

    let root_aliases = compile_group(&mut ctx, root_requests, &HashMap::new(), &root_enclosing_args)?;

    let mut ordered_aliases = Vec::with_capacity(root_requests.len());
    let mut silent_flags = Vec::with_capacity(root_requests.len());
    for req in root_requests {
        ordered_aliases.push(req.alias.clone());
        silent_flags.push(req.silent);
    }

    let output_inputs: Vec<CompiledInput> = ordered_aliases
        .iter()
        .map(|alias| CompiledInput {
            local_name: alias.clone(),
            global_index: root_aliases.get(alias).copied(),
            runtime_input_name: None,
            kind: InputKind::Argument,
            member_path: vec![],
        })
        .collect();
    let arg_slots: Vec<ArgSlot> = (0..output_inputs.len())
        .map(|index| ArgSlot::Input { index, use_getter: false })
        .collect();
    let num_unique_inputs = output_inputs.len();

    let output_node = CompiledNode {
        original_name: "__output__".to_string(),
        new_name: "__output__".to_string(),
        inputs: output_inputs,
        handler: HandlerKind::CombineOutputs { aliases: ordered_aliases, silent: silent_flags },
        cache_disabled: false,
        complete_hash: 0,
        non_important_hash: 0,
        required_fields: RequiredFields::All,
        priority: 0,
        output_nodes: vec![],
        num_unique_inputs,
        failure_chain: vec![],
        callers: vec![],
        is_output: true,
        is_input: false,
        arg_slots,
        group_id: usize::MAX,
    };
    ctx.nodes.push(output_node);
    let output_index = ctx.nodes.len() - 1;

    Ok(PeerPlanDraft { nodes: ctx.nodes, groups: ctx.groups, output_index })
}

/// Compile one peer group. Returns the group's own alias -> global-index
/// map, for the caller to fold into `ancestor_visible` for later siblings
/// and descendants.
fn compile_group(
    ctx: &mut Ctx,
    requests: &[BuildRequest],
    ancestor_visible: &HashMap<String, usize>,
    enclosing_args: &EnclosingArgs,
) -> Result<HashMap<String, usize>> {
    let group_id = ctx.groups.len();
    ctx.groups.push(GroupInfo::default());

    let alias_set: std::collections::HashSet<&str> =
        requests.iter().map(|r| r.alias.as_str()).collect();

    let mut deps: HashMap<String, Vec<String>> = HashMap::new();
    for req in requests {
        let def = ctx.registry.get(&req.node_name).ok_or_else(|| {
            GraphError::Authoring(format!(
                "`builds` references unregistered node `{}`",
                req.node_name
            ))
        })?;
        let mut d = Vec::new();
        for raw in &def.args {
            if raw == "_requiredFields" {
                continue;
            }
            let parsed = name::parse_ref(raw).map_err(GraphError::Authoring)?;
            if let RefTarget::Node(n) = &parsed.target {
                if alias_set.contains(n.as_str()) && n != &req.alias {
                    d.push(n.clone());
                }
            }
        }
        deps.insert(req.alias.clone(), d);
    }

    let aliases: Vec<String> = requests.iter().map(|r| r.alias.clone()).collect();
    let order = super::resolver::topo_order(&aliases, &deps).map_err(|cyclic| {
        GraphError::Authoring(format!(
            "dependency cycle among peer nodes: {}",
            cyclic.join(", ")
        ))
    })?;

    let by_alias: HashMap<&str, &BuildRequest> =
        requests.iter().map(|r| (r.alias.as_str(), r)).collect();

    let mut group_compiled: HashMap<String, usize> = HashMap::new();

    for alias in &order {
        let req = by_alias[alias.as_str()];
        let def = ctx.registry.get(&req.node_name).expect("checked above");

        // Step 1: resolve this node's own declared args against everything
        // visible *except* its own not-yet-created children, producing the
        // enclosing-args context its children see as `args.NAME`.
        let mut pending: EnclosingArgs = Vec::new();
        let mut passthrough_all = false;
        for raw in &def.args {
            if raw == "_requiredFields" {
                continue;
            }
            let parsed = name::parse_ref(raw).map_err(GraphError::Authoring)?;
            let short = name::short_name(raw).map_err(GraphError::Authoring)?;
            match &parsed.target {
                RefTarget::Node(n) => {
                    let (idx, rt_name) =
                        resolve_name(n, &group_compiled, ancestor_visible);
                    let target = match idx {
                        Some(i) => EnclosingArgRef::Node(i, parsed.member_path.clone()),
                        None => EnclosingArgRef::RuntimeInput(
                            rt_name.unwrap(),
                            parsed.member_path.clone(),
                        ),
                    };
                    pending.push((short, target));
                }
                RefTarget::Arg(name) => {
                    if let Some((_, target)) = enclosing_args.iter().find(|(n, _)| n == name) {
                        pending.push((short, extend_member_path(target, &parsed.member_path)));
                    }
                }
                RefTarget::AllArgs => {
                    passthrough_all = true;
                }
            }
        }
        if passthrough_all {
            for (n, t) in enclosing_args {
                pending.push((n.clone(), t.clone()));
            }
        }

        // Step 2: compile this node's own children (if any), using `pending`
        // as their enclosing-args context.
        let mut child_aliases: HashMap<String, usize> = HashMap::new();
        let mut child_group_id: Option<usize> = None;
        if !def.builds.is_empty() {
            let child_requests: Vec<BuildRequest> = def
                .builds
                .iter()
                .filter(|b| b.is_included())
                .map(|b| BuildRequest::new(b.field.clone(), b.node.clone()))
                .collect();
            let child_ancestor_visible = merge_visible(ancestor_visible, &group_compiled);
            // `compile_group` always allocates `group_id = ctx.groups.len()`
            // as its first action, so the id it's about to take is knowable
            // before the node that owns it has a global index of its own.
            child_group_id = Some(ctx.groups.len());
            child_aliases =
                compile_group(ctx, &child_requests, &child_ancestor_visible, &pending)?;
        }

        // Step 3: resolve this node's final inputs and positional-argument
        // slots, now that its own children exist and can shadow siblings.
        let local_scope = merge_visible(&group_compiled, &child_aliases);
        let mut inputs: Vec<CompiledInput> = Vec::new();
        let mut arg_slots: Vec<ArgSlot> = Vec::new();

        for raw in &def.args {
            if raw == "_requiredFields" {
                arg_slots.push(ArgSlot::RequiredFields);
                continue;
            }
            let parsed = name::parse_ref(raw).map_err(GraphError::Authoring)?;
            let short = name::short_name(raw).map_err(GraphError::Authoring)?;

            match &parsed.target {
                RefTarget::Node(n) => {
                    let (idx, rt_name) = resolve_name(n, &local_scope, ancestor_visible);
                    // Implicit-important fencing only applies among actual
                    // siblings of this exact peer group; an important
                    // reference reaching into an ancestor or a private
                    // child scope doesn't register here (that ancestor/
                    // child scope tracks its own important peers when it
                    // was compiled).
                    if parsed.kind == InputKind::Important {
                        if let Some(i) = idx {
                            if group_compiled.values().any(|&v| v == i) {
                                mark_important(ctx, group_id, i);
                            }
                        }
                    }
                    push_input(
                        &mut inputs,
                        &mut arg_slots,
                        short,
                        idx,
                        rt_name,
                        parsed.kind,
                        parsed.member_path,
                        &def.getter_args,
                    );
                }
                RefTarget::Arg(_) => {
                    if let Some((_, target)) = pending_lookup(&pending, &short) {
                        let (idx, rt_name) = split_target(target);
                        push_input(
                            &mut inputs,
                            &mut arg_slots,
                            short,
                            idx,
                            rt_name,
                            InputKind::Argument,
                            vec![],
                            &def.getter_args,
                        );
                    }
                }
                RefTarget::AllArgs => {
                    for (n, target) in &pending {
                        let (idx, rt_name) = split_target(target);
                        push_input(
                            &mut inputs,
                            &mut arg_slots,
                            n.clone(),
                            idx,
                            rt_name,
                            InputKind::Argument,
                            vec![],
                            &def.getter_args,
                        );
                    }
                }
            }
        }

        let num_unique_inputs = {
            let mut seen = std::collections::HashSet::new();
            inputs.iter().filter_map(|i| i.global_index).filter(|i| seen.insert(*i)).count()
        };

        let node = CompiledNode {
            original_name: def.name.clone(),
            new_name: format!("{}-peerGroup{}", def.name, group_id),
            inputs,
            handler: def.handler.clone(),
            cache_disabled: def.cache_disabled,
            complete_hash: 0,
            non_important_hash: 0,
            required_fields: RequiredFields::Some(Default::default()),
            priority: 0,
            output_nodes: vec![],
            num_unique_inputs,
            failure_chain: vec![],
            callers: vec![],
            is_output: false,
            is_input: false,
            arg_slots,
            group_id,
        };
        ctx.nodes.push(node);
        let new_idx = ctx.nodes.len() - 1;
        ctx.groups[group_id].members.push(new_idx);
        if let Some(cgid) = child_group_id {
            ctx.groups[cgid].owner_node = Some(new_idx);
        }

        // Privacy (trailing `_`) only limits what `merge_visible` hands down
        // to descendants; every member of this group is visible to its own
        // siblings regardless.
        group_compiled.insert(req.alias.clone(), new_idx);
    }

    Ok(group_compiled)
}

fn pending_lookup<'a>(
    pending: &'a EnclosingArgs,
    short: &str,
) -> Option<&'a (String, EnclosingArgRef)> {
    pending.iter().find(|(n, _)| n == short)
}

fn split_target(target: &EnclosingArgRef) -> (Option<usize>, Option<String>) {
    match target {
        EnclosingArgRef::Node(idx, _path) => (Some(*idx), None),
        EnclosingArgRef::RuntimeInput(name, _path) => (None, Some(name.clone())),
    }
}

fn extend_member_path(target: &EnclosingArgRef, extra: &[String]) -> EnclosingArgRef {
    match target {
        EnclosingArgRef::Node(idx, path) => {
            let mut p = path.clone();
            p.extend_from_slice(extra);
            EnclosingArgRef::Node(*idx, p)
        }
        EnclosingArgRef::RuntimeInput(name, path) => {
            let mut p = path.clone();
            p.extend_from_slice(extra);
            EnclosingArgRef::RuntimeInput(name.clone(), p)
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn push_input(
    inputs: &mut Vec<CompiledInput>,
    arg_slots: &mut Vec<ArgSlot>,
    local_name: String,
    global_index: Option<usize>,
    runtime_input_name: Option<String>,
    kind: InputKind,
    member_path: Vec<String>,
    getter_args: &std::collections::HashSet<String>,
) {
    let use_getter = kind.is_argument() && getter_args.contains(&local_name);
    let slot_index = inputs.len();
    inputs.push(CompiledInput { local_name, global_index, runtime_input_name, kind, member_path });
    if kind.is_argument() {
        arg_slots.push(ArgSlot::Input { index: slot_index, use_getter });
    }
}

fn resolve_name(
    name: &str,
    local_scope: &HashMap<String, usize>,
    ancestor_visible: &HashMap<String, usize>,
) -> (Option<usize>, Option<String>) {
    if let Some(&idx) = local_scope.get(name) {
        (Some(idx), None)
    } else if let Some(&idx) = ancestor_visible.get(name) {
        (Some(idx), None)
    } else {
        (None, Some(name.to_string()))
    }
}

/// Merge a freshly-compiled group's aliases into the visibility set handed
/// down to its descendants, dropping private (trailing `_`) aliases.
fn merge_visible(
    base: &HashMap<String, usize>,
    additions: &HashMap<String, usize>,
) -> HashMap<String, usize> {
    let mut out = base.clone();
    for (k, v) in additions {
        if !name::is_private(k) {
            out.insert(k.clone(), *v);
        }
    }
    out
}

fn mark_important(ctx: &mut Ctx, group_id: usize, target_idx: usize) {
    let info = &mut ctx.groups[group_id];
    if !info.important_members.contains(&target_idx) {
        info.important_members.push(target_idx);
    }
}
