//! Node registry: the compiler's sole input
//!
//! A [`NodeDefinition`] is a named computation: a handler, an ordered list
//! of declared `args` (positional inputs, each a reference string parsed by
//! [`crate::name::parse_ref`]), and a list of child [`BuildSpec`]s — nodes to
//! construct in this node's own local scope, each with its own wiring.
//!
//! The ergonomic authoring DSL this mirrors (`add(name, handler, args)`,
//! `.args(...)`, `.builds(...)`, `.using(...)`, `.modifiers(...)`,
//! `.when(cond)`/`.unless(cond)`, `.disable_node_cache()`) is an external
//! collaborator and out of scope for this crate beyond the minimum needed to
//! build a finalized [`Registry`] for the compiler to consume — there is no
//! node-name parsing convenience, profiling-bucket bookkeeping, or
//! `BuilderInstance` tracing here.

use crate::handler::{fresh_handler_id, HandlerKind};
use std::collections::{HashMap, HashSet};

/// One child node to construct inside a parent node's own `builds` scope.
#[derive(Debug, Clone)]
pub struct BuildSpec {
    /// The alias this child is bound to within the parent's scope (what
    /// sibling peers and the parent's own `provides` wiring call it).
    pub field: String,
    /// Reference to the [`NodeDefinition`] to instantiate, by registry name.
    pub node: String,
    /// Static inclusion guard: when `Some(false)`, this child (and anything
    /// only reachable through it) is omitted from compilation entirely,
    /// rather than compiled and then pruned — cheaper, and it never
    /// participates in validation's "transitively required" closure.
    pub when: Option<bool>,
}

impl BuildSpec {
    pub fn new(field: impl Into<String>, node: impl Into<String>) -> Self {
        Self { field: field.into(), node: node.into(), when: None }
    }

    pub fn when(mut self, cond: bool) -> Self {
        self.when = Some(cond);
        self
    }

    pub fn unless(mut self, cond: bool) -> Self {
        self.when = Some(!cond);
        self
    }

    /// Whether this child is statically included.
    pub fn is_included(&self) -> bool {
        self.when.unwrap_or(true)
    }
}

/// A named computation in the registry.
#[derive(Clone)]
pub struct NodeDefinition {
    pub name: String,
    pub handler: HandlerKind,
    /// Declared positional inputs, each a raw reference string (e.g.
    /// `"!checkAuth"`, `"args.userId"`) parsed at compile time.
    pub args: Vec<String>,
    /// Children constructed in this node's own scope.
    pub builds: Vec<BuildSpec>,
    /// When true, this node never coalesces with a structurally-identical
    /// peer at compile time or at run time: it gets a unique salt folded
    /// into both of its hashes.
    pub cache_disabled: bool,
    /// Short names of declared args that want getter-wrapped values instead
    /// of plain values.
    pub getter_args: HashSet<String>,
}

impl NodeDefinition {
    pub fn new(name: impl Into<String>, handler: HandlerKind) -> Self {
        Self {
            name: name.into(),
            handler,
            args: Vec::new(),
            builds: Vec::new(),
            cache_disabled: false,
            getter_args: HashSet::new(),
        }
    }

    /// Register a user-defined async handler.
    pub fn handler(name: impl Into<String>, func: crate::handler::HandlerFn) -> Self {
        Self::new(name, HandlerKind::User { id: fresh_handler_id(), func })
    }

    /// Register a compile-time literal value.
    pub fn literal(name: impl Into<String>, value: serde_json::Value) -> Self {
        Self::new(name, HandlerKind::Literal(value))
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn builds(mut self, builds: Vec<BuildSpec>) -> Self {
        self.builds = builds;
        self
    }

    pub fn disable_cache(mut self) -> Self {
        self.cache_disabled = true;
        self
    }

    pub fn with_getter(mut self, arg_short_name: impl Into<String>) -> Self {
        self.getter_args.insert(arg_short_name.into());
        self
    }
}

/// The finalized set of [`NodeDefinition`]s the compiler consumes.
///
/// Building one up (via [`Registry::add`]) is the only authoring-time
/// concern this crate implements; everything else about *how* a caller
/// constructs definitions (fluent ergonomics, name validation at add time,
/// duplicate detection) belongs to the external authoring layer.
#[derive(Clone, Default)]
pub struct Registry {
    defs: HashMap<String, NodeDefinition>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a node definition, returning an [`crate::error::GraphError::Authoring`]
    /// if a definition with the same name already exists.
    pub fn add(&mut self, def: NodeDefinition) -> crate::error::Result<&mut Self> {
        if self.defs.contains_key(&def.name) {
            return Err(crate::error::GraphError::Authoring(format!(
                "duplicate node definition: `{}`",
                def.name
            )));
        }
        self.defs.insert(def.name.clone(), def);
        Ok(self)
    }

    pub fn get(&self, name: &str) -> Option<&NodeDefinition> {
        self.defs.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.defs.contains_key(name)
    }
}
