//! Handler values: the work a compiled node does when invoked
//!
//! A [`HandlerKind`] is either a user-supplied async function, a literal
//! value, or one of the two sentinel identities the compiler recognizes by
//! construction rather than by inspecting a function body: `subgraph`
//! (return the last positional argument) and `args_to_array` (return the
//! positional argument list as an array).

use crate::error::GraphError;
use futures::future::BoxFuture;
use serde_json::Value;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Stable identity for a handler, used by the hasher to decide whether two
/// compiled nodes invoke "the same work".
///
/// Rust closures have no identity that survives separate compilations or
/// even separate `add` calls with structurally-identical bodies, so instead
/// of hashing a function pointer, every registration is assigned a fresh id
/// the first time it's seen; the hasher then keys on this id, matching
/// `spec.md`'s guidance for targets without first-class function identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId(pub u64);

static NEXT_HANDLER_ID: AtomicU64 = AtomicU64::new(1);

/// Allocate a fresh, process-wide unique [`HandlerId`].
///
/// Called once per `add(name, handler, ...)` registration; every
/// [`NodeDefinition`](crate::definition::NodeDefinition) built from the same
/// registration (e.g. reused across multiple builder scopes) shares the
/// resulting id, which is what lets the hasher recognize "two nodes pointing
/// at the same handler with the same inputs" as dedup-equal even when they
/// were authored under different names.
pub fn fresh_handler_id() -> HandlerId {
    HandlerId(NEXT_HANDLER_ID.fetch_add(1, Ordering::Relaxed))
}

/// The async function a user-defined node runs.
///
/// Takes the resolved [`Arg`] list (argument inputs only, in declaration
/// order) and returns the node's value or a handler-level error.
pub type HandlerFn =
    Arc<dyn Fn(Vec<Arg>) -> BoxFuture<'static, Result<Value, GraphError>> + Send + Sync>;

/// One resolved argument as presented to a handler.
///
/// Plain handlers receive [`Arg::Value`] directly. Handlers that opt in to
/// getter-wrapped inputs instead receive [`Arg::Getter`] for every argument
/// declared with that flag, trading automatic error short-circuiting for
/// explicit per-argument observation: the handler decides whether and when
/// to call [`Getter::get`], and can choose to substitute a fallback instead
/// of failing outright.
#[derive(Clone)]
pub enum Arg {
    Value(Arc<Value>),
    Getter(Getter),
}

impl Arg {
    /// Unwrap a plain value, or resolve a getter, returning the upstream
    /// error if the input failed.
    pub fn get(&self) -> Result<Arc<Value>, GraphError> {
        match self {
            Arg::Value(v) => Ok(v.clone()),
            Arg::Getter(g) => g.get(),
        }
    }
}

/// A lazily-observed argument: either the resolved value, or the error the
/// upstream input failed with.
#[derive(Clone)]
pub struct Getter(Result<Arc<Value>, Arc<GraphError>>);

impl Getter {
    pub fn ok(value: Arc<Value>) -> Self {
        Getter(Ok(value))
    }

    pub fn err(error: Arc<GraphError>) -> Self {
        Getter(Err(error))
    }

    /// Observe the value, re-throwing the upstream error if the input
    /// failed.
    pub fn get(&self) -> Result<Arc<Value>, GraphError> {
        match &self.0 {
            Ok(v) => Ok(v.clone()),
            Err(e) => Err((**e).clone()),
        }
    }

    /// True if the upstream input failed.
    pub fn is_err(&self) -> bool {
        self.0.is_err()
    }
}

/// What a compiled node does when it runs.
#[derive(Clone)]
pub enum HandlerKind {
    /// A registered user async function, identified for hashing/dedup
    /// purposes by `id`.
    User { id: HandlerId, func: HandlerFn },
    /// A compile-time constant; `numUniqueInputs` is always zero and the
    /// value is hoisted into the plan's input-literals table rather than
    /// invoked at run time (`spec.md` §4.1 edge case).
    Literal(Value),
    /// Sentinel identity: collapse to "return the last positional argument".
    Subgraph,
    /// Sentinel identity: collapse to "return the positional argument list
    /// as a JSON array".
    ArgsToArray,
    /// Synthetic handler for the builder's single output node: zip the
    /// positional argument list back up with the requested field names and
    /// return a JSON object. Not user-registrable; constructed once per
    /// compile by `compiler::peer` for the root peer group.
    ///
    /// `silent[i]` mirrors `aliases[i]`: a silent (`+`-prefixed) output field
    /// is still resolved like any other requested output — it can gate an
    /// important guard or register as a peer for fencing purposes — but is
    /// dropped from the final output map rather than inserted under its
    /// alias (`spec.md` §6: "silent outputs suppressed").
    CombineOutputs { aliases: Vec<String>, silent: Vec<bool> },
}

impl fmt::Debug for HandlerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandlerKind::User { id, .. } => write!(f, "User({id:?})"),
            HandlerKind::Literal(v) => write!(f, "Literal({v})"),
            HandlerKind::Subgraph => write!(f, "Subgraph"),
            HandlerKind::ArgsToArray => write!(f, "ArgsToArray"),
            HandlerKind::CombineOutputs { aliases, .. } => write!(f, "CombineOutputs({aliases:?})"),
        }
    }
}

impl HandlerKind {
    /// The stable identity the hasher keys function identity on. Literal
    /// nodes and sentinel handlers have no registered [`HandlerId`]; the
    /// hasher instead folds their literal value or sentinel tag directly
    /// into the hash (`spec.md` §4.2: "literal-identity").
    pub fn handler_id(&self) -> Option<HandlerId> {
        match self {
            HandlerKind::User { id, .. } => Some(*id),
            _ => None,
        }
    }

    pub fn is_literal(&self) -> bool {
        matches!(self, HandlerKind::Literal(_))
    }
}

/// Invoke a handler with resolved argument values.
pub async fn invoke(handler: &HandlerKind, args: Vec<Arg>) -> Result<Value, GraphError> {
    match handler {
        HandlerKind::User { func, .. } => func(args).await,
        HandlerKind::Literal(v) => Ok(v.clone()),
        HandlerKind::Subgraph => {
            let last = args.last().ok_or_else(|| {
                GraphError::handler("subgraph handler invoked with no positional arguments")
            })?;
            Ok((*last.get()?).clone())
        }
        HandlerKind::ArgsToArray => {
            let mut out = Vec::with_capacity(args.len());
            for a in &args {
                out.push((*a.get()?).clone());
            }
            Ok(Value::Array(out))
        }
        HandlerKind::CombineOutputs { aliases, silent } => {
            let mut map = serde_json::Map::with_capacity(aliases.len());
            for ((alias, &is_silent), a) in aliases.iter().zip(silent.iter()).zip(args.iter()) {
                let value = (*a.get()?).clone();
                if !is_silent {
                    map.insert(alias.clone(), value);
                }
            }
            Ok(Value::Object(map))
        }
    }
}
