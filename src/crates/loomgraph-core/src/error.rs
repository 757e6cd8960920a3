//! Error types for graph construction, compilation, and execution
//!
//! This module defines every error that can surface from the authoring
//! registry, the compiler, or the runtime. All variants implement
//! `std::error::Error` via `thiserror`.
//!
//! # Error Hierarchy
//!
//! ```text
//! GraphError
//! ├── Authoring        - malformed name, cycle, duplicate definition
//! ├── Compile          - one or more nodes transitively required but undefined
//! ├── Runtime          - a handler failed, carrying its debug context
//! └── TypeEnforcement  - a handler's return value failed schema validation
//! ```
//!
//! Compile errors are aggregated: a single `Builder::compile` call collects
//! every missing-node problem it finds rather than stopping at the first one,
//! so a caller gets one actionable report. Runtime errors are local to the
//! node that produced them and carry a [`FailureContext`] describing how the
//! failure was reached, which is attached once at the point of failure and
//! never recomputed.

use std::sync::Arc;
use thiserror::Error;

/// Convenience result type using [`GraphError`].
pub type Result<T> = std::result::Result<T, GraphError>;

/// One node that is required by the compiled plan but was never defined and
/// was not declared as a runtime input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingNode {
    /// The name the compiler was looking for.
    pub name: String,
    /// Ordered chain of requesters, outermost first, that led to this name
    /// being required (the builder output first, the immediate requester
    /// last).
    pub requested_by: Vec<String>,
}

impl std::fmt::Display for MissingNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "`{}` (required by: {})", self.name, self.requested_by.join(" -> "))
    }
}

/// Debug context threaded onto every runtime failure.
///
/// This is the only observable side channel besides a run's output map: it
/// lets a caller reconstruct why a node failed without re-walking the
/// compiled plan.
#[derive(Debug, Clone, Default)]
pub struct FailureContext {
    /// Name of the builder whose output closure ultimately rejected.
    pub builder_name: String,
    /// Ordered `originalName`s of the nodes that transitively required the
    /// failing node, builder output first.
    pub callers: Vec<String>,
    /// Ordered `originalName`s from the failing node up to the builder
    /// output, precomputed at compile time.
    pub failure_node_chain: Vec<String>,
    /// Global (compiled-plan) names of the direct inputs that caused this
    /// node to fail.
    pub failure_inputs: Vec<String>,
}

/// Comprehensive error type for authoring, compilation, and execution.
#[derive(Error, Debug, Clone)]
pub enum GraphError {
    /// Malformed node name, declared cycle, duplicate definition, or
    /// otherwise invalid handler registration. Raised at `add` time or at
    /// the start of `compile`.
    #[error("authoring error: {0}")]
    Authoring(String),

    /// One or more nodes are transitively required by the builder's output
    /// but are neither defined in the registry nor declared as a runtime
    /// input. Aggregated: lists every offender found during one validation
    /// pass.
    #[error("compile error: {} node(s) missing: {}", .errors.len(), join_missing(.errors))]
    Compile { errors: Vec<MissingNode> },

    /// A handler threw, returned a rejected future, or invoked its callback
    /// with an error. Recorded once, local to the failing node's output
    /// closure; propagates only to that node's dependents.
    #[error("node `{node}` failed: {source}")]
    Runtime {
        node: String,
        #[source]
        source: Arc<GraphError>,
        context: FailureContext,
    },

    /// The leaf cause of a runtime failure: the handler's own error message.
    #[error("{0}")]
    Handler(String),

    /// Optional output type enforcement is enabled and a handler's return
    /// value did not match the node's declared schema.
    #[error("node `{node}` returned a value of the wrong shape: {message}")]
    TypeEnforcement { node: String, message: String },
}

fn join_missing(errors: &[MissingNode]) -> String {
    errors
        .iter()
        .map(|m| m.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

impl GraphError {
    /// Wrap a leaf error as a handler failure with no context yet; context
    /// is attached once by the runtime as the error propagates to its
    /// node's own result slot.
    pub fn handler(message: impl Into<String>) -> Self {
        GraphError::Handler(message.into())
    }

    /// Attach (or re-attach) a node name and failure context to an
    /// already-produced error, wrapping it as a `Runtime` failure.
    ///
    /// If `source` is already a `Runtime` error for a different node (i.e.
    /// this is a propagated ancestor failure), the original context — and in
    /// particular its `failure_node_chain` root cause — is preserved; only
    /// `callers` is extended with this node's name so the chain keeps
    /// growing on the way back up to the builder output.
    pub fn propagate(node: &str, source: GraphError, mut context: FailureContext) -> Self {
        if let GraphError::Runtime {
            context: inner_ctx, ..
        } = &source
        {
            context.failure_node_chain = inner_ctx.failure_node_chain.clone();
        }
        GraphError::Runtime {
            node: node.to_string(),
            source: Arc::new(source),
            context,
        }
    }

    /// The root [`FailureContext`] carried by this error, if any.
    pub fn context(&self) -> Option<&FailureContext> {
        match self {
            GraphError::Runtime { context, .. } => Some(context),
            _ => None,
        }
    }
}
