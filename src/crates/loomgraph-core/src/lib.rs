//! loomgraph-core: a declarative, content-addressed asynchronous dataflow
//! engine.
//!
//! A [`builder::Builder`] owns a registry of named node computations
//! ([`definition::NodeDefinition`]) and a requested output selection. Its
//! [`builder::Builder::compile`] method lowers that registry plus selection
//! into a flat, deduplicated, prioritized [`compiled::CompiledPlan`]
//! (`compiler` — peer compilation, content hashing, a fixed sequence of
//! rewriter passes, and validation); [`builder::Builder::run`] executes that
//! plan concurrently against a set of input values (`runtime`), returning
//! the builder's requested fields or the first failure to reach them.
//!
//! Two invariants run end to end:
//!
//! - **content addressing**: every compiled node gets a complete hash (used
//!   to coalesce structurally-identical nodes at compile time) and a
//!   non-important hash (used to memoize identical handler invocations
//!   within one run), computed in `compiler::hash` and consulted in
//!   `runtime::results`.
//! - **important fences**: a `!`-prefixed reference must resolve — and be
//!   checked for errors — before its dependent's handler runs, even though
//!   it never becomes a positional argument; `name::InputKind::is_guard`
//!   marks which input kinds this applies to, and `runtime::scheduler`
//!   enforces it on every node.

pub mod builder;
pub mod compiled;
pub mod compiler;
pub mod definition;
pub mod error;
pub mod handler;
pub mod name;
pub mod options;
pub mod runtime;
pub mod visualization;

pub use builder::Builder;
pub use compiled::CompiledPlan;
pub use definition::{BuildSpec, NodeDefinition, Registry};
pub use error::{GraphError, Result};
pub use handler::{Arg, Getter, HandlerKind};
pub use options::{CompileOptions, RunOptions};
