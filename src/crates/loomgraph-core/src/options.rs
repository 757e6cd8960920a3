//! Compile-time and run-time options
//!
//! `spec.md` §6/§9.

/// Options accepted by [`crate::builder::Builder::compile`].
#[derive(Debug, Clone, Default)]
pub struct CompileOptions {
    /// Cross-check every declared handler parameter name against its
    /// corresponding argument reference's short name.
    ///
    /// Rust handlers are plain closures (`Vec<Arg> -> BoxFuture<...>`) with
    /// no reflectable parameter names, unlike the dynamic-language target
    /// this crate's behavior is modeled on — so this flag is accepted for
    /// API parity and does nothing. Positional argument order (the thing
    /// that actually matters for a Rust handler) is always checked by
    /// construction: `arg_slots` is built directly from the declared `args`
    /// list, so a mismatch can't silently occur the way a misspelled
    /// parameter name could in a reflection-based implementation.
    pub check_parameter_names: bool,
}

impl CompileOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn check_parameter_names(mut self, check: bool) -> Self {
        self.check_parameter_names = check;
        self
    }
}

/// Options accepted by [`crate::builder::Builder::run`].
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Sample profiling metrics (memo hit ratio, nodes invoked) once every
    /// `profile_every` runs rather than every run. `0` disables sampling
    /// entirely; the metrics are still accumulated in
    /// [`crate::runtime::results::RunMetrics`], just not reported.
    pub profile_every: u32,
    /// Deep-freeze every value a handler returns before handing it to
    /// dependents, guarding against a handler mutating a `serde_json::Value`
    /// it doesn't own.
    ///
    /// Every value that crosses a node boundary in this crate is already
    /// wrapped in `Arc<Value>` and `serde_json::Value` has no interior
    /// mutability, so nothing can mutate a shared value in the first place —
    /// this flag is accepted for API parity with the reference design and is
    /// always a no-op here.
    pub deep_freeze: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self { profile_every: 0, deep_freeze: false }
    }
}

impl RunOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn profile_every(mut self, n: u32) -> Self {
        self.profile_every = n;
        self
    }

    pub fn deep_freeze(mut self, enabled: bool) -> Self {
        self.deep_freeze = enabled;
        self
    }
}
