//! The builder: the public entry point for declaring a registry and an
//! output selection, compiling it, and running it.
//!
//! `spec.md` §6/§8. A [`Builder`] owns a [`Registry`] and a list of
//! requested output fields — the root peer group `compiler::peer` compiles.
//! Compiling is idempotent and memoized by the declared runtime-input
//! names; running is cheap and can be called repeatedly against the same
//! compiled plan with different input values.
//!
//! ```no_run
//! use loomgraph_core::builder::Builder;
//! use loomgraph_core::definition::NodeDefinition;
//! use loomgraph_core::handler::Arg;
//! use futures::FutureExt;
//! use serde_json::json;
//!
//! # async fn run() -> loomgraph_core::error::Result<()> {
//! let mut builder = Builder::new("greeting");
//! builder.add(NodeDefinition::handler("greeting", std::sync::Arc::new(|args: Vec<Arg>| {
//!     async move {
//!         let name = args[0].get()?;
//!         Ok(json!(format!("hello, {}", name.as_str().unwrap_or("world"))))
//!     }.boxed()
//! })).args(["args.name"]))?;
//! builder.provide("greeting", "greeting");
//!
//! let plan = builder.compile(&["name"], Default::default())?;
//! let output = builder.run(plan, [("name".to_string(), json!("ada"))].into(), Default::default()).await?;
//! assert_eq!(output["greeting"], json!("hello, ada"));
//! # Ok(())
//! # }
//! ```

use crate::compiled::CompiledPlan;
use crate::compiler::{self, BuildRequest};
use crate::definition::{NodeDefinition, Registry};
use crate::error::Result;
use crate::options::{CompileOptions, RunOptions};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::debug;

#[cfg(feature = "type-enforcement")]
use crate::error::GraphError;

type PreRunHook = Arc<dyn Fn(&HashMap<String, Value>) + Send + Sync>;
type PostRunHook = Arc<dyn Fn(&Result<HashMap<String, Value>>) + Send + Sync>;

/// A named graph under construction: a registry plus a requested output
/// selection.
pub struct Builder {
    name: String,
    registry: Registry,
    outputs: Vec<BuildRequest>,
    compiled: Mutex<Option<CachedPlan>>,
    pre_run: Vec<PreRunHook>,
    post_run: Vec<PostRunHook>,
    /// JSON Schema the final output map must satisfy, checked only when the
    /// `type-enforcement` feature is enabled. Stored regardless of the
    /// feature flag so a caller doesn't need a `cfg` of their own just to
    /// call [`Builder::set_output_schema`].
    output_schema: Option<Value>,
}

struct CachedPlan {
    runtime_input_names: Vec<String>,
    plan: Arc<CompiledPlan>,
}

impl Builder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            registry: Registry::new(),
            outputs: Vec::new(),
            compiled: Mutex::new(None),
            pre_run: Vec::new(),
            post_run: Vec::new(),
            output_schema: None,
        }
    }

    /// Require the final output map to satisfy `schema`, enforced only when
    /// this crate is built with the `type-enforcement` feature; a no-op
    /// stored value otherwise.
    pub fn set_output_schema(&mut self, schema: Value) -> &mut Self {
        self.output_schema = Some(schema);
        self
    }

    /// Register a node definition.
    pub fn add(&mut self, def: NodeDefinition) -> Result<&mut Self> {
        self.registry.add(def)?;
        Ok(self)
    }

    /// Request a field in the builder's output, bound to a registered node.
    ///
    /// Calling this again invalidates any previously compiled plan.
    pub fn provide(&mut self, field: impl Into<String>, node: impl Into<String>) -> &mut Self {
        self.outputs.push(BuildRequest::new(field, node));
        *self.compiled.lock().unwrap() = None;
        self
    }

    /// Run a closure before every `run`, observing the raw input map.
    pub fn on_pre_run(&mut self, hook: PreRunHook) -> &mut Self {
        self.pre_run.push(hook);
        self
    }

    /// Run a closure after every `run`, observing the final result.
    pub fn on_post_run(&mut self, hook: PostRunHook) -> &mut Self {
        self.post_run.push(hook);
        self
    }

    /// Compile the current registry and output selection against a fixed
    /// set of declared runtime-input names.
    ///
    /// Idempotent: calling this again with the same `runtime_input_names`
    /// (and no intervening `add`/`provide` calls) returns the cached plan
    /// without recompiling, matching `spec.md` §8's idempotence property.
    pub fn compile(
        &self,
        runtime_input_names: &[&str],
        _options: CompileOptions,
    ) -> Result<Arc<CompiledPlan>> {
        let names: Vec<String> = runtime_input_names.iter().map(|s| s.to_string()).collect();

        {
            let cached = self.compiled.lock().unwrap();
            if let Some(c) = cached.as_ref() {
                if c.runtime_input_names == names {
                    debug!(builder = %self.name, "reusing cached plan");
                    return Ok(c.plan.clone());
                }
            }
        }

        debug!(builder = %self.name, inputs = ?names, "compiling plan");
        let plan = Arc::new(compiler::compile(&self.registry, &names, &self.outputs)?);
        *self.compiled.lock().unwrap() =
            Some(CachedPlan { runtime_input_names: names, plan: plan.clone() });
        Ok(plan)
    }

    /// Execute a compiled plan against a concrete set of input values.
    pub async fn run(
        &self,
        plan: Arc<CompiledPlan>,
        inputs: HashMap<String, Value>,
        _options: RunOptions,
    ) -> Result<HashMap<String, Value>> {
        for hook in &self.pre_run {
            hook(&inputs);
        }
        let mut result = crate::runtime::run(plan, inputs, &self.name).await;

        #[cfg(feature = "type-enforcement")]
        if let (Ok(output), Some(schema)) = (&result, &self.output_schema) {
            if let Err(e) = enforce_output_schema(&self.name, schema, output) {
                result = Err(e);
            }
        }

        for hook in &self.post_run {
            hook(&result);
        }
        result
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Validate a run's output map against a declared JSON Schema. Compiled
/// fresh per run rather than cached on the builder: `jsonschema::JSONSchema`
/// borrows from the `Value` it was compiled from, which doesn't fit
/// `Builder`'s `Send + Sync` storage without an explicit lifetime or a
/// second `Arc`, and schema compilation is cheap next to a handler-graph run.
#[cfg(feature = "type-enforcement")]
fn enforce_output_schema(
    builder_name: &str,
    schema: &Value,
    output: &HashMap<String, Value>,
) -> Result<()> {
    let compiled = jsonschema::JSONSchema::compile(schema).map_err(|e| GraphError::TypeEnforcement {
        node: builder_name.to_string(),
        message: format!("invalid output schema: {e}"),
    })?;
    let as_value = serde_json::to_value(output)
        .expect("a HashMap<String, Value> always serializes to a JSON object");
    compiled.validate(&as_value).map_err(|errors| {
        let message = errors.map(|e| e.to_string()).collect::<Vec<_>>().join("; ");
        GraphError::TypeEnforcement { node: builder_name.to_string(), message }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::Arg;
    use futures::FutureExt;
    use serde_json::json;

    #[tokio::test]
    async fn compiles_and_runs_a_single_node_graph() {
        let mut builder = Builder::new("test");
        builder
            .add(
                NodeDefinition::handler(
                    "greet",
                    Arc::new(|args: Vec<Arg>| {
                        async move {
                            let name = args[0].get()?;
                            Ok(json!(format!("hi {}", name.as_str().unwrap_or(""))))
                        }
                        .boxed()
                    }),
                )
                .args(["args.name"]),
            )
            .unwrap();
        builder.provide("greeting", "greet");

        let plan = builder.compile(&["name"], CompileOptions::default()).unwrap();
        let out = builder
            .run(plan, HashMap::from([("name".to_string(), json!("ada"))]), RunOptions::default())
            .await
            .unwrap();
        assert_eq!(out["greeting"], json!("hi ada"));
    }

    #[test]
    fn compile_is_memoized_for_the_same_input_names() {
        let mut builder = Builder::new("test");
        builder.add(NodeDefinition::literal("one", json!(1))).unwrap();
        builder.provide("out", "one");

        let a = builder.compile(&[], CompileOptions::default()).unwrap();
        let b = builder.compile(&[], CompileOptions::default()).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[cfg(feature = "type-enforcement")]
    #[tokio::test]
    async fn output_schema_violation_fails_the_run() {
        let mut builder = Builder::new("schema-checked");
        builder.add(NodeDefinition::literal("one", json!(1))).unwrap();
        builder.provide("count", "one");
        builder.set_output_schema(json!({
            "type": "object",
            "properties": { "count": { "type": "string" } },
            "required": ["count"]
        }));

        let plan = builder.compile(&[], CompileOptions::default()).unwrap();
        let err = builder.run(plan, HashMap::new(), RunOptions::default()).await.unwrap_err();
        assert!(matches!(err, crate::error::GraphError::TypeEnforcement { .. }));
    }
}
