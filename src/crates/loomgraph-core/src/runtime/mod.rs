//! The runtime: executes a frozen [`crate::compiled::CompiledPlan`]
//!
//! `spec.md` §4.5–§4.6.

pub mod results;
mod scheduler;

use crate::compiled::CompiledPlan;
use crate::error::GraphError;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Execute `plan` once against `inputs`, returning the builder's requested
/// output fields.
pub async fn run(
    plan: Arc<CompiledPlan>,
    inputs: HashMap<String, Value>,
    builder_name: &str,
) -> Result<HashMap<String, Value>, GraphError> {
    scheduler::run(plan, inputs, builder_name).await
}
