//! State executors: one per state type, selected by [`executor_for`].
//!
//! Every executor follows the same shape: preprocess the input through the
//! state's strategy, run the type-specific logic, postprocess the result.
//! Retry/Catch is not handled here; see [`crate::driver`].

mod choice;
mod map;
mod parallel;
mod simple;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use stepsim_core::{JsonPath, State};

pub use choice::ChoiceExecutor;
pub use map::{DistributedMapExecutor, InlineMapExecutor};
pub use parallel::ParallelExecutor;
pub use simple::{FailExecutor, PassExecutor, SucceedExecutor, TaskExecutor, WaitExecutor};

use crate::config::EngineConfig;
use crate::context::ExecutionContext;
use crate::error::ExecError;
use crate::jsonata::{evaluate_template, Bindings};
use crate::mock::MockEngine;
use crate::resolve::PathScope;

/// Capabilities shared by every state of a run.
#[derive(Clone)]
pub struct Runtime {
    pub mock: Arc<dyn MockEngine>,
    pub config: Arc<EngineConfig>,
    /// Step guard applied to every machine walk, nested ones included.
    pub max_steps: usize,
}

impl Runtime {
    pub fn new(mock: Arc<dyn MockEngine>, config: Arc<EngineConfig>) -> Self {
        let max_steps = config.max_steps;
        Runtime {
            mock,
            config,
            max_steps,
        }
    }
}

/// What one successful state execution produced.
#[derive(Debug, Clone, PartialEq)]
pub struct StateExecutionResult {
    pub output: Value,
    /// `None` ends the enclosing machine.
    pub next_state: Option<String>,
    /// Input after preprocessing.
    pub processed_input: Value,
    /// Variables to merge into the scope once the state has finished.
    pub assignments: Option<Map<String, Value>>,
}

impl StateExecutionResult {
    fn new(
        state: &State,
        processed_input: Value,
        post: crate::strategy::Postprocessed,
    ) -> Self {
        StateExecutionResult {
            output: post.output,
            next_state: state.next().map(str::to_owned),
            processed_input,
            assignments: post.assignments,
        }
    }
}

#[async_trait]
pub trait StateExecutor: Send + Sync {
    async fn execute(
        &self,
        state: &State,
        input: &Value,
        ctx: &mut ExecutionContext,
        rt: &Runtime,
    ) -> Result<StateExecutionResult, ExecError>;
}

static TASK: TaskExecutor = TaskExecutor;
static PASS: PassExecutor = PassExecutor;
static WAIT: WaitExecutor = WaitExecutor;
static CHOICE: ChoiceExecutor = ChoiceExecutor;
static SUCCEED: SucceedExecutor = SucceedExecutor;
static FAIL: FailExecutor = FailExecutor;
static INLINE_MAP: InlineMapExecutor = InlineMapExecutor;
static DISTRIBUTED_MAP: DistributedMapExecutor = DistributedMapExecutor;
static PARALLEL: ParallelExecutor = ParallelExecutor;

/// Executor for a state, keyed on its type and (for Map) processor mode.
pub fn executor_for(state: &State) -> &'static dyn StateExecutor {
    if state.is_task() {
        &TASK
    } else if state.is_pass() {
        &PASS
    } else if state.is_wait() {
        &WAIT
    } else if state.is_choice() {
        &CHOICE
    } else if state.is_succeed() {
        &SUCCEED
    } else if state.is_fail() {
        &FAIL
    } else if state.is_distributed_map() {
        &DISTRIBUTED_MAP
    } else if state.is_inline_map() {
        &INLINE_MAP
    } else {
        &PARALLEL
    }
}

// ──────────────────────────────────────────────
// Field helpers shared by executors
// ──────────────────────────────────────────────

/// Evaluate a field that may hold `{% %}` templates (JSONata states only),
/// with `$states.input` bound to `input`.
pub(crate) fn evaluate_field(
    value: &Value,
    state: &State,
    input: &Value,
    ctx: &ExecutionContext,
    site: &str,
) -> Result<Value, ExecError> {
    evaluate_field_with_context(value, state, input, ctx.context_object(&state.name), ctx, site)
}

pub(crate) fn evaluate_field_with_context(
    value: &Value,
    state: &State,
    input: &Value,
    context: Value,
    ctx: &ExecutionContext,
    site: &str,
) -> Result<Value, ExecError> {
    if !state.is_jsonata() {
        return Ok(value.clone());
    }
    let states = json!({"input": input, "context": context});
    let bindings = Bindings::new(&ctx.variables, states, ctx.seed_for(&state.name, site));
    evaluate_template(value, &bindings)
}

/// Resolve a JSONPath against `input`, the context object and variables.
pub(crate) fn resolve_path(
    path: &JsonPath,
    state: &State,
    input: &Value,
    ctx: &ExecutionContext,
) -> Result<Value, ExecError> {
    let context = ctx.context_object(&state.name);
    let seed = ctx.seed_for(&state.name, "path");
    PathScope {
        state: &state.name,
        input,
        context: &context,
        variables: &ctx.variables,
        seed: &seed,
    }
    .resolve(path)
}

/// A literal-or-path numeric setting such as `MaxConcurrency` /
/// `MaxConcurrencyPath`.
pub(crate) fn numeric_setting(
    literal: Option<&Value>,
    path: Option<&JsonPath>,
    field: &str,
    state: &State,
    input: &Value,
    ctx: &ExecutionContext,
) -> Result<Option<f64>, ExecError> {
    let value = match (literal, path) {
        (Some(v), _) => evaluate_field(v, state, input, ctx, field)?,
        (None, Some(p)) => resolve_path(p, state, input, ctx)?,
        (None, None) => return Ok(None),
    };
    value
        .as_f64()
        .filter(|n| *n >= 0.0)
        .map(Some)
        .ok_or_else(|| {
            ExecError::runtime(
                &state.name,
                format!("{} must be a non-negative number, got {}", field, value),
            )
        })
}
