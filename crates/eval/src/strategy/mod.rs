//! Input/output shaping, one strategy per query language.
//!
//! Every executor runs `preprocess` on the raw state input, does its own
//! work, then hands the raw result to `postprocess`. Catch recovery goes
//! through `recover`. Assignments are computed against the variables as they
//! were before the state ran; the caller merges them afterward.

mod jsonata;
mod jsonpath;

use serde_json::{Map, Value};
use stepsim_core::{Catcher, State};

pub use self::jsonata::JsonataStrategy;
pub use self::jsonpath::JsonPathStrategy;

use crate::context::ExecutionContext;
use crate::error::ExecError;

/// Shaped state output plus the variable assignments to apply.
#[derive(Debug, Clone, PartialEq)]
pub struct Postprocessed {
    pub output: Value,
    pub assignments: Option<Map<String, Value>>,
}

pub trait ProcessingStrategy: Send + Sync {
    /// Effective input handed to the state's own logic.
    fn preprocess(
        &self,
        input: &Value,
        state: &State,
        ctx: &ExecutionContext,
    ) -> Result<Value, ExecError>;

    /// Shape a raw result using the state's own `Assign` and `Output`.
    fn postprocess(
        &self,
        result: Value,
        original_input: &Value,
        state: &State,
        ctx: &ExecutionContext,
    ) -> Result<Postprocessed, ExecError> {
        self.finish(
            result,
            original_input,
            state,
            state.assign.as_ref(),
            state.io.output.as_ref(),
            ctx,
        )
    }

    /// Like [`postprocess`](Self::postprocess) with explicit `Assign` and
    /// `Output` templates (a matched Choice rule carries its own).
    fn finish(
        &self,
        result: Value,
        original_input: &Value,
        state: &State,
        assign: Option<&Value>,
        output: Option<&Value>,
        ctx: &ExecutionContext,
    ) -> Result<Postprocessed, ExecError>;

    /// Output and assignments after `catcher` caught an error.
    fn recover(
        &self,
        error_output: Value,
        original_input: &Value,
        state: &State,
        catcher: &Catcher,
        ctx: &ExecutionContext,
    ) -> Result<Postprocessed, ExecError>;
}

static JSONPATH: JsonPathStrategy = JsonPathStrategy;
static JSONATA: JsonataStrategy = JsonataStrategy;

pub fn strategy_for(state: &State) -> &'static dyn ProcessingStrategy {
    if state.is_jsonata() {
        &JSONATA
    } else {
        &JSONPATH
    }
}

/// `Assign` must produce an object; anything else is a runtime error.
fn into_assignments(state: &str, value: Value) -> Result<Map<String, Value>, ExecError> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(ExecError::runtime(
            state,
            format!("Assign must evaluate to an object, got {}", other),
        )),
    }
}
