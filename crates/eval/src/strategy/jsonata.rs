use serde_json::{json, Map, Value};
use stepsim_core::{Catcher, State};

use super::{into_assignments, Postprocessed, ProcessingStrategy};
use crate::context::ExecutionContext;
use crate::error::ExecError;
use crate::jsonata::{evaluate_template, evaluate_value, Bindings};

/// `Arguments` → (state logic) → `Output` / `Assign`, all evaluated with
/// the reserved `$states` object in scope.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonataStrategy;

/// Evaluate an `Assign` block field by field. Fields whose expression is
/// undefined are skipped.
fn evaluate_assign(
    state: &State,
    assign: Option<&Value>,
    bindings: &Bindings,
) -> Result<Option<Map<String, Value>>, ExecError> {
    let Some(template) = assign else {
        return Ok(None);
    };
    let value = evaluate_value(template, bindings)?.unwrap_or(Value::Null);
    into_assignments(&state.name, value).map(Some)
}

impl ProcessingStrategy for JsonataStrategy {
    fn preprocess(
        &self,
        input: &Value,
        state: &State,
        ctx: &ExecutionContext,
    ) -> Result<Value, ExecError> {
        let Some(arguments) = &state.io.arguments else {
            return Ok(input.clone());
        };
        let states = json!({
            "input": input,
            "context": ctx.context_object(&state.name),
        });
        let bindings = Bindings::new(&ctx.variables, states, ctx.seed_for(&state.name, "arguments"));
        evaluate_template(arguments, &bindings)
    }

    fn finish(
        &self,
        result: Value,
        original_input: &Value,
        state: &State,
        assign: Option<&Value>,
        output: Option<&Value>,
        ctx: &ExecutionContext,
    ) -> Result<Postprocessed, ExecError> {
        let states = json!({
            "input": original_input,
            "result": result,
            "context": ctx.context_object(&state.name),
        });
        let bindings = Bindings::new(&ctx.variables, states, ctx.seed_for(&state.name, "output"));
        let assignments = evaluate_assign(state, assign, &bindings)?;
        let output = match output {
            Some(template) => evaluate_template(template, &bindings)?,
            None => result,
        };
        Ok(Postprocessed {
            output,
            assignments,
        })
    }

    fn recover(
        &self,
        error_output: Value,
        original_input: &Value,
        state: &State,
        catcher: &Catcher,
        ctx: &ExecutionContext,
    ) -> Result<Postprocessed, ExecError> {
        let states = json!({
            "input": original_input,
            "errorOutput": error_output,
            "context": ctx.context_object(&state.name),
        });
        let bindings = Bindings::new(&ctx.variables, states, ctx.seed_for(&state.name, "catch"));
        let assignments = evaluate_assign(state, catcher.assign.as_ref(), &bindings)?;
        let output = match &catcher.output {
            Some(template) => evaluate_template(template, &bindings)?,
            None => error_output,
        };
        Ok(Postprocessed {
            output,
            assignments,
        })
    }
}
