use serde_json::{Map, Value};
use stepsim_core::{Catcher, PathSetting, State};

use super::{into_assignments, Postprocessed, ProcessingStrategy};
use crate::context::ExecutionContext;
use crate::error::ExecError;
use crate::resolve::PathScope;

/// `InputPath` → `Parameters` → (state logic) → `ResultSelector` →
/// `ResultPath` → `OutputPath`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonPathStrategy;

struct Env {
    context: Value,
    seed: String,
}

impl Env {
    fn new(state: &State, ctx: &ExecutionContext, site: &str) -> Self {
        Env {
            context: ctx.context_object(&state.name),
            seed: ctx.seed_for(&state.name, site),
        }
    }

    fn scope<'a>(&'a self, state: &'a State, input: &'a Value, ctx: &'a ExecutionContext) -> PathScope<'a> {
        PathScope {
            state: &state.name,
            input,
            context: &self.context,
            variables: &ctx.variables,
            seed: &self.seed,
        }
    }
}

/// Apply an `InputPath`/`OutputPath` style filter.
fn filter(setting: &PathSetting, value: Value, scope: &PathScope) -> Result<Value, ExecError> {
    match setting {
        PathSetting::Default => Ok(value),
        PathSetting::Null => Ok(Value::Object(Map::new())),
        PathSetting::Path(p) => scope.resolve(p),
    }
}

/// Merge `result` into a copy of `original` as directed by `ResultPath`.
pub fn merge_result(
    state: &str,
    setting: &PathSetting,
    original: &Value,
    result: Value,
) -> Result<Value, ExecError> {
    match setting {
        PathSetting::Default => Ok(result),
        PathSetting::Null => Ok(original.clone()),
        PathSetting::Path(p) if p.segments.is_empty() => Ok(result),
        PathSetting::Path(p) => {
            let mut merged = original.clone();
            p.assign(&mut merged, result)
                .map_err(|message| ExecError::ResultPathMatchFailure {
                    state: state.to_owned(),
                    message,
                })?;
            Ok(merged)
        }
    }
}

impl ProcessingStrategy for JsonPathStrategy {
    fn preprocess(
        &self,
        input: &Value,
        state: &State,
        ctx: &ExecutionContext,
    ) -> Result<Value, ExecError> {
        let env = Env::new(state, ctx, "parameters");
        let effective = filter(&state.io.input_path, input.clone(), &env.scope(state, input, ctx))?;
        match &state.io.parameters {
            Some(template) => env.scope(state, &effective, ctx).expand_template(template),
            None => Ok(effective),
        }
    }

    fn finish(
        &self,
        result: Value,
        original_input: &Value,
        state: &State,
        assign: Option<&Value>,
        _output: Option<&Value>,
        ctx: &ExecutionContext,
    ) -> Result<Postprocessed, ExecError> {
        let env = Env::new(state, ctx, "result");
        let selected = match &state.io.result_selector {
            Some(template) => env.scope(state, &result, ctx).expand_template(template)?,
            None => result,
        };
        let assignments = match assign {
            Some(template) => {
                let value = env.scope(state, &selected, ctx).expand_template(template)?;
                Some(into_assignments(&state.name, value)?)
            }
            None => None,
        };
        let merged = merge_result(&state.name, &state.io.result_path, original_input, selected)?;
        let output = filter(&state.io.output_path, merged.clone(), &env.scope(state, &merged, ctx))?;
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
        let env = Env::new(state, ctx, "catch");
        let assignments = match &catcher.assign {
            Some(template) => {
                let value = env.scope(state, &error_output, ctx).expand_template(template)?;
                Some(into_assignments(&state.name, value)?)
            }
            None => None,
        };
        let output = merge_result(&state.name, &catcher.result_path, original_input, error_output)?;
        Ok(Postprocessed {
            output,
            assignments,
        })
    }
}
