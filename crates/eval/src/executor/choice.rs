use async_trait::async_trait;
use serde_json::{json, Value};
use stepsim_core::{State, StateKind};
use tracing::debug;

use super::{Runtime, StateExecutionResult, StateExecutor};
use crate::choice::select_branch;
use crate::context::ExecutionContext;
use crate::error::ExecError;
use crate::jsonata::Bindings;
use crate::resolve::PathScope;
use crate::strategy::strategy_for;

/// Picks the next state: a mock override first, then the first matching
/// rule, then `Default`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChoiceExecutor;

#[async_trait]
impl StateExecutor for ChoiceExecutor {
    async fn execute(
        &self,
        state: &State,
        input: &Value,
        ctx: &mut ExecutionContext,
        rt: &Runtime,
    ) -> Result<StateExecutionResult, ExecError> {
        let StateKind::Choice(choice) = &state.kind else {
            return Err(ExecError::Configuration(format!("'{}' is not a Choice state", state.name)));
        };
        let strategy = strategy_for(state);
        let effective = strategy.preprocess(input, state, ctx)?;

        if let Some(next) = rt.mock.choice_override(&state.name, &effective).await {
            debug!(state = %state.name, next = %next, "choice overridden by mock");
            let post = strategy.postprocess(effective.clone(), input, state, ctx)?;
            return Ok(StateExecutionResult {
                output: post.output,
                next_state: Some(next),
                processed_input: effective,
                assignments: post.assignments,
            });
        }

        let branch = {
            let context = ctx.context_object(&state.name);
            let seed = ctx.seed_for(&state.name, "choice");
            let scope = PathScope {
                state: &state.name,
                input: &effective,
                context: &context,
                variables: &ctx.variables,
                seed: &seed,
            };
            let bindings = Bindings::new(
                &ctx.variables,
                json!({"input": effective, "context": context}),
                seed.clone(),
            );
            select_branch(choice, &scope, &bindings)?
        };

        let (post, next) = match (branch, &choice.default) {
            (Some(branch), _) => (
                strategy.finish(
                    effective.clone(),
                    input,
                    state,
                    branch.assign.as_ref(),
                    branch.output.as_ref(),
                    ctx,
                )?,
                branch.next.clone(),
            ),
            (None, Some(default)) => (
                strategy.postprocess(effective.clone(), input, state, ctx)?,
                default.clone(),
            ),
            (None, None) => {
                return Err(ExecError::NoChoiceMatched {
                    state: state.name.clone(),
                })
            }
        };
        debug!(state = %state.name, next = %next, "choice resolved");
        Ok(StateExecutionResult {
            output: post.output,
            next_state: Some(next),
            processed_input: effective,
            assignments: post.assignments,
        })
    }
}
