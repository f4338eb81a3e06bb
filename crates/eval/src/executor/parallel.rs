use async_trait::async_trait;
use futures::future::{join_all, BoxFuture, FutureExt};
use serde_json::Value;
use stepsim_core::{State, StateKind};
use tracing::debug;

use super::{Runtime, StateExecutionResult, StateExecutor};
use crate::context::ExecutionContext;
use crate::driver::run_machine;
use crate::error::ExecError;
use crate::strategy::strategy_for;
use crate::trace::ParallelExecution;

/// Runs every branch against the same input, each in its own copy of the
/// parent scope. Outputs are ordered by branch, never by completion.
#[derive(Debug, Clone, Copy, Default)]
pub struct ParallelExecutor;

#[async_trait]
impl StateExecutor for ParallelExecutor {
    async fn execute(
        &self,
        state: &State,
        input: &Value,
        ctx: &mut ExecutionContext,
        rt: &Runtime,
    ) -> Result<StateExecutionResult, ExecError> {
        let StateKind::Parallel(parallel) = &state.kind else {
            return Err(ExecError::Configuration(format!("'{}' is not a Parallel state", state.name)));
        };
        let strategy = strategy_for(state);
        let effective = strategy.preprocess(input, state, ctx)?;
        debug!(state = %state.name, branches = parallel.branches.len(), "parallel fan-out");

        let runs: Vec<BoxFuture<'_, (ExecutionContext, Result<Value, ExecError>)>> = parallel
            .branches
            .iter()
            .enumerate()
            .map(|(index, branch)| {
                let mut child = ctx.child_for_branch(&state.name, index, effective.clone());
                async move {
                    let result = run_machine(branch, &mut child, rt).await;
                    (child, result)
                }
                .boxed()
            })
            .collect();
        let finished = join_all(runs).await;

        let mut outputs = Vec::with_capacity(finished.len());
        let mut branch_paths = Vec::with_capacity(finished.len());
        let mut first_error: Option<(usize, ExecError)> = None;
        for (index, (child, result)) in finished.into_iter().enumerate() {
            branch_paths.push(child.execution_path.clone());
            ctx.absorb(child);
            match result {
                Ok(value) => outputs.push(value),
                Err(err) => {
                    // A fatal error outranks an earlier catchable one.
                    let replace = match &first_error {
                        None => true,
                        Some((_, prev)) => prev.is_catchable() && !err.is_catchable(),
                    };
                    if replace {
                        first_error = Some((index, err));
                    }
                }
            }
        }
        ctx.parallel_executions.push(ParallelExecution {
            state_name: state.name.clone(),
            branch_count: parallel.branches.len(),
            branch_paths,
        });

        if let Some((index, err)) = first_error {
            if !err.is_catchable() {
                return Err(err);
            }
            return Err(ExecError::BranchFailed {
                state: state.name.clone(),
                index,
                inner: Box::new(err),
            });
        }

        let post = strategy.postprocess(Value::Array(outputs), input, state, ctx)?;
        Ok(StateExecutionResult::new(state, effective, post))
    }
}
