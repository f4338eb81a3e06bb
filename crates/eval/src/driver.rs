//! Machine walk and the Retry/Catch layer.
//!
//! [`run_machine`] walks one machine (top-level, a Map processor or a
//! Parallel branch) from `StartAt` until a state ends it. Loops in the
//! definition are legal; the step guard is the only thing that stops them.
//! [`run_state`] wraps a single executor call with Retry and Catch.

use futures::future::{BoxFuture, FutureExt};
use serde_json::Value;
use stepsim_core::{State, StateMachine};
use tracing::{debug, warn};

use crate::context::ExecutionContext;
use crate::error::ExecError;
use crate::executor::{executor_for, Runtime};
use crate::strategy::strategy_for;
use crate::trace::{ErrorInfo, StateExecution};

/// Where the walk goes after a state.
#[derive(Debug, Clone, PartialEq)]
pub struct StateOutcome {
    pub output: Value,
    pub next_state: Option<String>,
}

// ──────────────────────────────────────────────
// Machine walk
// ──────────────────────────────────────────────

/// Run `machine` from its start state with `ctx.input` as input. Returns
/// the output of the last state.
pub fn run_machine<'a>(
    machine: &'a StateMachine,
    ctx: &'a mut ExecutionContext,
    rt: &'a Runtime,
) -> BoxFuture<'a, Result<Value, ExecError>> {
    async move {
        let mut current = machine.start_at.clone();
        let mut steps = 0usize;
        loop {
            steps += 1;
            if steps > rt.max_steps {
                return Err(ExecError::MaxStepsExceeded {
                    max_steps: rt.max_steps,
                });
            }
            let state = machine.state(&current).ok_or_else(|| {
                ExecError::Configuration(format!("state '{}' does not exist", current))
            })?;
            ctx.execution_path.push(current.clone());
            debug!(state = %current, lineage = %ctx.lineage, step = steps, "entering state");

            let outcome = run_state(state, ctx, rt).await?;
            ctx.input = outcome.output;
            match outcome.next_state {
                Some(next) => current = next,
                None => return Ok(ctx.input.clone()),
            }
        }
    }
    .boxed()
}

// ──────────────────────────────────────────────
// Retry / Catch
// ──────────────────────────────────────────────

fn record(
    ctx: &mut ExecutionContext,
    state: &State,
    input: &Value,
    output: Option<Value>,
    next_state: Option<String>,
    error: Option<&ExecError>,
) {
    let execution = StateExecution {
        state_name: state.name.clone(),
        state_type: state.state_type().as_str().to_owned(),
        input: input.clone(),
        output,
        next_state,
        success: error.is_none(),
        error: error.map(ErrorInfo::from),
        retry_count: ctx.retry_count,
        parent_state: None,
        iteration_index: None,
    };
    ctx.record(execution);
}

/// Execute one state with Retry then Catch. Fatal errors skip both.
pub async fn run_state(
    state: &State,
    ctx: &mut ExecutionContext,
    rt: &Runtime,
) -> Result<StateOutcome, ExecError> {
    let input = ctx.input.clone();
    ctx.current_state = state.name.clone();
    ctx.retry_count = 0;
    let executor = executor_for(state);
    let mut attempts = vec![0u32; state.retry.len()];

    loop {
        let err = match executor.execute(state, &input, ctx, rt).await {
            Ok(result) => {
                if let Some(assignments) = result.assignments {
                    ctx.apply_assignments(assignments);
                }
                record(
                    ctx,
                    state,
                    &input,
                    Some(result.output.clone()),
                    result.next_state.clone(),
                    None,
                );
                return Ok(StateOutcome {
                    output: result.output,
                    next_state: result.next_state,
                });
            }
            Err(err) => err,
        };

        if !err.is_catchable() {
            record(ctx, state, &input, None, None, Some(&err));
            return Err(err);
        }
        let names = err.error_names();

        // Only the first matching retrier counts; once it is spent the
        // error falls through to Catch.
        if let Some(index) = state.retry.iter().position(|r| r.matches(&names)) {
            let retrier = &state.retry[index];
            if attempts[index] < retrier.max_attempts {
                let nominal = retrier.delay(attempts[index]);
                let delay = nominal.min(rt.config.max_retry_delay());
                attempts[index] += 1;
                ctx.retry_count += 1;
                warn!(
                    state = %state.name,
                    error = %err.name(),
                    attempt = attempts[index],
                    max_attempts = retrier.max_attempts,
                    ?nominal,
                    "retrying state"
                );
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                continue;
            }
        }

        let Some(catcher) = state.catch.iter().find(|c| c.matches(&names)) else {
            record(ctx, state, &input, None, None, Some(&err));
            return Err(err);
        };
        warn!(state = %state.name, error = %err.name(), next = %catcher.next, "error caught");
        let post = strategy_for(state).recover(err.error_output(), &input, state, catcher, ctx)?;
        if let Some(assignments) = post.assignments {
            ctx.apply_assignments(assignments);
        }
        record(
            ctx,
            state,
            &input,
            Some(post.output.clone()),
            Some(catcher.next.clone()),
            Some(&err),
        );
        return Ok(StateOutcome {
            output: post.output,
            next_state: Some(catcher.next.clone()),
        });
    }
}
