//! Task, Pass, Wait, Succeed and Fail.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use stepsim_core::definition::{FailSource, WaitDuration};
use stepsim_core::{State, StateKind};
use tracing::debug;

use super::{evaluate_field, resolve_path, Runtime, StateExecutionResult, StateExecutor};
use crate::compare::parse_timestamp;
use crate::context::ExecutionContext;
use crate::error::ExecError;
use crate::strategy::strategy_for;

/// Delegates to the mock engine; no real service is ever called.
#[derive(Debug, Clone, Copy, Default)]
pub struct TaskExecutor;

#[async_trait]
impl StateExecutor for TaskExecutor {
    async fn execute(
        &self,
        state: &State,
        input: &Value,
        ctx: &mut ExecutionContext,
        rt: &Runtime,
    ) -> Result<StateExecutionResult, ExecError> {
        let strategy = strategy_for(state);
        let effective = strategy.preprocess(input, state, ctx)?;
        let response = rt
            .mock
            .get_response(&state.name, &effective)
            .await
            .map_err(|e| ExecError::TaskFailed {
                state: state.name.clone(),
                error: e.error,
                cause: e.cause,
            })?;
        let Some(result) = response else {
            return Err(ExecError::MockResolution {
                state: state.name.clone(),
            });
        };
        let post = strategy.postprocess(result, input, state, ctx)?;
        Ok(StateExecutionResult::new(state, effective, post))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PassExecutor;

#[async_trait]
impl StateExecutor for PassExecutor {
    async fn execute(
        &self,
        state: &State,
        input: &Value,
        ctx: &mut ExecutionContext,
        _rt: &Runtime,
    ) -> Result<StateExecutionResult, ExecError> {
        let strategy = strategy_for(state);
        let effective = strategy.preprocess(input, state, ctx)?;
        let result = match &state.kind {
            StateKind::Pass(pass) => pass.result.clone(),
            _ => None,
        }
        .unwrap_or_else(|| effective.clone());
        let post = strategy.postprocess(result, input, state, ctx)?;
        Ok(StateExecutionResult::new(state, effective, post))
    }
}

/// Sleeps for the requested duration, clamped to `EngineConfig::max_wait`.
#[derive(Debug, Clone, Copy, Default)]
pub struct WaitExecutor;

impl WaitExecutor {
    fn requested(
        &self,
        state: &State,
        wait: &WaitDuration,
        input: &Value,
        ctx: &ExecutionContext,
    ) -> Result<Duration, ExecError> {
        let seconds = |v: &Value| {
            v.as_f64()
                .filter(|n| *n >= 0.0 && n.is_finite())
                // Clamped to `max_wait` later, so oversized values saturate.
                .map(|n| Duration::try_from_secs_f64(n).unwrap_or(Duration::MAX))
                .ok_or_else(|| {
                    ExecError::runtime(&state.name, format!("invalid wait duration {}", v))
                })
        };
        let until = |v: &Value| {
            let target = v.as_str().and_then(parse_timestamp).ok_or_else(|| {
                ExecError::runtime(&state.name, format!("invalid wait timestamp {}", v))
            })?;
            let start = parse_timestamp(&ctx.metadata.start_time).ok_or_else(|| {
                ExecError::Configuration(format!(
                    "start time '{}' is not an RFC 3339 timestamp",
                    ctx.metadata.start_time
                ))
            })?;
            let delta = (target - start).as_seconds_f64().max(0.0);
            Ok::<_, ExecError>(Duration::try_from_secs_f64(delta).unwrap_or(Duration::MAX))
        };
        match wait {
            WaitDuration::Seconds(v) => seconds(&evaluate_field(v, state, input, ctx, "seconds")?),
            WaitDuration::SecondsPath(p) => seconds(&resolve_path(p, state, input, ctx)?),
            WaitDuration::Timestamp(v) => until(&evaluate_field(v, state, input, ctx, "timestamp")?),
            WaitDuration::TimestampPath(p) => until(&resolve_path(p, state, input, ctx)?),
        }
    }
}

#[async_trait]
impl StateExecutor for WaitExecutor {
    async fn execute(
        &self,
        state: &State,
        input: &Value,
        ctx: &mut ExecutionContext,
        rt: &Runtime,
    ) -> Result<StateExecutionResult, ExecError> {
        let strategy = strategy_for(state);
        let effective = strategy.preprocess(input, state, ctx)?;
        let StateKind::Wait(wait) = &state.kind else {
            return Err(ExecError::Configuration(format!("'{}' is not a Wait state", state.name)));
        };
        let requested = self.requested(state, wait, &effective, ctx)?;
        let slept = requested.min(rt.config.max_wait());
        debug!(state = %state.name, ?requested, ?slept, "wait");
        if !slept.is_zero() {
            tokio::time::sleep(slept).await;
        }
        let post = strategy.postprocess(effective.clone(), input, state, ctx)?;
        Ok(StateExecutionResult::new(state, effective, post))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SucceedExecutor;

#[async_trait]
impl StateExecutor for SucceedExecutor {
    async fn execute(
        &self,
        state: &State,
        input: &Value,
        ctx: &mut ExecutionContext,
        _rt: &Runtime,
    ) -> Result<StateExecutionResult, ExecError> {
        let strategy = strategy_for(state);
        let effective = strategy.preprocess(input, state, ctx)?;
        let post = strategy.postprocess(effective.clone(), input, state, ctx)?;
        Ok(StateExecutionResult {
            output: post.output,
            next_state: None,
            processed_input: effective,
            assignments: post.assignments,
        })
    }
}

/// Always raises [`ExecError::StateFailed`].
#[derive(Debug, Clone, Copy, Default)]
pub struct FailExecutor;

impl FailExecutor {
    fn text(
        &self,
        source: Option<&FailSource>,
        state: &State,
        input: &Value,
        ctx: &ExecutionContext,
        site: &str,
    ) -> Result<Option<String>, ExecError> {
        let value = match source {
            None => return Ok(None),
            Some(FailSource::Text(s)) => {
                evaluate_field(&Value::String(s.clone()), state, input, ctx, site)?
            }
            Some(FailSource::Path(p)) => resolve_path(p, state, input, ctx)?,
        };
        match value {
            Value::String(s) => Ok(Some(s)),
            Value::Null => Ok(None),
            other => Err(ExecError::runtime(
                &state.name,
                format!("{} must resolve to a string, got {}", site, other),
            )),
        }
    }
}

#[async_trait]
impl StateExecutor for FailExecutor {
    async fn execute(
        &self,
        state: &State,
        input: &Value,
        ctx: &mut ExecutionContext,
        _rt: &Runtime,
    ) -> Result<StateExecutionResult, ExecError> {
        let StateKind::Fail(fail) = &state.kind else {
            return Err(ExecError::Configuration(format!("'{}' is not a Fail state", state.name)));
        };
        let error = self.text(fail.error.as_ref(), state, input, ctx, "Error")?;
        let cause = self.text(fail.cause.as_ref(), state, input, ctx, "Cause")?;
        Err(ExecError::StateFailed {
            state: state.name.clone(),
            error,
            cause,
        })
    }
}
