//! Entry point: [`StateMachineExecutor`].

use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;
use stepsim_core::{DefinitionError, StateMachine};
use tracing::{info, warn};

use crate::config::{EngineConfig, ExecuteOptions};
use crate::context::{ExecutionContext, ExecutionMetadata};
use crate::driver::run_machine;
use crate::executor::Runtime;
use crate::mock::MockEngine;
use crate::trace::{ErrorInfo, ExecutionResult};

/// Runs a validated state machine against a mock engine.
///
/// The executor is immutable and can be reused: every call to
/// [`execute`](Self::execute) builds a fresh context from the same fixed
/// metadata, so identical inputs against a deterministic mock give identical
/// results.
#[derive(Clone)]
pub struct StateMachineExecutor {
    machine: Arc<StateMachine>,
    mock: Arc<dyn MockEngine>,
    config: Arc<EngineConfig>,
}

impl StateMachineExecutor {
    pub fn new(machine: StateMachine, mock: Arc<dyn MockEngine>) -> Self {
        StateMachineExecutor {
            machine: Arc::new(machine),
            mock,
            config: Arc::new(EngineConfig::default()),
        }
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = Arc::new(config);
        self
    }

    /// Validate `definition` and build an executor for it.
    pub fn from_definition(
        definition: &Value,
        mock: Arc<dyn MockEngine>,
    ) -> Result<Self, DefinitionError> {
        Ok(Self::new(StateMachine::from_value(definition)?, mock))
    }

    pub fn machine(&self) -> &StateMachine {
        &self.machine
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run the machine. Never fails: errors are reported in the result
    /// together with the trace collected up to that point.
    pub async fn execute(&self, input: Value, options: ExecuteOptions) -> ExecutionResult {
        let metadata = Arc::new(ExecutionMetadata::new(&self.config, input.clone()));
        let mut ctx = ExecutionContext::new(input, metadata);
        let mut rt = Runtime::new(Arc::clone(&self.mock), Arc::clone(&self.config));
        if let Some(max_steps) = options.max_steps {
            rt.max_steps = max_steps;
        }

        let started = Instant::now();
        info!(
            start_at = %self.machine.start_at,
            max_steps = rt.max_steps,
            "execution started"
        );
        let outcome = run_machine(&self.machine, &mut ctx, &rt).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        let (success, output, error) = match outcome {
            Ok(output) => {
                info!(steps = ctx.execution_path.len(), elapsed_ms, "execution succeeded");
                (true, output, None)
            }
            Err(err) => {
                warn!(
                    error = %err.name(),
                    state = %ctx.current_state,
                    elapsed_ms,
                    "execution failed: {}",
                    err
                );
                (false, Value::Null, Some(ErrorInfo::from(&err)))
            }
        };

        ExecutionResult {
            success,
            output,
            execution_path: ctx.execution_path,
            state_executions: options.verbose.then_some(ctx.state_executions),
            map_executions: ctx.map_executions,
            parallel_executions: ctx.parallel_executions,
            error,
            variables: ctx.variables,
        }
    }
}
