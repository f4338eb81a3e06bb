//! stepsim evaluator -- runs validated state machines locally against
//! mocked service responses.
//!
//! The evaluator takes a [`StateMachine`] from `stepsim-core`, walks it
//! from `StartAt` with a step guard, shapes every state's input and output
//! through the JSONPath or JSONata strategy, and asks a [`MockEngine`]
//! wherever a real workflow would call out. Map and Parallel states fan out
//! concurrently and reassemble results by index.

pub mod choice;
pub mod compare;
pub mod config;
pub mod context;
pub mod driver;
pub mod engine;
pub mod entropy;
pub mod error;
pub mod executor;
pub mod intrinsics;
pub mod jsonata;
pub mod mock;
pub mod numeric;
pub mod resolve;
pub mod strategy;
pub mod trace;

pub use config::{EngineConfig, ExecuteOptions};
pub use context::{ExecutionContext, ExecutionMetadata, Scope};
pub use engine::StateMachineExecutor;
pub use error::ExecError;
pub use executor::{executor_for, Runtime, StateExecutionResult, StateExecutor};
pub use mock::{ConfigMockEngine, MockConfig, MockEngine, MockError, NoMocks};
pub use strategy::{strategy_for, JsonPathStrategy, JsonataStrategy, Postprocessed, ProcessingStrategy};
pub use trace::{ErrorInfo, ExecutionResult, MapExecution, ParallelExecution, StateExecution};

pub use stepsim_core::{DefinitionError, StateMachine};

/// Validate `definition` and run it once with default settings.
///
/// Convenience wrapper around [`StateMachineExecutor`] for callers that
/// don't need to reuse the executor.
pub async fn execute(
    definition: &serde_json::Value,
    input: serde_json::Value,
    mock: std::sync::Arc<dyn MockEngine>,
    options: ExecuteOptions,
) -> Result<ExecutionResult, DefinitionError> {
    let executor = StateMachineExecutor::from_definition(definition, mock)?;
    Ok(executor.execute(input, options).await)
}
