//! Execution telemetry returned to callers.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::ExecError;

/// One state visit.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StateExecution {
    pub state_name: String,
    pub state_type: String,
    pub input: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_state: Option<String>,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
    pub retry_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iteration_index: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MapExecution {
    pub state_name: String,
    pub mode: String,
    pub iteration_count: usize,
    pub max_concurrency: usize,
    pub iteration_paths: Vec<Vec<String>>,
    pub failed_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParallelExecution {
    pub state_name: String,
    pub branch_count: usize,
    pub branch_paths: Vec<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorInfo {
    #[serde(rename = "Error")]
    pub error: String,
    #[serde(rename = "Cause")]
    pub cause: String,
}

impl From<&ExecError> for ErrorInfo {
    fn from(err: &ExecError) -> Self {
        ErrorInfo {
            error: err.name(),
            cause: err.cause(),
        }
    }
}

/// Outcome of [`crate::StateMachineExecutor::execute`].
///
/// Failures never escape as `Err`: they are reported with `success: false`
/// alongside whatever trace was collected up to that point.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    pub success: bool,
    pub output: Value,
    pub execution_path: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_executions: Option<Vec<StateExecution>>,
    pub map_executions: Vec<MapExecution>,
    pub parallel_executions: Vec<ParallelExecution>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
    pub variables: Map<String, Value>,
}
