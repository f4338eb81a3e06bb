//! Runtime error taxonomy.
//!
//! Every variant maps onto one or more ASL error names used by `Retry` and
//! `Catch` matching. `Configuration` and `MaxStepsExceeded` are fatal: they
//! bypass recovery entirely.

use serde_json::{json, Value};
use stepsim_core::DefinitionError;

pub const STATES_RUNTIME: &str = "States.Runtime";
pub const STATES_TASK_FAILED: &str = "States.TaskFailed";
pub const STATES_BRANCH_FAILED: &str = "States.BranchFailed";
pub const STATES_NO_CHOICE_MATCHED: &str = "States.NoChoiceMatched";
pub const STATES_RESULT_PATH_MATCH_FAILURE: &str = "States.ResultPathMatchFailure";
pub const STATES_INTRINSIC_FAILURE: &str = "States.IntrinsicFailure";
pub const STATES_QUERY_EVALUATION_ERROR: &str = "States.QueryEvaluationError";
pub const STATES_EXCEED_TOLERATED_FAILURE: &str = "States.ExceedToleratedFailureThreshold";
/// Name used for a Fail state that declares no `Error`.
pub const STATES_FAILED: &str = "States.Failed";

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ExecError {
    /// Authoring problem detected at run time (or a definition error).
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("state '{state}': invalid path '{path}': {message}")]
    InvalidPath {
        state: String,
        path: String,
        message: String,
    },

    #[error("state '{state}': unable to apply ResultPath: {message}")]
    ResultPathMatchFailure { state: String, message: String },

    #[error("state '{state}': no choice rule matched and no Default is set")]
    NoChoiceMatched { state: String },

    /// An uncaught failure inside a Map iteration or Parallel branch.
    #[error("state '{state}': iteration {index} failed: {inner}")]
    BranchFailed {
        state: String,
        index: usize,
        inner: Box<ExecError>,
    },

    #[error("execution exceeded the maximum of {max_steps} steps")]
    MaxStepsExceeded { max_steps: usize },

    /// The mock engine had no response for a Task.
    #[error("state '{state}': no mock response configured")]
    MockResolution { state: String },

    /// The mock engine raised a typed error for a Task.
    #[error("state '{state}': task failed with {error}: {cause}")]
    TaskFailed {
        state: String,
        error: String,
        cause: String,
    },

    /// Raised by a Fail state.
    #[error("state '{state}' failed{}", describe(.error, .cause))]
    StateFailed {
        state: String,
        error: Option<String>,
        cause: Option<String>,
    },

    #[error("intrinsic {function} failed: {message}")]
    IntrinsicFailure { function: String, message: String },

    #[error("expression '{expression}' failed: {message}")]
    QueryEvaluation { expression: String, message: String },

    #[error("state '{state}': {message}")]
    Runtime { state: String, message: String },

    #[error("state '{state}': {failed} of {total} iterations failed, exceeding the tolerated threshold")]
    ToleratedFailureExceeded {
        state: String,
        failed: usize,
        total: usize,
    },
}

fn describe(error: &Option<String>, cause: &Option<String>) -> String {
    match (error, cause) {
        (None, None) => String::new(),
        (Some(e), None) => format!(" with {}", e),
        (None, Some(c)) => format!(": {}", c),
        (Some(e), Some(c)) => format!(" with {}: {}", e, c),
    }
}

impl From<DefinitionError> for ExecError {
    fn from(err: DefinitionError) -> Self {
        ExecError::Configuration(err.to_string())
    }
}

impl ExecError {
    pub fn runtime(state: &str, message: impl Into<String>) -> Self {
        ExecError::Runtime {
            state: state.to_owned(),
            message: message.into(),
        }
    }

    pub fn invalid_path(state: &str, path: impl Into<String>, message: impl Into<String>) -> Self {
        ExecError::InvalidPath {
            state: state.to_owned(),
            path: path.into(),
            message: message.into(),
        }
    }

    /// The primary ASL error name (the `Error` field of the error output).
    pub fn name(&self) -> String {
        match self {
            ExecError::Configuration(_)
            | ExecError::InvalidPath { .. }
            | ExecError::MaxStepsExceeded { .. }
            | ExecError::Runtime { .. } => STATES_RUNTIME.to_owned(),
            ExecError::ResultPathMatchFailure { .. } => STATES_RESULT_PATH_MATCH_FAILURE.to_owned(),
            ExecError::NoChoiceMatched { .. } => STATES_NO_CHOICE_MATCHED.to_owned(),
            ExecError::BranchFailed { inner, .. } => inner.name(),
            ExecError::MockResolution { .. } => STATES_TASK_FAILED.to_owned(),
            ExecError::TaskFailed { error, .. } => error.clone(),
            ExecError::StateFailed { error, .. } => {
                error.clone().unwrap_or_else(|| STATES_FAILED.to_owned())
            }
            ExecError::IntrinsicFailure { .. } => STATES_INTRINSIC_FAILURE.to_owned(),
            ExecError::QueryEvaluation { .. } => STATES_QUERY_EVALUATION_ERROR.to_owned(),
            ExecError::ToleratedFailureExceeded { .. } => STATES_EXCEED_TOLERATED_FAILURE.to_owned(),
        }
    }

    /// Every name this error answers to in `ErrorEquals`.
    pub fn error_names(&self) -> Vec<String> {
        match self {
            ExecError::TaskFailed { error, .. } if error != STATES_TASK_FAILED => {
                vec![error.clone(), STATES_TASK_FAILED.to_owned()]
            }
            ExecError::BranchFailed { inner, .. } => {
                let mut names = inner.error_names();
                names.push(STATES_BRANCH_FAILED.to_owned());
                names
            }
            other => vec![other.name()],
        }
    }

    /// The `Cause` field of the error output.
    pub fn cause(&self) -> String {
        match self {
            ExecError::TaskFailed { cause, .. } => cause.clone(),
            ExecError::StateFailed { cause, .. } => cause.clone().unwrap_or_default(),
            ExecError::BranchFailed { inner, .. } => inner.cause(),
            other => other.to_string(),
        }
    }

    /// `{"Error": ..., "Cause": ...}` as seen by Catch.
    pub fn error_output(&self) -> Value {
        json!({"Error": self.name(), "Cause": self.cause()})
    }

    /// Fatal errors are never handed to Retry or Catch.
    pub fn is_catchable(&self) -> bool {
        match self {
            ExecError::Configuration(_) | ExecError::MaxStepsExceeded { .. } => false,
            ExecError::BranchFailed { inner, .. } => inner.is_catchable(),
            _ => true,
        }
    }
}
