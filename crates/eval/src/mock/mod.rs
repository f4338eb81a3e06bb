//! Mock engine abstraction: the interpreter's only I/O boundary.
//!
//! Task states, Choice overrides and distributed-Map item readers all ask a
//! [`MockEngine`] instead of calling a real service. The selection policy is
//! left to the implementation; [`ConfigMockEngine`] is a ready-made one
//! driven by a declarative configuration file.

pub mod config;

use async_trait::async_trait;
use serde_json::Value;

pub use config::{ConfigMockEngine, MockBehavior, MockCall, MockConfig, MockEntry, MockErrorSpec};

/// A simulated service error, matched by `error` in Retry/Catch rules.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{error}: {cause}")]
pub struct MockError {
    pub error: String,
    pub cause: String,
}

impl MockError {
    pub fn new(error: impl Into<String>, cause: impl Into<String>) -> Self {
        MockError {
            error: error.into(),
            cause: cause.into(),
        }
    }
}

/// Supplies responses for every external interaction of a run.
///
/// Implementations are shared across concurrent Map iterations and Parallel
/// branches, so any internal bookkeeping must be thread-safe.
#[async_trait]
pub trait MockEngine: Send + Sync {
    /// Response for a Task state. `Ok(None)` means "not configured".
    async fn get_response(&self, state: &str, input: &Value) -> Result<Option<Value>, MockError>;

    /// Forced `Next` for a Choice state, bypassing rule evaluation.
    async fn choice_override(&self, _state: &str, _input: &Value) -> Option<String> {
        None
    }

    /// Items for a distributed Map's `ItemReader`.
    async fn item_reader_data(
        &self,
        _state: &str,
        _input: &Value,
    ) -> Result<Option<Vec<Value>>, MockError> {
        Ok(None)
    }
}

/// A mock that knows nothing: every Task fails with a mock resolution error.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoMocks;

#[async_trait]
impl MockEngine for NoMocks {
    async fn get_response(&self, _state: &str, _input: &Value) -> Result<Option<Value>, MockError> {
        Ok(None)
    }
}
