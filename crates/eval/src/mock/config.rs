//! Configuration-driven mock engine.
//!
//! ```json
//! {
//!   "version": "1.0",
//!   "mocks": [
//!     {"state": "GetUser", "type": "fixed", "response": {"id": 7}},
//!     {"state": "Charge", "type": "error", "error": {"type": "Payment.Declined", "cause": "expired"}},
//!     {"state": "Route", "type": "fixed", "response": {"Next": "Manual"}},
//!     {"state": "Load", "type": "itemReader", "data": [1, 2, 3]}
//!   ]
//! }
//! ```

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::{MockEngine, MockError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct MockConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default)]
    pub mocks: Vec<MockEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MockEntry {
    pub state: String,
    #[serde(flatten)]
    pub behavior: MockBehavior,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum MockBehavior {
    Fixed {
        response: Value,
        #[serde(default, rename = "delayMs", skip_serializing_if = "Option::is_none")]
        delay_ms: Option<u64>,
    },
    Conditional {
        conditions: Vec<MockCondition>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        default: Option<Value>,
    },
    /// The n-th call gets the n-th response; the last one repeats.
    Stateful { responses: Vec<MockResponse> },
    Error { error: MockErrorSpec },
    ItemReader { data: Vec<Value> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MockCondition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub when: Option<MockWhen>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<MockErrorSpec>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MockWhen {
    /// Partial match: every field given here must equal the input's.
    pub input: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MockResponse {
    Error { error: MockErrorSpec },
    Value(Value),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MockErrorSpec {
    #[serde(rename = "type")]
    pub error_type: String,
    #[serde(default)]
    pub cause: String,
}

impl From<&MockErrorSpec> for MockError {
    fn from(spec: &MockErrorSpec) -> Self {
        MockError::new(spec.error_type.clone(), spec.cause.clone())
    }
}

/// One recorded call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MockCall {
    pub state: String,
    pub input: Value,
    pub call_index: usize,
}

#[derive(Debug, Default)]
struct CallLog {
    counts: HashMap<String, usize>,
    history: Vec<MockCall>,
}

#[derive(Debug, Default)]
pub struct ConfigMockEngine {
    entries: HashMap<String, MockBehavior>,
    log: Mutex<CallLog>,
}

/// `expected` is a subset of `actual`: objects match field by field,
/// everything else by equality.
pub fn partial_match(expected: &Value, actual: &Value) -> bool {
    match (expected, actual) {
        (Value::Object(exp), Value::Object(act)) => exp
            .iter()
            .all(|(k, v)| act.get(k).is_some_and(|a| partial_match(v, a))),
        _ => expected == actual,
    }
}

impl ConfigMockEngine {
    pub fn new(config: MockConfig) -> Self {
        let entries = config
            .mocks
            .into_iter()
            .map(|entry| (entry.state, entry.behavior))
            .collect();
        ConfigMockEngine {
            entries,
            log: Mutex::new(CallLog::default()),
        }
    }

    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        Ok(Self::new(serde_json::from_value(value)?))
    }

    /// The counters stay consistent even if a holder panicked, so a
    /// poisoned lock is taken over rather than dropped.
    fn calls(&self) -> MutexGuard<'_, CallLog> {
        self.log.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of calls made for `state` so far.
    pub fn call_count(&self, state: &str) -> usize {
        self.calls().counts.get(state).copied().unwrap_or(0)
    }

    pub fn history(&self) -> Vec<MockCall> {
        self.calls().history.clone()
    }

    pub fn reset(&self) {
        *self.calls() = CallLog::default();
    }

    /// Bump the call counter and return the zero-based index of this call.
    fn record_call(&self, state: &str, input: &Value) -> usize {
        let mut log = self.calls();
        let count = log.counts.entry(state.to_owned()).or_insert(0);
        let index = *count;
        *count += 1;
        log.history.push(MockCall {
            state: state.to_owned(),
            input: input.clone(),
            call_index: index,
        });
        index
    }

    fn resolve(
        &self,
        behavior: &MockBehavior,
        input: &Value,
        call_index: usize,
    ) -> Result<Option<Value>, MockError> {
        match behavior {
            MockBehavior::Fixed { response, .. } => Ok(Some(response.clone())),
            MockBehavior::Conditional {
                conditions,
                default,
            } => {
                for condition in conditions {
                    let matched = condition
                        .when
                        .as_ref()
                        .map_or(true, |w| partial_match(&w.input, input));
                    if !matched {
                        continue;
                    }
                    if let Some(err) = &condition.error {
                        return Err(err.into());
                    }
                    return Ok(condition.response.clone());
                }
                Ok(default.clone())
            }
            MockBehavior::Stateful { responses } => {
                let Some(last) = responses.len().checked_sub(1) else {
                    return Ok(None);
                };
                match &responses[call_index.min(last)] {
                    MockResponse::Error { error } => Err(error.into()),
                    MockResponse::Value(v) => Ok(Some(v.clone())),
                }
            }
            MockBehavior::Error { error } => Err(error.into()),
            MockBehavior::ItemReader { .. } => Ok(None),
        }
    }
}

#[async_trait]
impl MockEngine for ConfigMockEngine {
    async fn get_response(&self, state: &str, input: &Value) -> Result<Option<Value>, MockError> {
        let Some(behavior) = self.entries.get(state) else {
            debug!(state, "no mock configured");
            return Ok(None);
        };
        let call_index = self.record_call(state, input);
        if let MockBehavior::Fixed {
            delay_ms: Some(ms), ..
        } = behavior
        {
            tokio::time::sleep(Duration::from_millis(*ms)).await;
        }
        self.resolve(behavior, input, call_index)
    }

    async fn choice_override(&self, state: &str, input: &Value) -> Option<String> {
        let behavior = self.entries.get(state)?;
        let call_index = self.record_call(state, input);
        let response = self.resolve(behavior, input, call_index).ok()??;
        response.get("Next")?.as_str().map(str::to_owned)
    }

    async fn item_reader_data(
        &self,
        state: &str,
        input: &Value,
    ) -> Result<Option<Vec<Value>>, MockError> {
        let Some(behavior) = self.entries.get(state) else {
            return Ok(None);
        };
        let call_index = self.record_call(state, input);
        match behavior {
            MockBehavior::ItemReader { data } => Ok(Some(data.clone())),
            other => match self.resolve(other, input, call_index)? {
                Some(Value::Array(items)) => Ok(Some(items)),
                _ => Ok(None),
            },
        }
    }
}
