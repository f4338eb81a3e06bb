//! `Retry` and `Catch` rules.

use std::time::Duration;

use serde_json::Value;

use super::reader::{self, Fields};
use super::PathSetting;
use crate::error::{DefinitionError, QueryLanguage};

/// The universal error-name wildcard.
pub const STATES_ALL: &str = "States.ALL";

#[derive(Debug, Clone, PartialEq)]
pub struct Retrier {
    pub error_equals: Vec<String>,
    pub interval_seconds: f64,
    pub max_attempts: u32,
    pub backoff_rate: f64,
    pub max_delay_seconds: Option<f64>,
    pub jitter_strategy: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Catcher {
    pub error_equals: Vec<String>,
    pub next: String,
    /// JSONPath only.
    pub result_path: PathSetting,
    /// JSONata only.
    pub output: Option<Value>,
    pub assign: Option<Value>,
}

fn matches_any(error_equals: &[String], names: &[String]) -> bool {
    error_equals
        .iter()
        .any(|e| e == STATES_ALL || names.iter().any(|n| n == e))
}

impl Retrier {
    pub fn matches(&self, names: &[String]) -> bool {
        matches_any(&self.error_equals, names)
    }

    /// Nominal delay before retry number `attempt` (zero-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(i32::MAX as u32) as i32;
        let mut secs = self.interval_seconds * self.backoff_rate.powi(exponent);
        if let Some(max) = self.max_delay_seconds {
            secs = secs.min(max);
        }
        // Long backoff chains overflow `Duration`; saturate instead.
        Duration::try_from_secs_f64(secs.max(0.0)).unwrap_or(Duration::MAX)
    }
}

impl Catcher {
    pub fn matches(&self, names: &[String]) -> bool {
        matches_any(&self.error_equals, names)
    }
}

const RETRIER_FIELDS: &[&str] = &[
    "ErrorEquals",
    "IntervalSeconds",
    "MaxAttempts",
    "BackoffRate",
    "MaxDelaySeconds",
    "JitterStrategy",
];

const CATCHER_JSONPATH_FIELDS: &[&str] = &["ErrorEquals", "Next", "ResultPath", "Assign"];
const CATCHER_JSONATA_FIELDS: &[&str] = &["ErrorEquals", "Next", "Output", "Assign"];

fn parse_error_equals(
    state: &str,
    field: &str,
    obj: &Fields,
) -> Result<Vec<String>, DefinitionError> {
    let names = reader::required_string_list(state, "ErrorEquals", obj)?;
    if names.is_empty() {
        return Err(DefinitionError::invalid(
            state,
            field,
            "ErrorEquals must not be empty",
        ));
    }
    if names.iter().any(|n| n == STATES_ALL) && names.len() > 1 {
        return Err(DefinitionError::invalid(
            state,
            field,
            "States.ALL must appear alone in ErrorEquals",
        ));
    }
    Ok(names)
}

/// `States.ALL` may only be used by the last rule of a list.
fn check_wildcard_last(
    state: &str,
    field: &str,
    rules: &[Vec<String>],
) -> Result<(), DefinitionError> {
    let last = rules.len().saturating_sub(1);
    for (i, names) in rules.iter().enumerate() {
        if i != last && names.iter().any(|n| n == STATES_ALL) {
            return Err(DefinitionError::invalid(
                state,
                field,
                "States.ALL must appear in the last rule",
            ));
        }
    }
    Ok(())
}

pub(crate) fn parse_retry(state: &str, value: &Value) -> Result<Vec<Retrier>, DefinitionError> {
    let items = value
        .as_array()
        .ok_or_else(|| DefinitionError::invalid(state, "Retry", "expected an array"))?;
    let mut retriers = Vec::with_capacity(items.len());
    for item in items {
        let obj = reader::object(state, "Retry", item)?;
        reader::reject_unknown(state, "Retry", obj, RETRIER_FIELDS)?;
        let error_equals = parse_error_equals(state, "Retry", obj)?;

        let interval_seconds = reader::optional_number(state, "IntervalSeconds", obj)?.unwrap_or(1.0);
        if interval_seconds < 1.0 {
            return Err(DefinitionError::invalid(state, "IntervalSeconds", "must be at least 1"));
        }
        let max_attempts = match reader::optional_number(state, "MaxAttempts", obj)? {
            Some(n) if n < 0.0 || n.fract() != 0.0 => {
                return Err(DefinitionError::invalid(
                    state,
                    "MaxAttempts",
                    "must be a non-negative integer",
                ))
            }
            Some(n) => n as u32,
            None => 3,
        };
        let backoff_rate = reader::optional_number(state, "BackoffRate", obj)?.unwrap_or(2.0);
        if backoff_rate < 1.0 {
            return Err(DefinitionError::invalid(state, "BackoffRate", "must be at least 1.0"));
        }
        let max_delay_seconds = reader::optional_number(state, "MaxDelaySeconds", obj)?;
        let jitter_strategy = reader::optional_str(state, "JitterStrategy", obj)?;
        if let Some(j) = &jitter_strategy {
            if j != "FULL" && j != "NONE" {
                return Err(DefinitionError::invalid(
                    state,
                    "JitterStrategy",
                    format!("unknown strategy '{}'", j),
                ));
            }
        }

        retriers.push(Retrier {
            error_equals,
            interval_seconds,
            max_attempts,
            backoff_rate,
            max_delay_seconds,
            jitter_strategy,
        });
    }
    let names: Vec<Vec<String>> = retriers.iter().map(|r| r.error_equals.clone()).collect();
    check_wildcard_last(state, "Retry", &names)?;
    Ok(retriers)
}

pub(crate) fn parse_catch(
    state: &str,
    value: &Value,
    dialect: QueryLanguage,
) -> Result<Vec<Catcher>, DefinitionError> {
    let items = value
        .as_array()
        .ok_or_else(|| DefinitionError::invalid(state, "Catch", "expected an array"))?;
    let allowed = match dialect {
        QueryLanguage::JsonPath => CATCHER_JSONPATH_FIELDS,
        QueryLanguage::JsonAta => CATCHER_JSONATA_FIELDS,
    };
    let mut catchers = Vec::with_capacity(items.len());
    for item in items {
        let obj = reader::object(state, "Catch", item)?;
        reader::reject_unknown_in_dialect(state, obj, allowed, dialect)?;
        let error_equals = parse_error_equals(state, "Catch", obj)?;
        let next = reader::required_str(state, "Next", obj)?;
        let result_path = PathSetting::from_field(state, "ResultPath", obj)?;
        if let PathSetting::Path(p) = &result_path {
            if !p.is_reference() {
                return Err(DefinitionError::invalid(
                    state,
                    "ResultPath",
                    "must be a reference path",
                ));
            }
        }
        let output = obj.get("Output").cloned();
        let assign = obj.get("Assign").cloned();
        if dialect == QueryLanguage::JsonAta {
            reader::check_expressions(state, "Output", output.as_ref())?;
            reader::check_expressions(state, "Assign", assign.as_ref())?;
        } else {
            reader::check_payload_template(state, "Assign", assign.as_ref())?;
        }
        catchers.push(Catcher {
            error_equals,
            next,
            result_path,
            output,
            assign,
        });
    }
    let names: Vec<Vec<String>> = catchers.iter().map(|c| c.error_equals.clone()).collect();
    check_wildcard_last(state, "Catch", &names)?;
    Ok(catchers)
}
