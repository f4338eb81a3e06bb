//! JSONPath resolution against the three roots (`$`, `$$`, `$var`).

use serde_json::{Map, Value};
use stepsim_core::{IntrinsicCall, JsonPath, PathRoot};

use crate::error::ExecError;
use crate::intrinsics;

/// Everything a JSONPath expression can see while a state runs.
pub struct PathScope<'a> {
    pub state: &'a str,
    pub input: &'a Value,
    pub context: &'a Value,
    pub variables: &'a Map<String, Value>,
    /// Seed prefix for deterministic intrinsics (`States.UUID`, ...).
    pub seed: &'a str,
}

impl<'a> PathScope<'a> {
    /// Select the node `path` points at, if present. An unbound variable
    /// resolves to `null` rather than to "absent", so a Choice `IsPresent`
    /// test on an unbound `$var` is always true. Paths into a bound
    /// variable can still be absent.
    pub fn select(&self, path: &JsonPath) -> Option<Value> {
        match &path.root {
            PathRoot::Input => path.select(self.input),
            PathRoot::Context => path.select(self.context),
            PathRoot::Variable(name) => match self.variables.get(name) {
                Some(value) => path.select(value),
                None => Some(Value::Null),
            },
        }
    }

    /// Like [`select`](Self::select), but a missing node is an error.
    pub fn resolve(&self, path: &JsonPath) -> Result<Value, ExecError> {
        self.select(path).ok_or_else(|| {
            ExecError::invalid_path(
                self.state,
                path.as_str(),
                "the path does not match any node of its input",
            )
        })
    }

    /// Expand a payload template: keys ending in `.$` are replaced by the
    /// value of their path or intrinsic, everything else is copied.
    pub fn expand_template(&self, template: &Value) -> Result<Value, ExecError> {
        match template {
            Value::Object(map) => {
                let mut out = Map::with_capacity(map.len());
                for (key, value) in map {
                    match key.strip_suffix(".$") {
                        Some(stripped) => {
                            let expr = value.as_str().ok_or_else(|| {
                                ExecError::runtime(
                                    self.state,
                                    format!("'{}' must hold a path or intrinsic string", key),
                                )
                            })?;
                            out.insert(stripped.to_owned(), self.evaluate_reference(expr)?);
                        }
                        None => {
                            out.insert(key.clone(), self.expand_template(value)?);
                        }
                    }
                }
                Ok(Value::Object(out))
            }
            Value::Array(items) => items
                .iter()
                .map(|v| self.expand_template(v))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            other => Ok(other.clone()),
        }
    }

    /// Evaluate the string value of a `.$` key.
    pub fn evaluate_reference(&self, expr: &str) -> Result<Value, ExecError> {
        if IntrinsicCall::looks_like_call(expr) {
            let call = IntrinsicCall::parse(expr).map_err(|e| ExecError::IntrinsicFailure {
                function: expr.to_owned(),
                message: e.to_string(),
            })?;
            return intrinsics::evaluate(&call, self);
        }
        let path = JsonPath::parse(expr)
            .map_err(|e| ExecError::invalid_path(self.state, expr, e.to_string()))?;
        self.resolve(&path)
    }
}
