//! Field-access helpers shared by the definition parsers.

use serde_json::{Map, Value};

use super::fields;
use crate::error::{DefinitionError, QueryLanguage};
use crate::intrinsic::IntrinsicCall;
use crate::jsonata;
use crate::path::JsonPath;

pub(crate) type Fields = Map<String, Value>;

pub(crate) fn object<'a>(
    state: &str,
    field: &str,
    value: &'a Value,
) -> Result<&'a Fields, DefinitionError> {
    value
        .as_object()
        .ok_or_else(|| DefinitionError::invalid(state, field, "expected an object"))
}

pub(crate) fn reject_unknown(
    state: &str,
    field: &str,
    obj: &Fields,
    allowed: &[&str],
) -> Result<(), DefinitionError> {
    match obj.keys().find(|k| !allowed.contains(&k.as_str())) {
        Some(key) => Err(DefinitionError::invalid(
            state,
            field,
            format!("unknown field '{}'", key),
        )),
        None => Ok(()),
    }
}

/// Reject keys outside `allowed`, suggesting the other dialect's spelling.
pub(crate) fn reject_unknown_in_dialect(
    state: &str,
    obj: &Fields,
    allowed: &[&str],
    dialect: QueryLanguage,
) -> Result<(), DefinitionError> {
    match obj.keys().find(|k| !allowed.contains(&k.as_str())) {
        Some(key) => Err(DefinitionError::UnsupportedField {
            state: state.to_owned(),
            state_type: "Catch".to_owned(),
            field: key.clone(),
            dialect,
            suggestion: fields::suggestion(key, dialect),
        }),
        None => Ok(()),
    }
}

pub(crate) fn required_str(
    state: &str,
    field: &str,
    obj: &Fields,
) -> Result<String, DefinitionError> {
    match obj.get(field) {
        None => Err(DefinitionError::missing(state, field)),
        Some(Value::String(s)) => Ok(s.clone()),
        Some(_) => Err(DefinitionError::invalid(state, field, "expected a string")),
    }
}

pub(crate) fn optional_str(
    state: &str,
    field: &str,
    obj: &Fields,
) -> Result<Option<String>, DefinitionError> {
    match obj.get(field) {
        None => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(DefinitionError::invalid(state, field, "expected a string")),
    }
}

pub(crate) fn optional_number(
    state: &str,
    field: &str,
    obj: &Fields,
) -> Result<Option<f64>, DefinitionError> {
    match obj.get(field) {
        None => Ok(None),
        Some(v) => v
            .as_f64()
            .map(Some)
            .ok_or_else(|| DefinitionError::invalid(state, field, "expected a number")),
    }
}

pub(crate) fn optional_path(
    state: &str,
    field: &str,
    obj: &Fields,
) -> Result<Option<JsonPath>, DefinitionError> {
    match optional_str(state, field, obj)? {
        None => Ok(None),
        Some(s) => JsonPath::parse(&s)
            .map(Some)
            .map_err(|e| DefinitionError::invalid(state, field, e.to_string())),
    }
}

pub(crate) fn required_string_list(
    state: &str,
    field: &str,
    obj: &Fields,
) -> Result<Vec<String>, DefinitionError> {
    let items = obj
        .get(field)
        .ok_or_else(|| DefinitionError::missing(state, field))?
        .as_array()
        .ok_or_else(|| DefinitionError::invalid(state, field, "expected an array of strings"))?;
    items
        .iter()
        .map(|v| {
            v.as_str()
                .map(str::to_owned)
                .ok_or_else(|| DefinitionError::invalid(state, field, "expected an array of strings"))
        })
        .collect()
}

/// Every `{% %}` template inside `value` must parse.
pub(crate) fn check_expressions(
    state: &str,
    field: &str,
    value: Option<&Value>,
) -> Result<(), DefinitionError> {
    match value {
        Some(v) => jsonata::check_templates(v)
            .map_err(|e| DefinitionError::invalid(state, field, e.to_string())),
        None => Ok(()),
    }
}

/// Every `.$` key of a JSONPath payload template must hold a valid path or
/// intrinsic call.
pub(crate) fn check_payload_template(
    state: &str,
    field: &str,
    value: Option<&Value>,
) -> Result<(), DefinitionError> {
    match value {
        Some(Value::Object(map)) => {
            for (key, v) in map {
                if key.ends_with(".$") {
                    let expr = v.as_str().ok_or_else(|| {
                        DefinitionError::invalid(
                            state,
                            field,
                            format!("'{}' must hold a path or intrinsic string", key),
                        )
                    })?;
                    let parsed = if IntrinsicCall::looks_like_call(expr) {
                        IntrinsicCall::parse(expr).map(|_| ())
                    } else {
                        JsonPath::parse(expr).map(|_| ())
                    };
                    parsed.map_err(|e| DefinitionError::invalid(state, field, e.to_string()))?;
                } else {
                    check_payload_template(state, field, Some(v))?;
                }
            }
            Ok(())
        }
        Some(Value::Array(items)) => items
            .iter()
            .try_for_each(|v| check_payload_template(state, field, Some(v))),
        _ => Ok(()),
    }
}
