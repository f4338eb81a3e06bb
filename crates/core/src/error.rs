use std::fmt;

/// The two ASL addressing dialects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum QueryLanguage {
    #[default]
    JsonPath,
    JsonAta,
}

impl QueryLanguage {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "JSONPath" => Some(QueryLanguage::JsonPath),
            "JSONata" => Some(QueryLanguage::JsonAta),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            QueryLanguage::JsonPath => "JSONPath",
            QueryLanguage::JsonAta => "JSONata",
        }
    }
}

impl fmt::Display for QueryLanguage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A load-time error in a state machine definition.
///
/// These are authoring errors: they are raised before any state runs and are
/// never eligible for Retry or Catch.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DefinitionError {
    /// A field that the state's (type, dialect) variant does not accept.
    #[error("state '{state}': field '{field}' is not supported in {dialect} {state_type} states{}", suggestion_suffix(.suggestion))]
    UnsupportedField {
        state: String,
        state_type: String,
        field: String,
        dialect: QueryLanguage,
        suggestion: Option<String>,
    },

    /// A required field is absent.
    #[error("state '{state}': missing required field '{field}'")]
    MissingField { state: String, field: String },

    /// A field is present but its value is malformed.
    #[error("state '{state}': invalid field '{field}': {message}")]
    InvalidField {
        state: String,
        field: String,
        message: String,
    },

    /// A transition names a state that does not exist in the same machine.
    #[error("state '{from}' references unknown state '{target}'")]
    UnknownStateReference { from: String, target: String },

    /// The document itself is not a state machine.
    #[error("invalid state machine: {0}")]
    Structure(String),
}

fn suggestion_suffix(suggestion: &Option<String>) -> String {
    match suggestion {
        Some(s) => format!(" (use {} instead)", s),
        None => String::new(),
    }
}

impl DefinitionError {
    pub fn invalid(state: &str, field: &str, message: impl Into<String>) -> Self {
        DefinitionError::InvalidField {
            state: state.to_owned(),
            field: field.to_owned(),
            message: message.into(),
        }
    }

    pub fn missing(state: &str, field: &str) -> Self {
        DefinitionError::MissingField {
            state: state.to_owned(),
            field: field.to_owned(),
        }
    }
}

/// A syntax error inside a path, intrinsic call, or JSONata expression.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind} syntax error at offset {offset} in '{source_text}': {message}")]
pub struct SyntaxError {
    pub kind: &'static str,
    pub source_text: String,
    pub offset: usize,
    pub message: String,
}

impl SyntaxError {
    pub fn new(
        kind: &'static str,
        source_text: &str,
        offset: usize,
        message: impl Into<String>,
    ) -> Self {
        SyntaxError {
            kind,
            source_text: source_text.to_owned(),
            offset,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_field_message_carries_suggestion() {
        let err = DefinitionError::UnsupportedField {
            state: "Charge".to_string(),
            state_type: "Task".to_string(),
            field: "Parameters".to_string(),
            dialect: QueryLanguage::JsonAta,
            suggestion: Some("Arguments".to_string()),
        };
        assert_eq!(
            err.to_string(),
            "state 'Charge': field 'Parameters' is not supported in JSONata Task states (use Arguments instead)"
        );
    }

    #[test]
    fn query_language_round_trips_names() {
        assert_eq!(QueryLanguage::parse("JSONata"), Some(QueryLanguage::JsonAta));
        assert_eq!(QueryLanguage::parse("JSONPath"), Some(QueryLanguage::JsonPath));
        assert_eq!(QueryLanguage::parse("jsonpath"), None);
        assert_eq!(QueryLanguage::JsonAta.to_string(), "JSONata");
    }
}
