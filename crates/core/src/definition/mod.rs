//! State machine definitions.
//!
//! A definition is parsed once from a `serde_json::Value` and is immutable
//! afterward. Parsing validates every state against the field whitelist of
//! its (type × dialect) variant, the per-type shape rules, and the
//! transition graph of each machine. Nested machines (Map processors and
//! Parallel branches) are owned by their state and validated on their own:
//! a transition may only name a state of the same machine.

pub mod choice;
pub mod fields;
pub mod map;
pub(crate) mod reader;
pub mod recovery;

use std::collections::BTreeMap;

use serde_json::Value;

use crate::error::{DefinitionError, QueryLanguage};
use crate::path::JsonPath;

pub use choice::{ChoiceBranch, ChoiceRule, ChoiceState, Comparison, ComparisonOp, Operand, Relation};
pub use fields::{StateType, StateVariant};
pub use map::{ItemBatcher, ItemReader, MapState, ParallelState, ProcessorMode};
pub use recovery::{Catcher, Retrier, STATES_ALL};

use reader::Fields;

/// Root-level machine name used in error messages.
pub const ROOT: &str = "(root)";

const MACHINE_KEYS: &[&str] = &[
    "Comment",
    "StartAt",
    "States",
    "QueryLanguage",
    "TimeoutSeconds",
    "Version",
    "ProcessorConfig",
];

#[derive(Debug, Clone, PartialEq)]
pub struct StateMachine {
    pub comment: Option<String>,
    pub start_at: String,
    pub states: BTreeMap<String, State>,
    pub query_language: QueryLanguage,
    pub timeout_seconds: Option<u64>,
}

/// An `InputPath` / `OutputPath` / `ResultPath` / `ItemsPath` setting.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum PathSetting {
    /// Field absent: behaves as `$`.
    #[default]
    Default,
    /// Explicit `null`.
    Null,
    Path(JsonPath),
}

impl PathSetting {
    pub(crate) fn from_field(
        state: &str,
        field: &str,
        obj: &Fields,
    ) -> Result<Self, DefinitionError> {
        match obj.get(field) {
            None => Ok(PathSetting::Default),
            Some(Value::Null) => Ok(PathSetting::Null),
            Some(Value::String(s)) => JsonPath::parse(s)
                .map(PathSetting::Path)
                .map_err(|e| DefinitionError::invalid(state, field, e.to_string())),
            Some(_) => Err(DefinitionError::invalid(
                state,
                field,
                "expected a path string or null",
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    Next(String),
    End,
    /// Choice, Succeed and Fail.
    None,
}

/// Input/output shaping fields. Only the ones legal for the state's variant
/// are ever populated.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct IoFields {
    pub input_path: PathSetting,
    pub parameters: Option<Value>,
    pub result_selector: Option<Value>,
    pub result_path: PathSetting,
    pub output_path: PathSetting,
    pub arguments: Option<Value>,
    pub output: Option<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TaskState {
    pub resource: String,
    pub timeout_seconds: Option<Value>,
    pub heartbeat_seconds: Option<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PassState {
    pub result: Option<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum WaitDuration {
    /// A number, or a JSONata expression string.
    Seconds(Value),
    SecondsPath(JsonPath),
    /// An RFC 3339 timestamp, or a JSONata expression string.
    Timestamp(Value),
    TimestampPath(JsonPath),
}

/// Where a Fail state's `Error` or `Cause` comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum FailSource {
    /// Literal text, or a `{% %}` expression in JSONata states.
    Text(String),
    Path(JsonPath),
}

#[derive(Debug, Clone, PartialEq)]
pub struct FailState {
    pub error: Option<FailSource>,
    pub cause: Option<FailSource>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StateKind {
    Task(TaskState),
    Pass(PassState),
    Wait(WaitDuration),
    Choice(ChoiceState),
    Succeed,
    Fail(FailState),
    Map(Box<MapState>),
    Parallel(ParallelState),
}

#[derive(Debug, Clone, PartialEq)]
pub struct State {
    pub name: String,
    pub comment: Option<String>,
    variant: StateVariant,
    pub transition: Transition,
    pub io: IoFields,
    pub assign: Option<Value>,
    pub retry: Vec<Retrier>,
    pub catch: Vec<Catcher>,
    pub kind: StateKind,
}

impl StateMachine {
    /// Parse and validate a top-level definition.
    pub fn from_value(value: &Value) -> Result<Self, DefinitionError> {
        Self::parse_machine(value, None, ROOT)
    }

    pub fn from_json_str(src: &str) -> Result<Self, DefinitionError> {
        let value: Value = serde_json::from_str(src)
            .map_err(|e| DefinitionError::Structure(format!("invalid JSON: {}", e)))?;
        Self::from_value(&value)
    }

    /// Parse a Map processor or Parallel branch owned by state `owner`.
    pub(crate) fn parse_nested(
        value: &Value,
        dialect: QueryLanguage,
        owner: &str,
    ) -> Result<Self, DefinitionError> {
        Self::parse_machine(value, Some(dialect), owner)
    }

    fn parse_machine(
        value: &Value,
        inherited: Option<QueryLanguage>,
        owner: &str,
    ) -> Result<Self, DefinitionError> {
        let obj = value
            .as_object()
            .ok_or_else(|| DefinitionError::Structure("a state machine must be an object".into()))?;
        reader::reject_unknown(owner, "StateMachine", obj, MACHINE_KEYS)?;

        let query_language = match reader::optional_str(owner, "QueryLanguage", obj)? {
            None => inherited.unwrap_or_default(),
            Some(s) => {
                let declared = QueryLanguage::parse(&s).ok_or_else(|| {
                    DefinitionError::invalid(owner, "QueryLanguage", format!("unknown query language '{}'", s))
                })?;
                if inherited == Some(QueryLanguage::JsonAta) && declared == QueryLanguage::JsonPath {
                    return Err(DefinitionError::invalid(
                        owner,
                        "QueryLanguage",
                        "a JSONata machine may not contain JSONPath states",
                    ));
                }
                declared
            }
        };

        let start_at = reader::required_str(owner, "StartAt", obj)?;
        let states_obj = obj
            .get("States")
            .ok_or_else(|| DefinitionError::missing(owner, "States"))?
            .as_object()
            .ok_or_else(|| DefinitionError::invalid(owner, "States", "expected an object"))?;
        if states_obj.is_empty() {
            return Err(DefinitionError::invalid(owner, "States", "must not be empty"));
        }

        let mut states = BTreeMap::new();
        for (name, state_value) in states_obj {
            states.insert(name.clone(), State::parse(name, state_value, query_language)?);
        }

        let timeout_seconds = reader::optional_number(owner, "TimeoutSeconds", obj)?.map(|n| n as u64);
        let machine = StateMachine {
            comment: reader::optional_str(owner, "Comment", obj)?,
            start_at,
            states,
            query_language,
            timeout_seconds,
        };
        machine.check_references(owner)?;
        Ok(machine)
    }

    fn check_references(&self, owner: &str) -> Result<(), DefinitionError> {
        if !self.states.contains_key(&self.start_at) {
            return Err(DefinitionError::UnknownStateReference {
                from: owner.to_owned(),
                target: self.start_at.clone(),
            });
        }
        for state in self.states.values() {
            for target in state.targets() {
                if !self.states.contains_key(target) {
                    return Err(DefinitionError::UnknownStateReference {
                        from: state.name.clone(),
                        target: target.to_owned(),
                    });
                }
            }
        }
        Ok(())
    }

    pub fn state(&self, name: &str) -> Option<&State> {
        self.states.get(name)
    }

    pub fn start_state(&self) -> Option<&State> {
        self.states.get(&self.start_at)
    }
}

impl State {
    fn parse(name: &str, value: &Value, machine_dialect: QueryLanguage) -> Result<Self, DefinitionError> {
        let obj = value
            .as_object()
            .ok_or_else(|| DefinitionError::Structure(format!("state '{}' must be an object", name)))?;

        let type_name = reader::required_str(name, "Type", obj)?;
        let state_type = StateType::parse(&type_name).ok_or_else(|| {
            DefinitionError::invalid(name, "Type", format!("unknown state type '{}'", type_name))
        })?;

        let dialect = match reader::optional_str(name, "QueryLanguage", obj)? {
            None => machine_dialect,
            Some(s) => QueryLanguage::parse(&s).ok_or_else(|| {
                DefinitionError::invalid(name, "QueryLanguage", format!("unknown query language '{}'", s))
            })?,
        };
        if machine_dialect == QueryLanguage::JsonAta && dialect == QueryLanguage::JsonPath {
            return Err(DefinitionError::invalid(
                name,
                "QueryLanguage",
                "a JSONata machine may not contain JSONPath states",
            ));
        }

        let variant = StateVariant::new(state_type, dialect);
        // Deterministic order so the first offending field is reported.
        let mut keys: Vec<&String> = obj.keys().collect();
        keys.sort();
        if let Some(field) = keys.into_iter().find(|k| !variant.supports(k)) {
            return Err(DefinitionError::UnsupportedField {
                state: name.to_owned(),
                state_type: state_type.as_str().to_owned(),
                field: field.clone(),
                dialect,
                suggestion: fields::suggestion(field, dialect),
            });
        }

        let transition = parse_transition(name, obj, state_type)?;
        let io = IoFields::parse(name, obj, state_type, dialect)?;

        let assign = obj.get("Assign").cloned();
        match dialect {
            QueryLanguage::JsonPath => reader::check_payload_template(name, "Assign", assign.as_ref())?,
            QueryLanguage::JsonAta => reader::check_expressions(name, "Assign", assign.as_ref())?,
        }
        if let Some(a) = &assign {
            if !a.is_object() {
                return Err(DefinitionError::invalid(name, "Assign", "expected an object"));
            }
        }

        let retry = match obj.get("Retry") {
            Some(v) => recovery::parse_retry(name, v)?,
            None => Vec::new(),
        };
        let catch = match obj.get("Catch") {
            Some(v) => recovery::parse_catch(name, v, dialect)?,
            None => Vec::new(),
        };

        let kind = match state_type {
            StateType::Task => StateKind::Task(TaskState {
                resource: reader::required_str(name, "Resource", obj)?,
                timeout_seconds: obj.get("TimeoutSeconds").cloned(),
                heartbeat_seconds: obj.get("HeartbeatSeconds").cloned(),
            }),
            StateType::Pass => StateKind::Pass(PassState {
                result: obj.get("Result").cloned(),
            }),
            StateType::Wait => StateKind::Wait(parse_wait(name, obj, dialect)?),
            StateType::Choice => StateKind::Choice(choice::parse_choice(name, obj, dialect)?),
            StateType::Succeed => StateKind::Succeed,
            StateType::Fail => StateKind::Fail(parse_fail(name, obj, dialect)?),
            StateType::Map => StateKind::Map(Box::new(map::parse_map(name, obj, dialect)?)),
            StateType::Parallel => StateKind::Parallel(map::parse_parallel(name, obj, dialect)?),
        };

        Ok(State {
            name: name.to_owned(),
            comment: reader::optional_str(name, "Comment", obj)?,
            variant,
            transition,
            io,
            assign,
            retry,
            catch,
            kind,
        })
    }

    /// Every state name this state can transition to.
    pub fn targets(&self) -> Vec<&str> {
        let mut out = Vec::new();
        if let Transition::Next(n) = &self.transition {
            out.push(n.as_str());
        }
        if let StateKind::Choice(c) = &self.kind {
            out.extend(c.choices.iter().map(|b| b.next.as_str()));
            out.extend(c.default.as_deref());
        }
        out.extend(self.catch.iter().map(|c| c.next.as_str()));
        out
    }

    pub fn next(&self) -> Option<&str> {
        match &self.transition {
            Transition::Next(n) => Some(n),
            _ => None,
        }
    }

    pub fn is_end(&self) -> bool {
        self.transition == Transition::End
    }

    pub fn variant(&self) -> StateVariant {
        self.variant
    }

    pub fn state_type(&self) -> StateType {
        self.variant.state_type()
    }

    pub fn query_language(&self) -> QueryLanguage {
        self.variant.dialect()
    }

    pub fn is_task(&self) -> bool {
        matches!(self.kind, StateKind::Task(_))
    }

    pub fn is_pass(&self) -> bool {
        matches!(self.kind, StateKind::Pass(_))
    }

    pub fn is_wait(&self) -> bool {
        matches!(self.kind, StateKind::Wait(_))
    }

    pub fn is_choice(&self) -> bool {
        matches!(self.kind, StateKind::Choice(_))
    }

    pub fn is_succeed(&self) -> bool {
        matches!(self.kind, StateKind::Succeed)
    }

    pub fn is_fail(&self) -> bool {
        matches!(self.kind, StateKind::Fail(_))
    }

    pub fn is_map(&self) -> bool {
        matches!(self.kind, StateKind::Map(_))
    }

    pub fn is_parallel(&self) -> bool {
        matches!(self.kind, StateKind::Parallel(_))
    }

    pub fn is_inline_map(&self) -> bool {
        matches!(&self.kind, StateKind::Map(m) if m.mode == ProcessorMode::Inline)
    }

    pub fn is_distributed_map(&self) -> bool {
        matches!(&self.kind, StateKind::Map(m) if m.mode == ProcessorMode::Distributed)
    }

    pub fn is_terminal(&self) -> bool {
        self.is_succeed() || self.is_fail()
    }

    pub fn is_jsonata(&self) -> bool {
        self.query_language() == QueryLanguage::JsonAta
    }

    pub fn is_jsonpath(&self) -> bool {
        self.query_language() == QueryLanguage::JsonPath
    }
}

fn parse_transition(
    name: &str,
    obj: &Fields,
    state_type: StateType,
) -> Result<Transition, DefinitionError> {
    if !state_type.has_transition() {
        return Ok(Transition::None);
    }
    let next = reader::optional_str(name, "Next", obj)?;
    let end = match obj.get("End") {
        None => false,
        Some(Value::Bool(b)) => *b,
        Some(_) => return Err(DefinitionError::invalid(name, "End", "expected a boolean")),
    };
    match (next, end) {
        (Some(_), true) => Err(DefinitionError::invalid(
            name,
            "End",
            "'Next' and 'End' are mutually exclusive",
        )),
        (Some(n), false) => Ok(Transition::Next(n)),
        (None, true) => Ok(Transition::End),
        (None, false) => Err(DefinitionError::missing(name, "Next")),
    }
}

impl IoFields {
    fn parse(
        name: &str,
        obj: &Fields,
        state_type: StateType,
        dialect: QueryLanguage,
    ) -> Result<Self, DefinitionError> {
        let mut io = IoFields {
            input_path: PathSetting::from_field(name, "InputPath", obj)?,
            output_path: PathSetting::from_field(name, "OutputPath", obj)?,
            result_path: PathSetting::from_field(name, "ResultPath", obj)?,
            result_selector: obj.get("ResultSelector").cloned(),
            arguments: obj.get("Arguments").cloned(),
            output: obj.get("Output").cloned(),
            parameters: None,
        };
        // On Map, `Parameters` is the legacy spelling of ItemSelector.
        if state_type != StateType::Map {
            io.parameters = obj.get("Parameters").cloned();
        }
        if let PathSetting::Path(p) = &io.result_path {
            if !p.is_reference() {
                return Err(DefinitionError::invalid(
                    name,
                    "ResultPath",
                    "must be a reference path",
                ));
            }
            if !matches!(p.root, crate::path::PathRoot::Input) {
                return Err(DefinitionError::invalid(
                    name,
                    "ResultPath",
                    "must be rooted at '$'",
                ));
            }
        }
        match dialect {
            QueryLanguage::JsonPath => {
                reader::check_payload_template(name, "Parameters", io.parameters.as_ref())?;
                reader::check_payload_template(name, "ResultSelector", io.result_selector.as_ref())?;
            }
            QueryLanguage::JsonAta => {
                reader::check_expressions(name, "Arguments", io.arguments.as_ref())?;
                reader::check_expressions(name, "Output", io.output.as_ref())?;
            }
        }
        Ok(io)
    }
}

fn parse_wait(name: &str, obj: &Fields, dialect: QueryLanguage) -> Result<WaitDuration, DefinitionError> {
    let present: Vec<&str> = ["Seconds", "SecondsPath", "Timestamp", "TimestampPath"]
        .into_iter()
        .filter(|f| obj.contains_key(*f))
        .collect();
    if present.len() != 1 {
        return Err(DefinitionError::invalid(
            name,
            present.first().copied().unwrap_or("Seconds"),
            "exactly one of Seconds, SecondsPath, Timestamp or TimestampPath is required",
        ));
    }
    let field = present[0];
    let value = &obj[field];
    let is_expression = |v: &Value| {
        dialect == QueryLanguage::JsonAta
            && v.as_str().is_some_and(|s| crate::jsonata::template_body(s).is_some())
    };
    match field {
        "Seconds" => {
            if is_expression(value) {
                reader::check_expressions(name, field, Some(value))?;
            } else if !value.as_f64().is_some_and(|n| n >= 0.0) {
                return Err(DefinitionError::invalid(name, field, "expected a non-negative number"));
            }
            Ok(WaitDuration::Seconds(value.clone()))
        }
        "Timestamp" => {
            if is_expression(value) {
                reader::check_expressions(name, field, Some(value))?;
            } else if !value.is_string() {
                return Err(DefinitionError::invalid(name, field, "expected an RFC 3339 timestamp"));
            }
            Ok(WaitDuration::Timestamp(value.clone()))
        }
        "SecondsPath" => reader::optional_path(name, field, obj)?
            .map(WaitDuration::SecondsPath)
            .ok_or_else(|| DefinitionError::missing(name, field)),
        _ => reader::optional_path(name, field, obj)?
            .map(WaitDuration::TimestampPath)
            .ok_or_else(|| DefinitionError::missing(name, field)),
    }
}

fn parse_fail(name: &str, obj: &Fields, dialect: QueryLanguage) -> Result<FailState, DefinitionError> {
    let source = |text_field: &str, path_field: &str| -> Result<Option<FailSource>, DefinitionError> {
        if obj.contains_key(text_field) && obj.contains_key(path_field) {
            return Err(DefinitionError::invalid(
                name,
                path_field,
                format!("'{}' and '{}' are mutually exclusive", text_field, path_field),
            ));
        }
        if let Some(text) = reader::optional_str(name, text_field, obj)? {
            if dialect == QueryLanguage::JsonAta {
                reader::check_expressions(name, text_field, obj.get(text_field))?;
            }
            return Ok(Some(FailSource::Text(text)));
        }
        Ok(reader::optional_path(name, path_field, obj)?.map(FailSource::Path))
    };
    Ok(FailState {
        error: source("Error", "ErrorPath")?,
        cause: source("Cause", "CausePath")?,
    })
}
