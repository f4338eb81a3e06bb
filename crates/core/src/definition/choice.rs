//! Choice rules for both dialects.

use serde_json::Value;

use super::fields;
use super::reader::{self, Fields};
use crate::error::{DefinitionError, QueryLanguage};
use crate::path::JsonPath;

/// Ordering relation carried by the comparison families.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relation {
    Equals,
    LessThan,
    GreaterThan,
    LessThanEquals,
    GreaterThanEquals,
}

impl Relation {
    fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "Equals" => Relation::Equals,
            "LessThan" => Relation::LessThan,
            "GreaterThan" => Relation::GreaterThan,
            "LessThanEquals" => Relation::LessThanEquals,
            "GreaterThanEquals" => Relation::GreaterThanEquals,
            _ => return None,
        })
    }

    pub fn holds(&self, ord: std::cmp::Ordering) -> bool {
        use std::cmp::Ordering::*;
        match self {
            Relation::Equals => ord == Equal,
            Relation::LessThan => ord == Less,
            Relation::GreaterThan => ord == Greater,
            Relation::LessThanEquals => ord != Greater,
            Relation::GreaterThanEquals => ord != Less,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonOp {
    String(Relation),
    StringMatches,
    Numeric(Relation),
    BooleanEquals,
    Timestamp(Relation),
    IsNull,
    IsPresent,
    IsNumeric,
    IsString,
    IsBoolean,
    IsTimestamp,
}

impl ComparisonOp {
    /// Parse an operator key such as `NumericGreaterThanPath`. The flag is
    /// true for the `…Path` spelling.
    pub fn parse_key(key: &str) -> Option<(Self, bool)> {
        let (base, is_path) = match key.strip_suffix("Path") {
            Some(base) => (base, true),
            None => (key, false),
        };
        let op = if let Some(rel) = base.strip_prefix("String") {
            if rel == "Matches" {
                ComparisonOp::StringMatches
            } else {
                ComparisonOp::String(Relation::parse(rel)?)
            }
        } else if let Some(rel) = base.strip_prefix("Numeric") {
            ComparisonOp::Numeric(Relation::parse(rel)?)
        } else if let Some(rel) = base.strip_prefix("Timestamp") {
            ComparisonOp::Timestamp(Relation::parse(rel)?)
        } else {
            match base {
                "BooleanEquals" => ComparisonOp::BooleanEquals,
                "IsNull" => ComparisonOp::IsNull,
                "IsPresent" => ComparisonOp::IsPresent,
                "IsNumeric" => ComparisonOp::IsNumeric,
                "IsString" => ComparisonOp::IsString,
                "IsBoolean" => ComparisonOp::IsBoolean,
                "IsTimestamp" => ComparisonOp::IsTimestamp,
                _ => return None,
            }
        };
        if is_path && !op.accepts_path_operand() {
            return None;
        }
        Some((op, is_path))
    }

    fn accepts_path_operand(&self) -> bool {
        matches!(
            self,
            ComparisonOp::String(_)
                | ComparisonOp::Numeric(_)
                | ComparisonOp::BooleanEquals
                | ComparisonOp::Timestamp(_)
        )
    }

    /// Whether `literal` has the JSON type this operator compares against.
    fn accepts_literal(&self, literal: &Value) -> bool {
        match self {
            ComparisonOp::String(_) | ComparisonOp::StringMatches | ComparisonOp::Timestamp(_) => {
                literal.is_string()
            }
            ComparisonOp::Numeric(_) => literal.is_number(),
            _ => literal.is_boolean(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Literal(Value),
    Path(JsonPath),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Comparison {
    pub variable: JsonPath,
    pub op: ComparisonOp,
    pub operand: Operand,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChoiceRule {
    Comparison(Comparison),
    And(Vec<ChoiceRule>),
    Or(Vec<ChoiceRule>),
    Not(Box<ChoiceRule>),
    /// JSONata: a `{% %}` expression string or a literal boolean.
    Condition(Value),
}

/// A top-level entry of `Choices`.
#[derive(Debug, Clone, PartialEq)]
pub struct ChoiceBranch {
    pub rule: ChoiceRule,
    pub next: String,
    pub assign: Option<Value>,
    /// JSONata only.
    pub output: Option<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChoiceState {
    pub choices: Vec<ChoiceBranch>,
    pub default: Option<String>,
}

const BRANCH_KEYS: &[&str] = &["Next", "Assign", "Comment"];

pub(crate) fn parse_choice(
    state: &str,
    obj: &Fields,
    dialect: QueryLanguage,
) -> Result<ChoiceState, DefinitionError> {
    let items = obj
        .get("Choices")
        .ok_or_else(|| DefinitionError::missing(state, "Choices"))?
        .as_array()
        .ok_or_else(|| DefinitionError::invalid(state, "Choices", "expected an array"))?;
    if items.is_empty() {
        return Err(DefinitionError::invalid(state, "Choices", "must not be empty"));
    }
    let mut choices = Vec::with_capacity(items.len());
    for item in items {
        let rule_obj = reader::object(state, "Choices", item)?;
        let next = reader::required_str(state, "Next", rule_obj)?;
        let assign = rule_obj.get("Assign").cloned();
        let branch = match dialect {
            QueryLanguage::JsonPath => {
                reader::check_payload_template(state, "Assign", assign.as_ref())?;
                ChoiceBranch {
                    rule: parse_rule(state, rule_obj, BRANCH_KEYS)?,
                    next,
                    assign,
                    output: None,
                }
            }
            QueryLanguage::JsonAta => {
                let rule = parse_condition(state, rule_obj)?;
                let output = rule_obj.get("Output").cloned();
                reader::check_expressions(state, "Assign", assign.as_ref())?;
                reader::check_expressions(state, "Output", output.as_ref())?;
                ChoiceBranch {
                    rule,
                    next,
                    assign,
                    output,
                }
            }
        };
        choices.push(branch);
    }
    let default = reader::optional_str(state, "Default", obj)?;
    Ok(ChoiceState { choices, default })
}

fn unsupported(state: &str, field: &str, dialect: QueryLanguage) -> DefinitionError {
    DefinitionError::UnsupportedField {
        state: state.to_owned(),
        state_type: "Choice".to_owned(),
        field: field.to_owned(),
        dialect,
        suggestion: fields::suggestion(field, dialect),
    }
}

fn parse_condition(state: &str, obj: &Fields) -> Result<ChoiceRule, DefinitionError> {
    const ALLOWED: &[&str] = &["Condition", "Next", "Assign", "Output", "Comment"];
    if let Some(key) = obj.keys().find(|k| !ALLOWED.contains(&k.as_str())) {
        return Err(DefinitionError::invalid(
            state,
            key,
            "JSONata choice rules accept only Condition, Next, Assign and Output",
        ));
    }
    let condition = obj
        .get("Condition")
        .ok_or_else(|| DefinitionError::missing(state, "Condition"))?;
    match condition {
        Value::Bool(_) => {}
        Value::String(s) => {
            let body = crate::jsonata::template_body(s).ok_or_else(|| {
                DefinitionError::invalid(state, "Condition", "expected a {% %} expression")
            })?;
            crate::jsonata::parse(body)
                .map_err(|e| DefinitionError::invalid(state, "Condition", e.to_string()))?;
        }
        _ => {
            return Err(DefinitionError::invalid(
                state,
                "Condition",
                "expected an expression string or a boolean",
            ))
        }
    }
    Ok(ChoiceRule::Condition(condition.clone()))
}

/// Parse a JSONPath rule; `extra` lists keys owned by the enclosing branch.
fn parse_rule(state: &str, obj: &Fields, extra: &[&str]) -> Result<ChoiceRule, DefinitionError> {
    if obj.contains_key("Condition") {
        return Err(unsupported(state, "Condition", QueryLanguage::JsonPath));
    }
    let rule_keys: Vec<&String> = obj
        .keys()
        .filter(|k| !extra.contains(&k.as_str()) && k.as_str() != "Comment")
        .collect();

    for combinator in ["And", "Or", "Not"] {
        let Some(children) = obj.get(combinator) else {
            continue;
        };
        if rule_keys.len() != 1 {
            return Err(DefinitionError::invalid(
                state,
                combinator,
                "a combinator rule may not carry other operators",
            ));
        }
        if combinator == "Not" {
            let child = reader::object(state, "Not", children)?;
            return Ok(ChoiceRule::Not(Box::new(parse_rule(state, child, &[])?)));
        }
        let items = children
            .as_array()
            .ok_or_else(|| DefinitionError::invalid(state, combinator, "expected an array"))?;
        if items.is_empty() {
            return Err(DefinitionError::invalid(state, combinator, "must not be empty"));
        }
        let rules = items
            .iter()
            .map(|item| {
                let child = reader::object(state, combinator, item)?;
                parse_rule(state, child, &[])
            })
            .collect::<Result<Vec<_>, _>>()?;
        return Ok(if combinator == "And" {
            ChoiceRule::And(rules)
        } else {
            ChoiceRule::Or(rules)
        });
    }

    let variable = reader::optional_path(state, "Variable", obj)?
        .ok_or_else(|| DefinitionError::missing(state, "Variable"))?;
    let operators: Vec<&String> = rule_keys
        .into_iter()
        .filter(|k| k.as_str() != "Variable")
        .collect();
    let [key] = operators.as_slice() else {
        return Err(DefinitionError::invalid(
            state,
            "Choices",
            format!(
                "rule on '{}' must have exactly one comparison operator, found {}",
                variable,
                operators.len()
            ),
        ));
    };
    let (op, is_path) = ComparisonOp::parse_key(key).ok_or_else(|| {
        DefinitionError::invalid(state, key, "unknown comparison operator")
    })?;
    let raw = &obj[key.as_str()];
    let operand = if is_path {
        let text = raw
            .as_str()
            .ok_or_else(|| DefinitionError::invalid(state, key, "expected a path string"))?;
        Operand::Path(
            JsonPath::parse(text).map_err(|e| DefinitionError::invalid(state, key, e.to_string()))?,
        )
    } else {
        if !op.accepts_literal(raw) {
            return Err(DefinitionError::invalid(
                state,
                key,
                format!("operand {} has the wrong type", raw),
            ));
        }
        Operand::Literal(raw.clone())
    };
    Ok(ChoiceRule::Comparison(Comparison {
        variable,
        op,
        operand,
    }))
}
