//! Choice rule evaluation.
//!
//! Rules are evaluated left to right with short-circuiting; the first error
//! propagates. A JSONPath comparison on a missing `Variable` raises
//! `InvalidPath` for every operator except `IsPresent`, and a type mismatch
//! between the two sides evaluates to `false`.

use serde_json::Value;
use stepsim_core::definition::{ChoiceBranch, ChoiceState, Comparison, ComparisonOp, Operand};
use stepsim_core::jsonata::template_body;
use stepsim_core::ChoiceRule;

use crate::compare;
use crate::error::ExecError;
use crate::jsonata::{self, Bindings};
use crate::numeric;
use crate::resolve::PathScope;

/// First branch of `choice` whose rule holds, in declaration order.
pub fn select_branch<'c>(
    choice: &'c ChoiceState,
    scope: &PathScope,
    bindings: &Bindings,
) -> Result<Option<&'c ChoiceBranch>, ExecError> {
    for branch in &choice.choices {
        if evaluate_rule(&branch.rule, scope, bindings)? {
            return Ok(Some(branch));
        }
    }
    Ok(None)
}

pub fn evaluate_rule(
    rule: &ChoiceRule,
    scope: &PathScope,
    bindings: &Bindings,
) -> Result<bool, ExecError> {
    match rule {
        ChoiceRule::And(rules) => {
            for r in rules {
                if !evaluate_rule(r, scope, bindings)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        ChoiceRule::Or(rules) => {
            for r in rules {
                if evaluate_rule(r, scope, bindings)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        ChoiceRule::Not(inner) => Ok(!evaluate_rule(inner, scope, bindings)?),
        ChoiceRule::Comparison(cmp) => evaluate_comparison(cmp, scope),
        ChoiceRule::Condition(condition) => evaluate_condition(condition, bindings),
    }
}

/// A JSONata `Condition`: undefined is false, otherwise truthiness.
fn evaluate_condition(condition: &Value, bindings: &Bindings) -> Result<bool, ExecError> {
    let value = match condition.as_str().and_then(template_body) {
        Some(body) => jsonata::evaluate_expression(body, bindings)?,
        None => Some(condition.clone()),
    };
    Ok(jsonata::truthy(value.as_ref()))
}

fn evaluate_comparison(cmp: &Comparison, scope: &PathScope) -> Result<bool, ExecError> {
    if cmp.op == ComparisonOp::IsPresent {
        let present = scope.select(&cmp.variable).is_some();
        return Ok(expect_flag(&cmp.operand) == Some(present));
    }
    let value = scope.resolve(&cmp.variable)?;
    let operand = match &cmp.operand {
        Operand::Literal(v) => v.clone(),
        Operand::Path(p) => scope.resolve(p)?,
    };
    Ok(compare_values(cmp.op, &value, &operand))
}

fn expect_flag(operand: &Operand) -> Option<bool> {
    match operand {
        Operand::Literal(Value::Bool(b)) => Some(*b),
        _ => None,
    }
}

/// Apply one comparison operator. Mismatched types never match.
pub fn compare_values(op: ComparisonOp, value: &Value, operand: &Value) -> bool {
    let flag = |actual: bool| operand.as_bool() == Some(actual);
    match op {
        ComparisonOp::String(rel) => match (value.as_str(), operand.as_str()) {
            (Some(a), Some(b)) => rel.holds(a.cmp(b)),
            _ => false,
        },
        ComparisonOp::StringMatches => match (value.as_str(), operand.as_str()) {
            (Some(text), Some(pattern)) => compare::wildcard_match(pattern, text),
            _ => false,
        },
        ComparisonOp::Numeric(rel) => {
            numeric::compare_numbers(value, operand).is_some_and(|ord| rel.holds(ord))
        }
        ComparisonOp::BooleanEquals => match (value.as_bool(), operand.as_bool()) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        },
        ComparisonOp::Timestamp(rel) => {
            let parse = |v: &Value| v.as_str().and_then(compare::parse_timestamp);
            match (parse(value), parse(operand)) {
                (Some(a), Some(b)) => rel.holds(a.cmp(&b)),
                _ => false,
            }
        }
        ComparisonOp::IsNull => flag(value.is_null()),
        ComparisonOp::IsNumeric => flag(value.is_number()),
        ComparisonOp::IsString => flag(value.is_string()),
        ComparisonOp::IsBoolean => flag(value.is_boolean()),
        ComparisonOp::IsTimestamp => flag(compare::is_timestamp(value)),
        // Presence is decided before the variable is resolved.
        ComparisonOp::IsPresent => flag(true),
    }
}
