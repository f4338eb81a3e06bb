//! Number handling shared by Choice comparisons, intrinsics and JSONata.
//!
//! Comparisons and `States.MathAdd` use `rust_decimal::Decimal` so that
//! `0.1 + 0.2` compares equal to `0.3`. JSONata arithmetic works on `f64`
//! but normalizes integral results back to JSON integers.

use std::cmp::Ordering;
use std::str::FromStr;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde_json::{Number, Value};

/// Exact decimal view of a JSON number; `None` for non-numbers or values
/// outside the decimal range.
pub fn to_decimal(value: &Value) -> Option<Decimal> {
    let n = value.as_number()?;
    if let Some(i) = n.as_i64() {
        return Some(Decimal::from(i));
    }
    if let Some(u) = n.as_u64() {
        return Some(Decimal::from(u));
    }
    let text = n.to_string();
    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .ok()
}

/// Order two JSON numbers. Anything that is not a number (including `null`)
/// is incomparable: it is never treated as zero.
pub fn compare_numbers(a: &Value, b: &Value) -> Option<Ordering> {
    match (to_decimal(a), to_decimal(b)) {
        (Some(x), Some(y)) => Some(x.cmp(&y)),
        _ => a.as_f64()?.partial_cmp(&b.as_f64()?),
    }
}

pub fn decimal_to_value(d: Decimal) -> Value {
    let normalized = d.normalize();
    if normalized.scale() == 0 {
        if let Some(i) = normalized.to_i64() {
            return Value::from(i);
        }
    }
    normalized
        .to_f64()
        .and_then(Number::from_f64)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

/// JSON value for an `f64`; integral values become JSON integers.
/// `None` for NaN and infinities.
pub fn f64_to_value(n: f64) -> Option<Value> {
    if !n.is_finite() {
        return None;
    }
    if n.fract() == 0.0 && n.abs() < 9.0e15 {
        return Some(Value::from(n as i64));
    }
    Number::from_f64(n).map(Value::Number)
}

/// Round half to even at `precision` decimal places (JSONata `$round`).
pub fn round_half_even(n: f64, precision: i32) -> Option<f64> {
    if precision < 0 {
        let factor = 10f64.powi(-precision);
        return round_half_even(n / factor, 0).map(|r| r * factor);
    }
    let d = Decimal::from_f64_retain(n)?;
    d.round_dp_with_strategy(precision as u32, RoundingStrategy::MidpointNearestEven)
        .to_f64()
}
