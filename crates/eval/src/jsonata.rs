//! Evaluator for the JSONata subset used by `{% ... %}` templates.
//!
//! "Undefined" (no value) is modelled as `None` and is distinct from JSON
//! `null`. Path steps map over arrays and flatten their results; a result
//! sequence of one item collapses to that item.

use std::cmp::Ordering;
use std::collections::HashMap;

use rand::Rng;
use serde_json::{Map, Value};
use stepsim_core::jsonata::{self as syntax, BinaryOp, Expr};

use crate::entropy;
use crate::error::ExecError;
use crate::intrinsics::hash_hex;
use crate::numeric::{self, f64_to_value, round_half_even};

const MAX_RANGE_ITEMS: usize = 10_000_000;

/// Names visible to an expression besides its own block-local bindings.
pub struct Bindings<'a> {
    pub variables: &'a Map<String, Value>,
    /// The reserved `$states` object (`input`, `context`, `result`, ...).
    pub states: Value,
    /// Seed prefix for `$uuid` and `$random`.
    pub seed: String,
}

impl<'a> Bindings<'a> {
    pub fn new(variables: &'a Map<String, Value>, states: Value, seed: impl Into<String>) -> Self {
        Bindings {
            variables,
            states,
            seed: seed.into(),
        }
    }

    fn input(&self) -> Value {
        self.states.get("input").cloned().unwrap_or(Value::Null)
    }
}

/// Evaluate a bare expression (no `{% %}` delimiters). The context value
/// `$` is `$states.input`.
pub fn evaluate_expression(src: &str, bindings: &Bindings) -> Result<Option<Value>, ExecError> {
    let expr = syntax::parse(src).map_err(|e| ExecError::QueryEvaluation {
        expression: src.to_owned(),
        message: e.to_string(),
    })?;
    let root = bindings.input();
    let mut evaluator = Evaluator {
        bindings,
        source: src,
        frames: Vec::new(),
        root: &root,
        draws: 0,
    };
    evaluator.eval(&expr, &root)
}

/// Evaluate a JSON value whose strings may be `{% %}` templates. Undefined
/// object fields and array items are dropped.
pub fn evaluate_value(template: &Value, bindings: &Bindings) -> Result<Option<Value>, ExecError> {
    match template {
        Value::String(s) => match syntax::template_body(s) {
            Some(body) => evaluate_expression(body, bindings),
            None => Ok(Some(template.clone())),
        },
        Value::Object(map) => {
            let mut out = Map::with_capacity(map.len());
            for (key, value) in map {
                if let Some(v) = evaluate_value(value, bindings)? {
                    out.insert(key.clone(), v);
                }
            }
            Ok(Some(Value::Object(out)))
        }
        Value::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                if let Some(v) = evaluate_value(item, bindings)? {
                    out.push(v);
                }
            }
            Ok(Some(Value::Array(out)))
        }
        other => Ok(Some(other.clone())),
    }
}

/// Like [`evaluate_value`], but a top-level undefined becomes `null`.
pub fn evaluate_template(template: &Value, bindings: &Bindings) -> Result<Value, ExecError> {
    Ok(evaluate_value(template, bindings)?.unwrap_or(Value::Null))
}

/// JSONata boolean casting.
pub fn truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(items)) => items.iter().any(|v| truthy(Some(v))),
        Some(Value::Object(map)) => !map.is_empty(),
    }
}

struct Evaluator<'a> {
    bindings: &'a Bindings<'a>,
    source: &'a str,
    /// Block-local `$x := ...` bindings, innermost last.
    frames: Vec<HashMap<String, Value>>,
    root: &'a Value,
    /// Counter so repeated `$uuid()` / `$random()` calls differ.
    draws: usize,
}

type Eval = Result<Option<Value>, ExecError>;

fn number(n: f64) -> Option<Value> {
    f64_to_value(n)
}

/// Collapse a result sequence: empty is undefined, one item is itself.
fn collapse(mut seq: Vec<Value>) -> Option<Value> {
    match seq.len() {
        0 => None,
        1 => seq.pop(),
        _ => Some(Value::Array(seq)),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// `$string` rendering: strings as-is, integral numbers without a fraction.
fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => match n.as_f64().and_then(f64_to_value) {
            Some(v) => v.to_string(),
            None => n.to_string(),
        },
        other => other.to_string(),
    }
}

fn deep_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(_), Value::Number(_)) => {
            numeric::compare_numbers(a, b) == Some(Ordering::Equal)
        }
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(p, q)| deep_equal(p, q))
        }
        (Value::Object(x), Value::Object(y)) => {
            x.len() == y.len()
                && x.iter().all(|(k, v)| y.get(k).is_some_and(|w| deep_equal(v, w)))
        }
        _ => a == b,
    }
}

impl<'a> Evaluator<'a> {
    fn fail(&self, message: impl Into<String>) -> ExecError {
        ExecError::QueryEvaluation {
            expression: self.source.to_owned(),
            message: message.into(),
        }
    }

    fn lookup(&self, name: &str, ctx: &Value) -> Option<Value> {
        match name {
            "" => return Some(ctx.clone()),
            "$" => return Some(self.root.clone()),
            _ => {}
        }
        for frame in self.frames.iter().rev() {
            if let Some(v) = frame.get(name) {
                return Some(v.clone());
            }
        }
        if name == "states" {
            return Some(self.bindings.states.clone());
        }
        self.bindings.variables.get(name).cloned()
    }

    fn eval(&mut self, expr: &Expr, ctx: &Value) -> Eval {
        match expr {
            Expr::Null => Ok(Some(Value::Null)),
            Expr::Bool(b) => Ok(Some(Value::Bool(*b))),
            Expr::Number(n) => Ok(number(*n)),
            Expr::Str(s) => Ok(Some(Value::String(s.clone()))),
            Expr::Variable(name) => Ok(self.lookup(name, ctx)),
            Expr::Field(name) => Ok(field(ctx, name)),
            Expr::Wildcard => Ok(wildcard(ctx)),
            Expr::Path(steps) => self.eval_path(steps, ctx),
            Expr::Filter(base, predicate) => {
                let Some(value) = self.eval(base, ctx)? else {
                    return Ok(None);
                };
                self.filter(value, predicate)
            }
            Expr::Negate(inner) => match self.eval(inner, ctx)? {
                None => Ok(None),
                Some(v) => {
                    let n = v
                        .as_f64()
                        .ok_or_else(|| self.fail("cannot negate a non-number"))?;
                    Ok(number(-n))
                }
            },
            Expr::Binary(op, left, right) => self.binary(*op, left, right, ctx),
            Expr::Condition(cond, then, otherwise) => {
                let c = self.eval(cond, ctx)?;
                if truthy(c.as_ref()) {
                    self.eval(then, ctx)
                } else if let Some(e) = otherwise {
                    self.eval(e, ctx)
                } else {
                    Ok(None)
                }
            }
            Expr::Array(items) => {
                let mut out = Vec::new();
                for item in items {
                    match item {
                        Expr::Range(start, end) => out.extend(self.range(start, end, ctx)?),
                        Expr::Array(_) => {
                            if let Some(v) = self.eval(item, ctx)? {
                                out.push(v);
                            }
                        }
                        other => match self.eval(other, ctx)? {
                            Some(Value::Array(vs)) => out.extend(vs),
                            Some(v) => out.push(v),
                            None => {}
                        },
                    }
                }
                Ok(Some(Value::Array(out)))
            }
            Expr::Range(start, end) => Ok(Some(Value::Array(self.range(start, end, ctx)?))),
            Expr::Object(fields) => {
                let mut out = Map::new();
                for (k, v) in fields {
                    let key = match self.eval(k, ctx)? {
                        Some(Value::String(s)) => s,
                        _ => return Err(self.fail("object keys must be strings")),
                    };
                    if let Some(value) = self.eval(v, ctx)? {
                        out.insert(key, value);
                    }
                }
                Ok(Some(Value::Object(out)))
            }
            Expr::Call(name, args) => {
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(self.eval(arg, ctx)?);
                }
                self.call(name, values)
            }
            Expr::Block(exprs) => {
                self.frames.push(HashMap::new());
                let mut last = Ok(None);
                for e in exprs {
                    last = self.eval(e, ctx);
                    if last.is_err() {
                        break;
                    }
                }
                self.frames.pop();
                last
            }
            Expr::Bind(name, value) => {
                let v = self.eval(value, ctx)?;
                if self.frames.is_empty() {
                    self.frames.push(HashMap::new());
                }
                if let (Some(frame), Some(val)) = (self.frames.last_mut(), v.clone()) {
                    frame.insert(name.clone(), val);
                }
                Ok(v)
            }
        }
    }

    fn eval_path(&mut self, steps: &[Expr], ctx: &Value) -> Eval {
        let Some((first, rest)) = steps.split_first() else {
            return Ok(None);
        };
        let Some(mut current) = self.eval(first, ctx)? else {
            return Ok(None);
        };
        for step in rest {
            let inputs = match current {
                Value::Array(items) => items,
                // A single input keeps the step's value as is, arrays included.
                other => match self.eval(step, &other)? {
                    Some(v) => {
                        current = v;
                        continue;
                    }
                    None => return Ok(None),
                },
            };
            let mut out = Vec::new();
            for item in &inputs {
                match self.eval(step, item)? {
                    Some(Value::Array(vs)) if !matches!(step, Expr::Array(_)) => out.extend(vs),
                    Some(v) => out.push(v),
                    None => {}
                }
            }
            match collapse(out) {
                Some(v) => current = v,
                None => return Ok(None),
            }
        }
        Ok(Some(current))
    }

    fn filter(&mut self, value: Value, predicate: &Expr) -> Eval {
        let items = match value {
            Value::Array(items) => items,
            other => vec![other],
        };
        let len = items.len() as i64;
        let mut out = Vec::new();
        for (i, item) in items.into_iter().enumerate() {
            let keep = match self.eval(predicate, &item)? {
                Some(Value::Number(n)) => {
                    let idx = n.as_f64().map(f64::floor).unwrap_or(0.0) as i64;
                    let idx = if idx < 0 { idx + len } else { idx };
                    idx == i as i64
                }
                other => truthy(other.as_ref()),
            };
            if keep {
                out.push(item);
            }
        }
        Ok(collapse(out))
    }

    fn range(&mut self, start: &Expr, end: &Expr, ctx: &Value) -> Result<Vec<Value>, ExecError> {
        let (Some(s), Some(e)) = (self.eval(start, ctx)?, self.eval(end, ctx)?) else {
            return Ok(Vec::new());
        };
        let (Some(s), Some(e)) = (s.as_i64(), e.as_i64()) else {
            return Err(self.fail("range bounds must be integers"));
        };
        if e < s {
            return Ok(Vec::new());
        }
        match e.checked_sub(s) {
            Some(span) if (span as u64) < MAX_RANGE_ITEMS as u64 => {}
            _ => return Err(self.fail("range is too large")),
        }
        Ok((s..=e).map(Value::from).collect())
    }

    fn binary(&mut self, op: BinaryOp, left: &Expr, right: &Expr, ctx: &Value) -> Eval {
        match op {
            BinaryOp::And => {
                let l = self.eval(left, ctx)?;
                if !truthy(l.as_ref()) {
                    return Ok(Some(Value::Bool(false)));
                }
                let r = self.eval(right, ctx)?;
                return Ok(Some(Value::Bool(truthy(r.as_ref()))));
            }
            BinaryOp::Or => {
                let l = self.eval(left, ctx)?;
                if truthy(l.as_ref()) {
                    return Ok(Some(Value::Bool(true)));
                }
                let r = self.eval(right, ctx)?;
                return Ok(Some(Value::Bool(truthy(r.as_ref()))));
            }
            _ => {}
        }
        let l = self.eval(left, ctx)?;
        let r = self.eval(right, ctx)?;
        match op {
            BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => {
                let (Some(l), Some(r)) = (l, r) else {
                    return Ok(None);
                };
                let (Some(a), Some(b)) = (l.as_f64(), r.as_f64()) else {
                    return Err(self.fail(format!(
                        "operator '{}' needs numbers, got {} and {}",
                        op.symbol(),
                        type_name(&l),
                        type_name(&r)
                    )));
                };
                let n = match op {
                    BinaryOp::Add => a + b,
                    BinaryOp::Sub => a - b,
                    BinaryOp::Mul => a * b,
                    BinaryOp::Div => a / b,
                    _ => a % b,
                };
                number(n)
                    .map(Some)
                    .ok_or_else(|| self.fail("arithmetic result is not a finite number"))
            }
            BinaryOp::Concat => {
                let s = |v: Option<Value>| v.as_ref().map(stringify).unwrap_or_default();
                Ok(Some(Value::String(s(l) + &s(r))))
            }
            BinaryOp::Eq | BinaryOp::Ne => {
                let (Some(l), Some(r)) = (l, r) else {
                    return Ok(Some(Value::Bool(false)));
                };
                let eq = deep_equal(&l, &r);
                Ok(Some(Value::Bool(if op == BinaryOp::Eq { eq } else { !eq })))
            }
            BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
                let (Some(l), Some(r)) = (l, r) else {
                    return Ok(Some(Value::Bool(false)));
                };
                let ord = match (&l, &r) {
                    (Value::Number(_), Value::Number(_)) => numeric::compare_numbers(&l, &r),
                    (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
                    _ => None,
                }
                .ok_or_else(|| {
                    self.fail(format!(
                        "cannot compare {} with {}",
                        type_name(&l),
                        type_name(&r)
                    ))
                })?;
                let holds = match op {
                    BinaryOp::Lt => ord == Ordering::Less,
                    BinaryOp::Le => ord != Ordering::Greater,
                    BinaryOp::Gt => ord == Ordering::Greater,
                    _ => ord != Ordering::Less,
                };
                Ok(Some(Value::Bool(holds)))
            }
            BinaryOp::In => {
                let (Some(l), Some(r)) = (l, r) else {
                    return Ok(Some(Value::Bool(false)));
                };
                let found = match &r {
                    Value::Array(items) => items.iter().any(|v| deep_equal(&l, v)),
                    other => deep_equal(&l, other),
                };
                Ok(Some(Value::Bool(found)))
            }
            BinaryOp::And | BinaryOp::Or => Ok(None),
        }
    }

    fn next_seed(&mut self, site: &str) -> String {
        self.draws += 1;
        format!("{}|{}|{}", self.bindings.seed, site, self.draws)
    }

    fn call(&mut self, name: &str, args: Vec<Option<Value>>) -> Eval {
        let f = Call {
            name,
            args: &args,
            eval: self,
        };
        match name {
            "count" => Ok(Some(Value::from(match f.arg(0) {
                None => 0,
                Some(Value::Array(items)) => items.len(),
                Some(_) => 1,
            }))),
            "sum" => {
                let total = f.numbers(0)?.iter().sum::<f64>();
                Ok(number(total))
            }
            "max" => Ok(f
                .numbers(0)?
                .into_iter()
                .reduce(f64::max)
                .and_then(number)),
            "min" => Ok(f
                .numbers(0)?
                .into_iter()
                .reduce(f64::min)
                .and_then(number)),
            "average" => {
                let ns = f.numbers(0)?;
                if ns.is_empty() {
                    return Ok(None);
                }
                Ok(number(ns.iter().sum::<f64>() / ns.len() as f64))
            }
            "string" => Ok(f.arg(0).map(|v| Value::String(stringify(v)))),
            "number" => match f.arg(0) {
                None => Ok(None),
                Some(Value::Number(n)) => Ok(Some(Value::Number(n.clone()))),
                Some(Value::Bool(b)) => Ok(Some(Value::from(u8::from(*b)))),
                Some(Value::String(s)) => s
                    .trim()
                    .parse::<f64>()
                    .ok()
                    .and_then(number)
                    .map(Some)
                    .ok_or_else(|| f.fail(format!("cannot convert '{}' to a number", s))),
                Some(other) => Err(f.fail(format!("cannot convert {} to a number", type_name(other)))),
            },
            "boolean" => Ok(f.arg(0).map(|v| Value::Bool(truthy(Some(v))))),
            "not" => Ok(f.arg(0).map(|v| Value::Bool(!truthy(Some(v))))),
            "exists" => Ok(Some(Value::Bool(f.arg(0).is_some()))),
            "length" => Ok(f.opt_string(0)?.map(|s| Value::from(s.chars().count()))),
            "uppercase" => Ok(f.opt_string(0)?.map(|s| Value::String(s.to_uppercase()))),
            "lowercase" => Ok(f.opt_string(0)?.map(|s| Value::String(s.to_lowercase()))),
            "substring" => {
                let Some(s) = f.opt_string(0)? else {
                    return Ok(None);
                };
                let chars: Vec<char> = s.chars().collect();
                let len = chars.len() as i64;
                let start = f.integer(1)?;
                let start = if start < 0 { (len + start).max(0) } else { start.min(len) };
                let end = match f.arg(2) {
                    Some(_) => start.saturating_add(f.integer(2)?.max(0)).min(len),
                    None => len,
                };
                Ok(Some(Value::String(
                    chars[start as usize..end as usize].iter().collect(),
                )))
            }
            "contains" => {
                let Some(s) = f.opt_string(0)? else {
                    return Ok(None);
                };
                let pattern = f.string(1)?;
                Ok(Some(Value::Bool(s.contains(pattern))))
            }
            "join" => {
                let sep = match f.arg(1) {
                    Some(_) => f.string(1)?.to_owned(),
                    None => String::new(),
                };
                let parts = match f.arg(0) {
                    None => return Ok(None),
                    Some(Value::Array(items)) => items.clone(),
                    Some(other) => vec![other.clone()],
                };
                let strings = parts
                    .iter()
                    .map(|v| {
                        v.as_str()
                            .map(str::to_owned)
                            .ok_or_else(|| f.fail("$join expects an array of strings"))
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Some(Value::String(strings.join(&sep))))
            }
            "split" => {
                let Some(s) = f.opt_string(0)? else {
                    return Ok(None);
                };
                let sep = f.string(1)?;
                let mut parts: Vec<Value> = if sep.is_empty() {
                    s.chars().map(|c| Value::String(c.to_string())).collect()
                } else {
                    s.split(sep).map(|p| Value::String(p.to_owned())).collect()
                };
                if f.arg(2).is_some() {
                    let limit = usize::try_from(f.integer(2)?).unwrap_or(0);
                    parts.truncate(limit);
                }
                Ok(Some(Value::Array(parts)))
            }
            "keys" => {
                let mut keys: Vec<String> = Vec::new();
                let objects = match f.arg(0) {
                    None => return Ok(None),
                    Some(Value::Array(items)) => items.clone(),
                    Some(other) => vec![other.clone()],
                };
                for obj in objects.iter().filter_map(Value::as_object) {
                    for k in obj.keys() {
                        if !keys.contains(k) {
                            keys.push(k.clone());
                        }
                    }
                }
                Ok(collapse(keys.into_iter().map(Value::String).collect()))
            }
            "append" => {
                let as_vec = |v: Option<&Value>| match v {
                    None => Vec::new(),
                    Some(Value::Array(items)) => items.clone(),
                    Some(other) => vec![other.clone()],
                };
                match (f.arg(0), f.arg(1)) {
                    (None, None) => Ok(None),
                    (a, None) => Ok(a.cloned()),
                    (None, b) => Ok(b.cloned()),
                    (a, b) => {
                        let mut out = as_vec(a);
                        out.extend(as_vec(b));
                        Ok(Some(Value::Array(out)))
                    }
                }
            }
            "merge" => {
                let objects = match f.arg(0) {
                    None => return Ok(None),
                    Some(Value::Array(items)) => items.clone(),
                    Some(other) => vec![other.clone()],
                };
                let mut out = Map::new();
                for obj in &objects {
                    let obj = obj
                        .as_object()
                        .ok_or_else(|| f.fail("$merge expects an array of objects"))?;
                    for (k, v) in obj {
                        out.insert(k.clone(), v.clone());
                    }
                }
                Ok(Some(Value::Object(out)))
            }
            "abs" => f.unary_math(f64::abs),
            "floor" => f.unary_math(f64::floor),
            "ceil" => f.unary_math(f64::ceil),
            "round" => {
                let Some(n) = f.opt_number(0)? else {
                    return Ok(None);
                };
                let precision = match f.arg(1) {
                    Some(_) => f.integer(1)? as i32,
                    None => 0,
                };
                Ok(round_half_even(n, precision).and_then(number))
            }
            "type" => Ok(f.arg(0).map(|v| Value::String(type_name(v).to_owned()))),
            "partition" => {
                let items = f.array(0)?;
                let size = usize::try_from(f.integer(1)?)
                    .ok()
                    .filter(|n| *n > 0)
                    .ok_or_else(|| f.fail("$partition size must be a positive integer"))?;
                Ok(Some(Value::Array(
                    items.chunks(size).map(|c| Value::Array(c.to_vec())).collect(),
                )))
            }
            "range" => {
                let start = f.integer(0)?;
                let end = f.integer(1)?;
                let step = match f.arg(2) {
                    Some(_) => f.integer(2)?,
                    None => 1,
                };
                if step == 0 {
                    return Err(f.fail("$range step must not be zero"));
                }
                let mut out = Vec::new();
                let mut current = start;
                while (step > 0 && current <= end) || (step < 0 && current >= end) {
                    if out.len() >= MAX_RANGE_ITEMS {
                        return Err(f.fail("range is too large"));
                    }
                    out.push(Value::from(current));
                    match current.checked_add(step) {
                        Some(next) => current = next,
                        None => break,
                    }
                }
                Ok(Some(Value::Array(out)))
            }
            "hash" => {
                let data = match f.arg(0) {
                    None => return Ok(None),
                    Some(Value::String(s)) => s.clone(),
                    Some(other) => other.to_string(),
                };
                let algorithm = match f.arg(1) {
                    Some(_) => f.string(1)?.to_owned(),
                    None => "SHA-256".to_owned(),
                };
                hash_hex(&algorithm, data.as_bytes())
                    .map(|h| Some(Value::String(h)))
                    .ok_or_else(|| f.fail(format!("unsupported hash algorithm '{}'", algorithm)))
            }
            "parse" => {
                let Some(s) = f.opt_string(0)? else {
                    return Ok(None);
                };
                serde_json::from_str(s)
                    .map(Some)
                    .map_err(|e| f.fail(format!("invalid JSON: {}", e)))
            }
            "random" => {
                let explicit = f.arg(0).map(Value::to_string);
                let seed = match explicit {
                    Some(s) => s,
                    None => self.next_seed("random"),
                };
                let mut rng = entropy::rng_from_seed(&seed);
                Ok(number(rng.gen::<f64>()))
            }
            "uuid" => {
                let seed = self.next_seed("uuid");
                Ok(Some(Value::String(entropy::uuid(&seed))))
            }
            other => Err(self.fail(format!("unknown function ${}", other))),
        }
    }
}

fn field(value: &Value, name: &str) -> Option<Value> {
    match value {
        Value::Object(map) => map.get(name).cloned(),
        Value::Array(items) => {
            let mut out = Vec::new();
            for item in items {
                match field(item, name) {
                    Some(Value::Array(vs)) => out.extend(vs),
                    Some(v) => out.push(v),
                    None => {}
                }
            }
            collapse(out)
        }
        _ => None,
    }
}

fn wildcard(value: &Value) -> Option<Value> {
    let mut out = Vec::new();
    match value {
        Value::Object(map) => {
            for v in map.values() {
                match v {
                    Value::Array(vs) => out.extend(vs.iter().cloned()),
                    other => out.push(other.clone()),
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                if let Some(v) = wildcard(item) {
                    match v {
                        Value::Array(vs) => out.extend(vs),
                        other => out.push(other),
                    }
                }
            }
        }
        _ => {}
    }
    collapse(out)
}

/// Arguments of one function call, with typed accessors.
struct Call<'c, 'a> {
    name: &'c str,
    args: &'c [Option<Value>],
    eval: &'c Evaluator<'a>,
}

impl Call<'_, '_> {
    fn fail(&self, message: impl Into<String>) -> ExecError {
        self.eval.fail(format!("${}: {}", self.name, message.into()))
    }

    fn arg(&self, i: usize) -> Option<&Value> {
        self.args.get(i).and_then(Option::as_ref)
    }

    fn string(&self, i: usize) -> Result<&str, ExecError> {
        self.arg(i)
            .and_then(Value::as_str)
            .ok_or_else(|| self.fail(format!("argument {} must be a string", i + 1)))
    }

    fn opt_string(&self, i: usize) -> Result<Option<&str>, ExecError> {
        match self.arg(i) {
            None => Ok(None),
            Some(_) => self.string(i).map(Some),
        }
    }

    fn opt_number(&self, i: usize) -> Result<Option<f64>, ExecError> {
        match self.arg(i) {
            None => Ok(None),
            Some(v) => v
                .as_f64()
                .map(Some)
                .ok_or_else(|| self.fail(format!("argument {} must be a number", i + 1))),
        }
    }

    fn integer(&self, i: usize) -> Result<i64, ExecError> {
        self.arg(i)
            .and_then(|v| v.as_i64().or_else(|| v.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)))
            .ok_or_else(|| self.fail(format!("argument {} must be an integer", i + 1)))
    }

    fn array(&self, i: usize) -> Result<Vec<Value>, ExecError> {
        match self.arg(i) {
            None => Ok(Vec::new()),
            Some(Value::Array(items)) => Ok(items.clone()),
            Some(other) => Ok(vec![other.clone()]),
        }
    }

    /// Numbers of an aggregate argument; a single number is a one-item array.
    fn numbers(&self, i: usize) -> Result<Vec<f64>, ExecError> {
        self.array(i)?
            .iter()
            .map(|v| {
                v.as_f64()
                    .ok_or_else(|| self.fail("expects an array of numbers"))
            })
            .collect()
    }

    fn unary_math(&self, f: fn(f64) -> f64) -> Eval {
        Ok(self.opt_number(0)?.map(f).and_then(number))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn eval_with(src: &str, input: Value, vars: Value) -> Result<Option<Value>, ExecError> {
        let variables = vars.as_object().cloned().unwrap_or_default();
        let bindings = Bindings::new(
            &variables,
            json!({"input": input, "context": {"Execution": {"Name": "run"}}}),
            "seed",
        );
        evaluate_expression(src, &bindings)
    }

    fn eval(src: &str) -> Option<Value> {
        let input = json!({
            "amount": 150,
            "name": "Ada",
            "orders": [
                {"id": 1, "total": 10, "tags": ["a", "b"]},
                {"id": 2, "total": 25.5, "tags": ["c"]},
                {"id": 3, "total": 4, "tags": []}
            ]
        });
        eval_with(src, input, json!({"limit": 20})).unwrap()
    }

    #[test]
    fn paths_map_and_flatten() {
        assert_eq!(eval("$states.input.amount"), Some(json!(150)));
        assert_eq!(eval("orders.id"), Some(json!([1, 2, 3])));
        assert_eq!(eval("orders.tags"), Some(json!(["a", "b", "c"])));
        assert_eq!(eval("orders[0].total"), Some(json!(10)));
        assert_eq!(eval("orders[-1].id"), Some(json!(3)));
        assert_eq!(eval("orders[total > $limit].id"), Some(json!(2)));
        assert_eq!(eval("missing.field"), None);
        assert_eq!(eval("$states.context.Execution.Name"), Some(json!("run")));
    }

    #[test]
    fn arithmetic_and_comparison() {
        assert_eq!(eval("amount * 2 + 1"), Some(json!(301)));
        assert_eq!(eval("7 % 3"), Some(json!(1)));
        assert_eq!(eval("10 / 4"), Some(json!(2.5)));
        assert_eq!(eval("amount > 100 and name = 'Ada'"), Some(json!(true)));
        assert_eq!(eval("amount < 100 or false"), Some(json!(false)));
        assert_eq!(eval("missing > 3"), Some(json!(false)));
        assert_eq!(eval("2 in [1, 2, 3]"), Some(json!(true)));
        assert!(eval_with("'a' + 1", json!({}), json!({})).is_err());
        assert!(eval_with("'a' < 1", json!({}), json!({})).is_err());
    }

    #[test]
    fn strings_and_conditionals() {
        assert_eq!(eval("'Hi ' & name & '!'"), Some(json!("Hi Ada!")));
        assert_eq!(eval("amount > 100 ? 'high' : 'low'"), Some(json!("high")));
        assert_eq!(eval("amount > 1000 ? 'high'"), None);
        assert_eq!(eval("-amount"), Some(json!(-150)));
    }

    #[test]
    fn constructors_and_blocks() {
        assert_eq!(eval("[1..4]"), Some(json!([1, 2, 3, 4])));
        assert_eq!(eval("[orders.id, 9]"), Some(json!([1, 2, 3, 9])));
        assert_eq!(eval("[[1, 2], 3]"), Some(json!([[1, 2], 3])));
        assert_eq!(
            eval("{'n': $count(orders), 'gone': missing}"),
            Some(json!({"n": 3}))
        );
        assert_eq!(eval("($x := 2; $y := $x * 3; $y + 1)"), Some(json!(7)));
    }

    #[test]
    fn function_library() {
        assert_eq!(eval("$sum(orders.total)"), Some(json!(39.5)));
        assert_eq!(eval("$max(orders.total)"), Some(json!(25.5)));
        assert_eq!(eval("$min(orders.total)"), Some(json!(4)));
        assert_eq!(eval("$average([1, 2, 3])"), Some(json!(2)));
        assert_eq!(eval("$string(5)"), Some(json!("5")));
        assert_eq!(eval("$number('2.5')"), Some(json!(2.5)));
        assert_eq!(eval("$boolean('')"), Some(json!(false)));
        assert_eq!(eval("$not(true)"), Some(json!(false)));
        assert_eq!(eval("$exists(missing)"), Some(json!(false)));
        assert_eq!(eval("$length(name)"), Some(json!(3)));
        assert_eq!(eval("$uppercase(name)"), Some(json!("ADA")));
        assert_eq!(eval("$substring('hello', 1, 3)"), Some(json!("ell")));
        assert_eq!(eval("$substring('hello', -2)"), Some(json!("lo")));
        assert_eq!(eval("$contains(name, 'd')"), Some(json!(true)));
        assert_eq!(eval("$join(['a', 'b'], '-')"), Some(json!("a-b")));
        assert_eq!(eval("$split('a,b,c', ',')"), Some(json!(["a", "b", "c"])));
        assert_eq!(eval("$keys({'a': 1, 'b': 2})"), Some(json!(["a", "b"])));
        assert_eq!(eval("$append([1], [2, 3])"), Some(json!([1, 2, 3])));
        assert_eq!(eval("$merge([{'a': 1}, {'a': 2, 'b': 3}])"), Some(json!({"a": 2, "b": 3})));
        assert_eq!(eval("$abs(-3)"), Some(json!(3)));
        assert_eq!(eval("$floor(2.7)"), Some(json!(2)));
        assert_eq!(eval("$ceil(2.1)"), Some(json!(3)));
        assert_eq!(eval("$round(2.5)"), Some(json!(2)));
        assert_eq!(eval("$type(orders)"), Some(json!("array")));
        assert_eq!(eval("$partition([1, 2, 3], 2)"), Some(json!([[1, 2], [3]])));
        assert_eq!(eval("$range(0, 6, 3)"), Some(json!([0, 3, 6])));
        assert_eq!(eval("$parse('{\"k\": 1}')"), Some(json!({"k": 1})));
        assert_eq!(
            eval("$hash('abc')"),
            Some(json!("ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"))
        );
    }

    #[test]
    fn uuid_and_random_are_repeatable() {
        let first = eval("[$uuid(), $uuid()]").unwrap();
        assert_eq!(Some(first.clone()), eval("[$uuid(), $uuid()]"));
        assert_ne!(first[0], first[1]);
        let r = eval("$random()").unwrap().as_f64().unwrap();
        assert!((0.0..1.0).contains(&r));
    }

    #[test]
    fn templates_omit_undefined_fields() {
        let variables = Map::new();
        let bindings = Bindings::new(&variables, json!({"input": {"a": 1}}), "s");
        let out = evaluate_template(
            &json!({"x": "{% $states.input.a %}", "y": "{% $states.input.b %}", "z": "plain"}),
            &bindings,
        )
        .unwrap();
        assert_eq!(out, json!({"x": 1, "z": "plain"}));
        assert_eq!(
            evaluate_template(&json!("{% $states.input.b %}"), &bindings).unwrap(),
            Value::Null
        );
    }

    #[test]
    fn errors_are_query_evaluation_errors() {
        let err = eval_with("$nosuch()", json!({}), json!({})).unwrap_err();
        assert_eq!(err.name(), "States.QueryEvaluationError");
        let err = eval_with("1 +", json!({}), json!({})).unwrap_err();
        assert_eq!(err.name(), "States.QueryEvaluationError");
    }

    #[test]
    fn extreme_integer_arguments_do_not_overflow() {
        let bounds = json!({"lo": i64::MIN, "hi": i64::MAX});
        assert_eq!(
            eval_with("$substring('abc', 1, $hi)", json!({}), bounds.clone()).unwrap(),
            Some(json!("bc"))
        );
        let err = eval_with("[$lo..$hi]", json!({}), bounds.clone()).unwrap_err();
        assert!(err.cause().contains("range is too large"), "{}", err.cause());
        assert_eq!(
            eval_with("$range($hi, $hi)", json!({}), bounds).unwrap(),
            Some(json!([i64::MAX]))
        );
    }

    #[test]
    fn truthiness_follows_jsonata() {
        assert!(!truthy(None));
        assert!(!truthy(Some(&json!(0))));
        assert!(truthy(Some(&json!("x"))));
        assert!(!truthy(Some(&json!([]))));
        assert!(truthy(Some(&json!([0, 1]))));
        assert!(!truthy(Some(&json!({}))));
    }
}
