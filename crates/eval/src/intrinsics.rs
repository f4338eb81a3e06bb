//! Evaluation of `States.*` intrinsic functions.
//!
//! Arguments are evaluated first (literals, paths against the state's
//! [`PathScope`], nested calls), then dispatched by name. Every failure is
//! reported as `States.IntrinsicFailure`.

use std::collections::HashSet;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256, Sha384, Sha512};
use stepsim_core::{IntrinsicArg, IntrinsicCall};

use crate::entropy;
use crate::error::ExecError;
use crate::numeric;
use crate::resolve::PathScope;

const MAX_RANGE_ITEMS: usize = 1000;

pub fn evaluate(call: &IntrinsicCall, scope: &PathScope) -> Result<Value, ExecError> {
    let args = call
        .args
        .iter()
        .map(|arg| match arg {
            IntrinsicArg::Literal(v) => Ok(v.clone()),
            IntrinsicArg::Path(p) => scope.resolve(p),
            IntrinsicArg::Call(inner) => evaluate(inner, scope),
        })
        .collect::<Result<Vec<_>, _>>()?;
    let f = Intrinsic {
        name: &call.name,
        args: &args,
    };
    match call.name.as_str() {
        "States.Format" => f.format(),
        "States.StringToJson" => {
            f.arity(1)?;
            let text = f.string(0)?;
            serde_json::from_str(text).map_err(|e| f.fail(format!("invalid JSON: {}", e)))
        }
        "States.JsonToString" => {
            f.arity(1)?;
            serde_json::to_string(&args[0])
                .map(Value::String)
                .map_err(|e| f.fail(e.to_string()))
        }
        "States.Array" => Ok(Value::Array(args.clone())),
        "States.ArrayPartition" => {
            f.arity(2)?;
            let items = f.array(0)?;
            let size = f.positive(1)?;
            Ok(Value::Array(
                items.chunks(size).map(|c| Value::Array(c.to_vec())).collect(),
            ))
        }
        "States.ArrayContains" => {
            f.arity(2)?;
            Ok(Value::Bool(f.array(0)?.contains(&args[1])))
        }
        "States.ArrayRange" => f.array_range(),
        "States.ArrayGetItem" => {
            f.arity(2)?;
            let items = f.array(0)?;
            let index = f.integer(1)?;
            usize::try_from(index)
                .ok()
                .and_then(|i| items.get(i))
                .cloned()
                .ok_or_else(|| f.fail(format!("index {} is out of bounds", index)))
        }
        "States.ArrayLength" => {
            f.arity(1)?;
            Ok(Value::from(f.array(0)?.len()))
        }
        "States.ArrayUnique" => {
            f.arity(1)?;
            let mut seen = HashSet::new();
            let unique = f
                .array(0)?
                .iter()
                .filter(|v| seen.insert(v.to_string()))
                .cloned()
                .collect();
            Ok(Value::Array(unique))
        }
        "States.Base64Encode" => {
            f.arity(1)?;
            Ok(Value::String(BASE64.encode(f.string(0)?)))
        }
        "States.Base64Decode" => {
            f.arity(1)?;
            let bytes = BASE64
                .decode(f.string(0)?)
                .map_err(|e| f.fail(format!("invalid base64: {}", e)))?;
            String::from_utf8(bytes)
                .map(Value::String)
                .map_err(|_| f.fail("decoded data is not valid UTF-8"))
        }
        "States.Hash" => {
            f.arity(2)?;
            let data = match &args[0] {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            let algorithm = f.string(1)?;
            let digest = hash_hex(algorithm, data.as_bytes())
                .ok_or_else(|| f.fail(format!("unsupported hash algorithm '{}'", algorithm)))?;
            Ok(Value::String(digest))
        }
        "States.JsonMerge" => f.json_merge(),
        "States.MathRandom" => {
            if !(2..=3).contains(&args.len()) {
                return Err(f.fail("expected 2 or 3 arguments"));
            }
            let start = f.integer(0)?;
            let end = f.integer(1)?;
            let seed = match args.get(2) {
                Some(v) => v.to_string(),
                None => format!("{}|random", scope.seed),
            };
            let mut rng = entropy::rng_from_seed(&seed);
            Ok(Value::from(entropy::random_int(&mut rng, start, end)))
        }
        "States.MathAdd" => {
            f.arity(2)?;
            let a = numeric::to_decimal(&args[0]).ok_or_else(|| f.fail("first argument is not a number"))?;
            let b = numeric::to_decimal(&args[1]).ok_or_else(|| f.fail("second argument is not a number"))?;
            let sum = a.checked_add(b).ok_or_else(|| f.fail("numeric overflow"))?;
            Ok(numeric::decimal_to_value(sum))
        }
        "States.StringSplit" => {
            f.arity(2)?;
            let text = f.string(0)?;
            let delimiters: Vec<char> = f.string(1)?.chars().collect();
            let parts = text
                .split(|c| delimiters.contains(&c))
                .filter(|p| !p.is_empty())
                .map(|p| Value::String(p.to_owned()))
                .collect();
            Ok(Value::Array(parts))
        }
        "States.UUID" => {
            f.arity(0)?;
            Ok(Value::String(entropy::uuid(&format!("{}|uuid", scope.seed))))
        }
        other => Err(f.fail(format!("unknown intrinsic '{}'", other))),
    }
}

pub fn hash_hex(algorithm: &str, data: &[u8]) -> Option<String> {
    let bytes: Vec<u8> = match algorithm {
        "SHA-256" => Sha256::digest(data).to_vec(),
        "SHA-384" => Sha384::digest(data).to_vec(),
        "SHA-512" => Sha512::digest(data).to_vec(),
        _ => return None,
    };
    Some(bytes.iter().map(|b| format!("{:02x}", b)).collect())
}

/// Evaluated arguments of one call, with typed accessors.
struct Intrinsic<'a> {
    name: &'a str,
    args: &'a [Value],
}

impl Intrinsic<'_> {
    fn fail(&self, message: impl Into<String>) -> ExecError {
        ExecError::IntrinsicFailure {
            function: self.name.to_owned(),
            message: message.into(),
        }
    }

    fn arity(&self, n: usize) -> Result<(), ExecError> {
        if self.args.len() == n {
            Ok(())
        } else {
            Err(self.fail(format!("expected {} argument(s), got {}", n, self.args.len())))
        }
    }

    fn string(&self, i: usize) -> Result<&str, ExecError> {
        self.args[i]
            .as_str()
            .ok_or_else(|| self.fail(format!("argument {} must be a string", i + 1)))
    }

    fn array(&self, i: usize) -> Result<&Vec<Value>, ExecError> {
        self.args[i]
            .as_array()
            .ok_or_else(|| self.fail(format!("argument {} must be an array", i + 1)))
    }

    fn integer(&self, i: usize) -> Result<i64, ExecError> {
        let v = &self.args[i];
        v.as_i64()
            .or_else(|| v.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64))
            .ok_or_else(|| self.fail(format!("argument {} must be an integer", i + 1)))
    }

    fn positive(&self, i: usize) -> Result<usize, ExecError> {
        let n = self.integer(i)?;
        usize::try_from(n)
            .ok()
            .filter(|n| *n > 0)
            .ok_or_else(|| self.fail(format!("argument {} must be a positive integer", i + 1)))
    }

    fn format(&self) -> Result<Value, ExecError> {
        let Some(template) = self.args.first().and_then(Value::as_str) else {
            return Err(self.fail("the first argument must be a template string"));
        };
        let mut values = self.args[1..].iter();
        let mut out = String::with_capacity(template.len());
        let mut chars = template.chars().peekable();
        while let Some(c) = chars.next() {
            match c {
                '\\' if matches!(chars.peek(), Some('{') | Some('}') | Some('\\')) => {
                    if let Some(escaped) = chars.next() {
                        out.push(escaped);
                    }
                }
                '{' if chars.peek() == Some(&'}') => {
                    chars.next();
                    let value = values
                        .next()
                        .ok_or_else(|| self.fail("more placeholders than arguments"))?;
                    match value {
                        Value::String(s) => out.push_str(s),
                        other => out.push_str(&other.to_string()),
                    }
                }
                other => out.push(other),
            }
        }
        if values.next().is_some() {
            return Err(self.fail("more arguments than placeholders"));
        }
        Ok(Value::String(out))
    }

    fn array_range(&self) -> Result<Value, ExecError> {
        self.arity(3)?;
        let start = self.integer(0)?;
        let end = self.integer(1)?;
        let step = self.integer(2)?;
        if step == 0 {
            return Err(self.fail("step must not be zero"));
        }
        let mut items = Vec::new();
        let mut current = start;
        while (step > 0 && current <= end) || (step < 0 && current >= end) {
            if items.len() == MAX_RANGE_ITEMS {
                return Err(self.fail(format!("range exceeds {} items", MAX_RANGE_ITEMS)));
            }
            items.push(Value::from(current));
            current = match current.checked_add(step) {
                Some(next) => next,
                None => break,
            };
        }
        Ok(Value::Array(items))
    }

    fn json_merge(&self) -> Result<Value, ExecError> {
        self.arity(3)?;
        let (Some(left), Some(right)) = (self.args[0].as_object(), self.args[1].as_object()) else {
            return Err(self.fail("the first two arguments must be objects"));
        };
        if self.args[2] != Value::Bool(false) {
            return Err(self.fail("only shallow merges (deep = false) are supported"));
        }
        let mut merged: Map<String, Value> = left.clone();
        for (k, v) in right {
            merged.insert(k.clone(), v.clone());
        }
        Ok(Value::Object(merged))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn run(expr: &str) -> Result<Value, ExecError> {
        let input = json!({
            "name": "Ada",
            "items": [1, 2, 2, 3, 1],
            "a": {"x": 1, "y": 2},
            "b": {"y": 3}
        });
        let context = json!({});
        let variables = Map::new();
        let scope = PathScope {
            state: "S",
            input: &input,
            context: &context,
            variables: &variables,
            seed: "exec|S",
        };
        let call = IntrinsicCall::parse(expr).unwrap();
        evaluate(&call, &scope)
    }

    #[test]
    fn format_substitutes_and_unescapes() {
        assert_eq!(run("States.Format('Hello, {}!', $.name)").unwrap(), json!("Hello, Ada!"));
        assert_eq!(
            run(r"States.Format('\{{}\} {}', 1, true)").unwrap(),
            json!("{1} true")
        );
        assert!(run("States.Format('{} {}', 1)").is_err());
        assert!(run("States.Format('{}', 1, 2)").is_err());
    }

    #[test]
    fn json_conversions() {
        assert_eq!(run("States.StringToJson('{\"k\": [1]}')").unwrap(), json!({"k": [1]}));
        assert_eq!(run("States.JsonToString($.a)").unwrap(), json!("{\"x\":1,\"y\":2}"));
        let err = run("States.StringToJson('{oops')").unwrap_err();
        assert_eq!(err.name(), "States.IntrinsicFailure");
    }

    #[test]
    fn array_functions() {
        assert_eq!(run("States.Array(1, 'two', $.name)").unwrap(), json!([1, "two", "Ada"]));
        assert_eq!(
            run("States.ArrayPartition($.items, 2)").unwrap(),
            json!([[1, 2], [2, 3], [1]])
        );
        assert_eq!(run("States.ArrayContains($.items, 3)").unwrap(), json!(true));
        assert_eq!(run("States.ArrayRange(1, 9, 2)").unwrap(), json!([1, 3, 5, 7, 9]));
        assert_eq!(run("States.ArrayRange(3, 1, -1)").unwrap(), json!([3, 2, 1]));
        assert!(run("States.ArrayRange(1, 5000, 1)").is_err());
        assert!(run("States.ArrayRange(1, 2, 0)").is_err());
        assert_eq!(run("States.ArrayGetItem($.items, 3)").unwrap(), json!(3));
        assert!(run("States.ArrayGetItem($.items, 9)").is_err());
        assert_eq!(run("States.ArrayLength($.items)").unwrap(), json!(5));
        assert_eq!(run("States.ArrayUnique($.items)").unwrap(), json!([1, 2, 3]));
    }

    #[test]
    fn encoding_and_hashing() {
        assert_eq!(run("States.Base64Encode('hello')").unwrap(), json!("aGVsbG8="));
        assert_eq!(run("States.Base64Decode('aGVsbG8=')").unwrap(), json!("hello"));
        assert_eq!(
            run("States.Hash('abc', 'SHA-256')").unwrap(),
            json!("ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad")
        );
        assert!(run("States.Hash('abc', 'CRC32')").is_err());
    }

    #[test]
    fn merge_math_and_split() {
        assert_eq!(
            run("States.JsonMerge($.a, $.b, false)").unwrap(),
            json!({"x": 1, "y": 3})
        );
        assert!(run("States.JsonMerge($.a, $.b, true)").is_err());
        assert_eq!(run("States.MathAdd(0.1, 0.2)").unwrap(), json!(0.3));
        assert_eq!(run("States.MathAdd(5, -7)").unwrap(), json!(-2));
        assert_eq!(
            run("States.StringSplit('a,b,,c', ',')").unwrap(),
            json!(["a", "b", "c"])
        );
    }

    #[test]
    fn random_and_uuid_are_deterministic() {
        let a = run("States.MathRandom(1, 100)").unwrap();
        assert_eq!(a, run("States.MathRandom(1, 100)").unwrap());
        let n = a.as_i64().unwrap();
        assert!((1..100).contains(&n));
        let u = run("States.UUID()").unwrap();
        assert_eq!(u, run("States.UUID()").unwrap());
        assert_eq!(u.as_str().unwrap().len(), 36);
    }

    #[test]
    fn missing_path_argument_fails() {
        assert!(run("States.ArrayLength($.nope)").is_err());
    }
}
