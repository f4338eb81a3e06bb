//! Syntax of ASL intrinsic functions (`States.Format('{}', $.name)` and
//! friends). Evaluation lives in the evaluator crate.

use serde_json::Value;

use crate::error::SyntaxError;
use crate::path::JsonPath;

/// Every intrinsic the interpreter knows about.
pub const INTRINSIC_NAMES: &[&str] = &[
    "States.Format",
    "States.StringToJson",
    "States.JsonToString",
    "States.Array",
    "States.ArrayPartition",
    "States.ArrayContains",
    "States.ArrayRange",
    "States.ArrayGetItem",
    "States.ArrayLength",
    "States.ArrayUnique",
    "States.Base64Encode",
    "States.Base64Decode",
    "States.Hash",
    "States.JsonMerge",
    "States.MathRandom",
    "States.MathAdd",
    "States.StringSplit",
    "States.UUID",
];

#[derive(Debug, Clone, PartialEq)]
pub enum IntrinsicArg {
    Literal(Value),
    Path(JsonPath),
    Call(IntrinsicCall),
}

#[derive(Debug, Clone, PartialEq)]
pub struct IntrinsicCall {
    pub name: String,
    pub args: Vec<IntrinsicArg>,
}

impl IntrinsicCall {
    pub fn looks_like_call(s: &str) -> bool {
        s.trim_start().starts_with("States.")
    }

    pub fn parse(src: &str) -> Result<Self, SyntaxError> {
        let chars: Vec<char> = src.trim().chars().collect();
        let mut pos = 0;
        let call = parse_call(src, &chars, &mut pos)?;
        if pos != chars.len() {
            return Err(syntax(src, pos, "unexpected trailing input"));
        }
        Ok(call)
    }
}

fn syntax(src: &str, offset: usize, msg: impl Into<String>) -> SyntaxError {
    SyntaxError::new("intrinsic", src, offset, msg)
}

fn skip_ws(chars: &[char], pos: &mut usize) {
    while *pos < chars.len() && chars[*pos].is_whitespace() {
        *pos += 1;
    }
}

fn parse_call(src: &str, chars: &[char], pos: &mut usize) -> Result<IntrinsicCall, SyntaxError> {
    skip_ws(chars, pos);
    let start = *pos;
    while *pos < chars.len() && (chars[*pos].is_alphanumeric() || chars[*pos] == '.') {
        *pos += 1;
    }
    let name: String = chars[start..*pos].iter().collect();
    if !INTRINSIC_NAMES.contains(&name.as_str()) {
        return Err(syntax(src, start, format!("unknown intrinsic function '{}'", name)));
    }
    skip_ws(chars, pos);
    if chars.get(*pos) != Some(&'(') {
        return Err(syntax(src, *pos, "expected '('"));
    }
    *pos += 1;

    let mut args = Vec::new();
    skip_ws(chars, pos);
    if chars.get(*pos) == Some(&')') {
        *pos += 1;
        return Ok(IntrinsicCall { name, args });
    }
    loop {
        args.push(parse_arg(src, chars, pos)?);
        skip_ws(chars, pos);
        match chars.get(*pos) {
            Some(',') => *pos += 1,
            Some(')') => {
                *pos += 1;
                break;
            }
            _ => return Err(syntax(src, *pos, "expected ',' or ')'")),
        }
    }
    Ok(IntrinsicCall { name, args })
}

fn parse_arg(src: &str, chars: &[char], pos: &mut usize) -> Result<IntrinsicArg, SyntaxError> {
    skip_ws(chars, pos);
    let Some(&c) = chars.get(*pos) else {
        return Err(syntax(src, *pos, "expected argument"));
    };

    if c == '\'' {
        *pos += 1;
        let mut s = String::new();
        loop {
            let Some(&sc) = chars.get(*pos) else {
                return Err(syntax(src, *pos, "unterminated string literal"));
            };
            *pos += 1;
            match sc {
                '\'' => break,
                '\\' => {
                    let Some(&esc) = chars.get(*pos) else {
                        return Err(syntax(src, *pos, "unterminated escape"));
                    };
                    *pos += 1;
                    // \{ and \} stay escaped so States.Format can tell them
                    // apart from placeholders.
                    if esc == '{' || esc == '}' {
                        s.push('\\');
                    }
                    s.push(esc);
                }
                other => s.push(other),
            }
        }
        return Ok(IntrinsicArg::Literal(Value::String(s)));
    }

    if c == '$' {
        let start = *pos;
        let mut in_quote: Option<char> = None;
        let mut depth = 0i32;
        while let Some(&pc) = chars.get(*pos) {
            match in_quote {
                Some(q) if pc == q => in_quote = None,
                Some(_) => {}
                None => match pc {
                    '\'' | '"' => in_quote = Some(pc),
                    '[' => depth += 1,
                    ']' => depth -= 1,
                    ',' | ')' if depth == 0 => break,
                    _ => {}
                },
            }
            *pos += 1;
        }
        let text: String = chars[start..*pos].iter().collect();
        return JsonPath::parse(text.trim()).map(IntrinsicArg::Path);
    }

    if IntrinsicCall::looks_like_call(&chars[*pos..].iter().collect::<String>()) {
        return parse_call(src, chars, pos).map(IntrinsicArg::Call);
    }

    let start = *pos;
    while let Some(&pc) = chars.get(*pos) {
        if pc == ',' || pc == ')' || pc.is_whitespace() {
            break;
        }
        *pos += 1;
    }
    let word: String = chars[start..*pos].iter().collect();
    let literal = match word.as_str() {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        "null" => Value::Null,
        _ => serde_json::from_str::<serde_json::Number>(&word)
            .map(Value::Number)
            .map_err(|_| syntax(src, start, format!("invalid argument '{}'", word)))?,
    };
    Ok(IntrinsicArg::Literal(literal))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_format_with_literal_and_path() {
        let call = IntrinsicCall::parse("States.Format('Hello, {}!', $.name)").unwrap();
        assert_eq!(call.name, "States.Format");
        assert_eq!(call.args.len(), 2);
        assert_eq!(call.args[0], IntrinsicArg::Literal(json!("Hello, {}!")));
        assert!(matches!(&call.args[1], IntrinsicArg::Path(p) if p.as_str() == "$.name"));
    }

    #[test]
    fn parses_nested_calls_and_numbers() {
        let call =
            IntrinsicCall::parse("States.ArrayLength(States.Array(1, -2.5, true, null))").unwrap();
        let IntrinsicArg::Call(inner) = &call.args[0] else {
            panic!("expected nested call");
        };
        assert_eq!(inner.name, "States.Array");
        assert_eq!(
            inner.args,
            vec![
                IntrinsicArg::Literal(json!(1)),
                IntrinsicArg::Literal(json!(-2.5)),
                IntrinsicArg::Literal(json!(true)),
                IntrinsicArg::Literal(Value::Null),
            ]
        );
    }

    #[test]
    fn path_arguments_may_contain_brackets_and_commas_in_quotes() {
        let call = IntrinsicCall::parse("States.Array($['a,b'], $.list[0])").unwrap();
        assert_eq!(call.args.len(), 2);
    }

    #[test]
    fn escaped_braces_are_preserved() {
        let call = IntrinsicCall::parse(r"States.Format('\{literal\} {}', $.x)").unwrap();
        assert_eq!(call.args[0], IntrinsicArg::Literal(json!(r"\{literal\} {}")));
    }

    #[test]
    fn rejects_unknown_function() {
        assert!(IntrinsicCall::parse("States.Nope(1)").is_err());
        assert!(IntrinsicCall::parse("States.Array(1").is_err());
    }

    #[test]
    fn empty_argument_list() {
        let call = IntrinsicCall::parse("States.UUID()").unwrap();
        assert!(call.args.is_empty());
    }
}
