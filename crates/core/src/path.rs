//! JSONPath subset used by the legacy ASL dialect.
//!
//! Three roots are recognised: `$` (the state input), `$$` (the context
//! object) and `$name` (a workflow variable). Segments are dotted fields,
//! bracketed quoted fields, integer indexes (negative counts from the end)
//! and the `*` wildcard. Deep scan and filter expressions are rejected.

use serde_json::Value;
use std::fmt;

use crate::error::SyntaxError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathRoot {
    Input,
    Context,
    Variable(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Field(String),
    Index(i64),
    Wildcard,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsonPath {
    pub root: PathRoot,
    pub segments: Vec<Segment>,
    source: String,
}

impl fmt::Display for JsonPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

fn syntax(src: &str, offset: usize, msg: impl Into<String>) -> SyntaxError {
    SyntaxError::new("path", src, offset, msg)
}

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

impl JsonPath {
    /// Whether a string looks like a path reference (as opposed to a literal).
    pub fn looks_like_path(s: &str) -> bool {
        s.starts_with('$')
    }

    pub fn parse(src: &str) -> Result<Self, SyntaxError> {
        let chars: Vec<char> = src.trim().chars().collect();
        if chars.first() != Some(&'$') {
            return Err(syntax(src, 0, "path must start with '$'"));
        }
        let mut pos = 1usize;
        let root = if chars.get(1) == Some(&'$') {
            pos = 2;
            PathRoot::Context
        } else if chars.get(1).is_some_and(|c| is_name_char(*c)) {
            let start = pos;
            while pos < chars.len() && is_name_char(chars[pos]) {
                pos += 1;
            }
            PathRoot::Variable(chars[start..pos].iter().collect())
        } else {
            PathRoot::Input
        };

        let mut segments = Vec::new();
        while pos < chars.len() {
            match chars[pos] {
                '.' => {
                    pos += 1;
                    if chars.get(pos) == Some(&'.') {
                        return Err(syntax(src, pos, "deep scan '..' is not supported"));
                    }
                    if chars.get(pos) == Some(&'*') {
                        pos += 1;
                        segments.push(Segment::Wildcard);
                        continue;
                    }
                    let start = pos;
                    while pos < chars.len() && chars[pos] != '.' && chars[pos] != '[' {
                        pos += 1;
                    }
                    if start == pos {
                        return Err(syntax(src, start, "expected field name after '.'"));
                    }
                    segments.push(Segment::Field(chars[start..pos].iter().collect()));
                }
                '[' => {
                    pos += 1;
                    match chars.get(pos) {
                        Some('\'') | Some('"') => {
                            let quote = chars[pos];
                            pos += 1;
                            let start = pos;
                            while pos < chars.len() && chars[pos] != quote {
                                pos += 1;
                            }
                            if pos >= chars.len() {
                                return Err(syntax(src, start, "unterminated quoted field"));
                            }
                            segments.push(Segment::Field(chars[start..pos].iter().collect()));
                            pos += 1;
                        }
                        Some('*') => {
                            pos += 1;
                            segments.push(Segment::Wildcard);
                        }
                        Some('?') => {
                            return Err(syntax(src, pos, "filter expressions are not supported"));
                        }
                        _ => {
                            let start = pos;
                            while pos < chars.len() && chars[pos] != ']' {
                                pos += 1;
                            }
                            let text: String = chars[start..pos].iter().collect();
                            let idx: i64 = text.trim().parse().map_err(|_| {
                                syntax(src, start, format!("invalid array index '{}'", text))
                            })?;
                            segments.push(Segment::Index(idx));
                        }
                    }
                    if chars.get(pos) != Some(&']') {
                        return Err(syntax(src, pos, "expected ']'"));
                    }
                    pos += 1;
                }
                other => {
                    return Err(syntax(src, pos, format!("unexpected character '{}'", other)));
                }
            }
        }

        Ok(JsonPath {
            root,
            segments,
            source: src.trim().to_owned(),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// A reference path addresses exactly one node (no wildcards).
    pub fn is_reference(&self) -> bool {
        !self.segments.iter().any(|s| matches!(s, Segment::Wildcard))
    }

    /// Select from `root`, which must already be the value the path root
    /// denotes (input, context object, or variable value).
    ///
    /// Definite paths return `None` when any segment is missing. Paths with a
    /// wildcard always return an array of the matched nodes.
    pub fn select(&self, root: &Value) -> Option<Value> {
        let mut current: Vec<&Value> = vec![root];
        let mut multi = false;
        for segment in &self.segments {
            let mut next = Vec::new();
            for value in current {
                match segment {
                    Segment::Field(name) => {
                        if let Some(v) = value.as_object().and_then(|o| o.get(name)) {
                            next.push(v);
                        }
                    }
                    Segment::Index(idx) => {
                        if let Some(arr) = value.as_array() {
                            if let Some(i) = resolve_index(*idx, arr.len()) {
                                next.push(&arr[i]);
                            }
                        }
                    }
                    Segment::Wildcard => {
                        multi = true;
                        match value {
                            Value::Array(arr) => next.extend(arr.iter()),
                            Value::Object(obj) => next.extend(obj.values()),
                            _ => {}
                        }
                    }
                }
            }
            if next.is_empty() && !multi {
                return None;
            }
            current = next;
        }
        if multi {
            Some(Value::Array(current.into_iter().cloned().collect()))
        } else {
            current.into_iter().next().cloned()
        }
    }

    /// Write `value` at this path inside `target`, creating intermediate
    /// objects. Used for `ResultPath` merging.
    pub fn assign(&self, target: &mut Value, value: Value) -> Result<(), String> {
        if !self.is_reference() {
            return Err(format!("'{}' is not a reference path", self.source));
        }
        let Some((last, parents)) = self.segments.split_last() else {
            *target = value;
            return Ok(());
        };
        let mut current = target;
        for segment in parents {
            current = match segment {
                Segment::Field(name) => {
                    let obj = current.as_object_mut().ok_or_else(|| {
                        format!("cannot set field '{}' on a non-object value", name)
                    })?;
                    let slot = obj
                        .entry(name.clone())
                        .or_insert_with(|| Value::Object(Default::default()));
                    if slot.is_null() {
                        *slot = Value::Object(Default::default());
                    }
                    slot
                }
                Segment::Index(idx) => {
                    let arr = current
                        .as_array_mut()
                        .ok_or_else(|| format!("cannot index [{}] into a non-array value", idx))?;
                    let len = arr.len();
                    let i = resolve_index(*idx, len)
                        .ok_or_else(|| format!("index [{}] out of bounds", idx))?;
                    &mut arr[i]
                }
                Segment::Wildcard => unreachable!("reference paths carry no wildcard"),
            };
        }
        match last {
            Segment::Field(name) => {
                let obj = current
                    .as_object_mut()
                    .ok_or_else(|| format!("cannot set field '{}' on a non-object value", name))?;
                obj.insert(name.clone(), value);
            }
            Segment::Index(idx) => {
                let arr = current
                    .as_array_mut()
                    .ok_or_else(|| format!("cannot index [{}] into a non-array value", idx))?;
                let len = arr.len();
                let i = resolve_index(*idx, len)
                    .ok_or_else(|| format!("index [{}] out of bounds", idx))?;
                arr[i] = value;
            }
            Segment::Wildcard => unreachable!("reference paths carry no wildcard"),
        }
        Ok(())
    }
}

fn resolve_index(idx: i64, len: usize) -> Option<usize> {
    let i = if idx < 0 { len as i64 + idx } else { idx };
    if i >= 0 && (i as usize) < len {
        Some(i as usize)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_roots() {
        assert_eq!(JsonPath::parse("$").unwrap().root, PathRoot::Input);
        assert_eq!(JsonPath::parse("$$.Execution.Id").unwrap().root, PathRoot::Context);
        assert_eq!(
            JsonPath::parse("$order.total").unwrap().root,
            PathRoot::Variable("order".to_string())
        );
    }

    #[test]
    fn selects_nested_fields_and_indexes() {
        let doc = json!({"a": {"b": [10, 20, 30]}, "odd key": 1});
        assert_eq!(JsonPath::parse("$.a.b[1]").unwrap().select(&doc), Some(json!(20)));
        assert_eq!(JsonPath::parse("$.a.b[-1]").unwrap().select(&doc), Some(json!(30)));
        assert_eq!(JsonPath::parse("$['odd key']").unwrap().select(&doc), Some(json!(1)));
        assert_eq!(JsonPath::parse("$.a.missing").unwrap().select(&doc), None);
        assert_eq!(JsonPath::parse("$").unwrap().select(&doc), Some(doc.clone()));
    }

    #[test]
    fn wildcard_collects_matches() {
        let doc = json!({"items": [{"id": 1}, {"id": 2}, {"name": "x"}]});
        let path = JsonPath::parse("$.items[*].id").unwrap();
        assert!(!path.is_reference());
        assert_eq!(path.select(&doc), Some(json!([1, 2])));
    }

    #[test]
    fn assign_creates_intermediate_objects() {
        let mut doc = json!({"keep": true});
        JsonPath::parse("$.result.inner")
            .unwrap()
            .assign(&mut doc, json!(5))
            .unwrap();
        assert_eq!(doc, json!({"keep": true, "result": {"inner": 5}}));
    }

    #[test]
    fn assign_into_scalar_fails() {
        let mut doc = json!(3);
        let err = JsonPath::parse("$.x").unwrap().assign(&mut doc, json!(1));
        assert!(err.is_err());
    }

    #[test]
    fn rejects_unsupported_syntax() {
        assert!(JsonPath::parse("$..a").is_err());
        assert!(JsonPath::parse("$.a[?(@.x)]").is_err());
        assert!(JsonPath::parse("a.b").is_err());
    }
}
