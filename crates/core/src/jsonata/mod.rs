//! Syntax for the JSONata subset accepted in `{% ... %}` templates.

pub mod ast;
pub mod lexer;
pub mod parser;

pub use ast::{BinaryOp, Expr};
pub use parser::parse;

/// If `s` is a `{% ... %}` template, return the expression body.
pub fn template_body(s: &str) -> Option<&str> {
    let trimmed = s.trim();
    trimmed
        .strip_prefix("{%")
        .and_then(|rest| rest.strip_suffix("%}"))
        .map(str::trim)
}

/// Validate every template embedded in a JSON value.
pub fn check_templates(value: &serde_json::Value) -> Result<(), crate::error::SyntaxError> {
    match value {
        serde_json::Value::String(s) => {
            if let Some(body) = template_body(s) {
                parse(body)?;
            }
            Ok(())
        }
        serde_json::Value::Array(items) => items.iter().try_for_each(check_templates),
        serde_json::Value::Object(map) => map.values().try_for_each(check_templates),
        _ => Ok(()),
    }
}
