//! String-pattern and timestamp helpers for Choice rules.

use regex::Regex;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

pub fn parse_timestamp(s: &str) -> Option<OffsetDateTime> {
    OffsetDateTime::parse(s, &Rfc3339).ok()
}

pub fn is_timestamp(value: &serde_json::Value) -> bool {
    value.as_str().is_some_and(|s| parse_timestamp(s).is_some())
}

/// Compile an ASL wildcard pattern into an anchored regex. `*` matches any
/// run of characters and `?` a single one; `\*`, `\?` and `\\` are literals.
pub fn wildcard_regex(pattern: &str) -> Result<Regex, regex::Error> {
    let mut re = String::with_capacity(pattern.len() + 8);
    re.push_str("^(?s:");
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some(escaped) => re.push_str(&regex::escape(&escaped.to_string())),
                None => re.push_str(&regex::escape("\\")),
            },
            '*' => re.push_str(".*"),
            '?' => re.push('.'),
            other => re.push_str(&regex::escape(&other.to_string())),
        }
    }
    re.push_str(")$");
    Regex::new(&re)
}

pub fn wildcard_match(pattern: &str, text: &str) -> bool {
    wildcard_regex(pattern).is_ok_and(|re| re.is_match(text))
}
