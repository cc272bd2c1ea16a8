//! Nested field access by dotted path.
//!
//! Paths are dot-separated (`nested.field`). Bracketed segments such as
//! `a[0].b` or `a["key"]` are rewritten to dot segments first, and a leading
//! dot is ignored. A missing segment resolves to `None`; a present `Null`,
//! `false`, `0` or empty string resolves to that value.

use crate::value::{Document, Value};

/// Split a path into its segments.
pub fn path_segments(path: &str) -> Vec<String> {
    let mut normalized = String::with_capacity(path.len());
    let mut chars = path.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '[' => {
                normalized.push('.');
                let mut inner = String::new();
                for c in chars.by_ref() {
                    if c == ']' {
                        break;
                    }
                    inner.push(c);
                }
                let trimmed = inner
                    .trim()
                    .trim_matches(|c: char| c == '"' || c == '\'');
                normalized.push_str(trimmed);
            }
            other => normalized.push(other),
        }
    }

    normalized
        .strip_prefix('.')
        .unwrap_or(&normalized)
        .split('.')
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
        .collect()
}

/// Resolve `path` against `doc`.
pub fn get_nested_value<'a>(doc: &'a Document, path: &str) -> Option<&'a Value> {
    let segments = path_segments(path);
    let (first, rest) = segments.split_first()?;
    let mut current = doc.get(first)?;
    for segment in rest {
        current = step(current, segment)?;
    }
    Some(current)
}

fn step<'a>(value: &'a Value, segment: &str) -> Option<&'a Value> {
    match value {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    }
}
