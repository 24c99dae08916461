//! Optional-chaining lookups into user data.
//!
//! A missing key anywhere along a path is `None`, never an error.

use serde_json::Value;

/// Follows a dotted path. Numeric segments index into arrays.
pub fn lookup<'a>(data: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .filter(|segment| !segment.is_empty())
        .try_fold(data, |current, segment| match current {
            Value::Object(map) => map.get(segment),
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        })
}

/// Display text of a leaf. Blank strings, null and objects have none; lists
/// of scalars are joined with `", "`.
pub fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let s = s.trim();
            (!s.is_empty()).then(|| s.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Array(items) => {
            let parts: Vec<String> = items.iter().filter_map(scalar_text).collect();
            (!parts.is_empty()).then(|| parts.join(", "))
        }
        Value::Null | Value::Object(_) => None,
    }
}

/// Resolves a (possibly composite) form field. Each space-separated path is
/// looked up and the values present are joined with one space.
pub fn resolve_field(data: &Value, form_field: &str) -> Option<String> {
    let parts: Vec<String> = form_field
        .split_whitespace()
        .filter_map(|path| lookup(data, path).and_then(scalar_text))
        .collect();
    (!parts.is_empty()).then(|| parts.join(" "))
}

/// The array behind a repeating section's field, if the user supplied one.
pub fn entries<'a>(data: &'a Value, field: &str) -> Option<&'a [Value]> {
    lookup(data, field)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .filter(|items| !items.is_empty())
}
