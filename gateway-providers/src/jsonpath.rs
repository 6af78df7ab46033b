// gateway-providers/src/jsonpath.rs
// ============================================================================
// Module: Dotted JSON Path
// Description: Minimal path resolution for auth token-response extraction.
// Purpose: Read a scalar out of an auth provider's JSON response by a dotted path.
// Dependencies: serde_json
// ============================================================================

//! ## Overview
//! Token response bodies are read with a small dotted-path language:
//! `"access_token"`, `"data.access_token"`, `"tokens[0].value"`. This is
//! deliberately a subset of full `JSONPath` (no filters, no wildcards) since
//! every documented use in spec.md is a fixed response shape, not a query.

use serde_json::Value;

/// Resolves `path` against `document`, returning `None` on any missing
/// segment or type mismatch.
#[must_use]
pub fn resolve<'a>(document: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = document;
    for segment in split_segments(path) {
        current = match segment {
            Segment::Key(key) => current.as_object()?.get(key)?,
            Segment::Index(index) => current.as_array()?.get(index)?,
        };
    }
    Some(current)
}

/// Resolves `path` against `document` and renders the result as a string,
/// accepting string, number, and bool leaves.
#[must_use]
pub fn resolve_as_string(document: &Value, path: &str) -> Option<String> {
    match resolve(document, path)? {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        _ => None,
    }
}

/// Resolves `path` against `document` and renders the result as an `i64`,
/// used for token lifetime fields.
#[must_use]
pub fn resolve_as_i64(document: &Value, path: &str) -> Option<i64> {
    match resolve(document, path)? {
        Value::Number(number) => number.as_i64(),
        Value::String(text) => text.parse().ok(),
        _ => None,
    }
}

enum Segment<'a> {
    Key(&'a str),
    Index(usize),
}

fn split_segments(path: &str) -> Vec<Segment<'_>> {
    let mut segments = Vec::new();
    for dotted in path.split('.') {
        if dotted.is_empty() {
            continue;
        }
        let mut rest = dotted;
        if let Some(bracket) = rest.find('[') {
            let key = &rest[..bracket];
            if !key.is_empty() {
                segments.push(Segment::Key(key));
            }
            rest = &rest[bracket..];
            while let Some(stripped) = rest.strip_prefix('[') {
                let Some(close) = stripped.find(']') else {
                    break;
                };
                if let Ok(index) = stripped[..close].parse::<usize>() {
                    segments.push(Segment::Index(index));
                }
                rest = &stripped[close + 1..];
            }
        } else {
            segments.push(Segment::Key(rest));
        }
    }
    segments
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_flat_key() {
        let document = serde_json::json!({"access_token": "abc"});
        assert_eq!(resolve_as_string(&document, "access_token"), Some("abc".to_string()));
    }

    #[test]
    fn resolves_nested_key() {
        let document = serde_json::json!({"data": {"access_token": "xyz"}});
        assert_eq!(resolve_as_string(&document, "data.access_token"), Some("xyz".to_string()));
    }

    #[test]
    fn resolves_array_index() {
        let document = serde_json::json!({"tokens": [{"value": "first"}, {"value": "second"}]});
        assert_eq!(resolve_as_string(&document, "tokens[1].value"), Some("second".to_string()));
    }

    #[test]
    fn resolves_numeric_expiry() {
        let document = serde_json::json!({"expires_in": 3600});
        assert_eq!(resolve_as_i64(&document, "expires_in"), Some(3600));
    }

    #[test]
    fn missing_path_returns_none() {
        let document = serde_json::json!({"a": 1});
        assert_eq!(resolve_as_string(&document, "b.c"), None);
    }
}
