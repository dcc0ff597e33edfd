//! JSON path lookup and response field assertions.

use crate::error::StepError;
use serde_json::Value;
use std::collections::HashMap;

/// Split a path like `results[0].geometry.location` or
/// `results.0.id` into its segments.
fn path_segments(path: &str) -> Vec<&str> {
    let mut segments = Vec::new();
    for part in path.split('.') {
        let mut rest = part;
        while let Some(open) = rest.find('[') {
            if open > 0 {
                segments.push(&rest[..open]);
            }
            match rest[open..].find(']') {
                Some(close) => {
                    segments.push(rest[open + 1..open + close].trim_matches(['"', '\'']));
                    rest = &rest[open + close + 1..];
                }
                None => {
                    segments.push(&rest[open..]);
                    rest = "";
                }
            }
        }
        if !rest.is_empty() {
            segments.push(rest);
        }
    }
    segments
}

/// Look up a value by dotted / bracketed path.
///
/// Object keys are tried first, then array indices. An empty
/// path returns the root.
pub fn get_by_json_path<'a>(json: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = json;

    for part in path_segments(path) {
        current = match current {
            Value::Object(map) => map.get(part)?,
            Value::Array(array) => array.get(part.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }

    Some(current)
}

/// Render a scalar the way a test would read it as a string.
///
/// `null` reads as absent; arrays and objects render as compact
/// JSON.
pub fn value_as_string(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Assert that `field` exists with the `expected` text value.
pub fn expect_field(
    json: &Value,
    field: &str,
    expected: &str,
) -> Result<String, StepError> {
    let actual = get_by_json_path(json, field).and_then(value_as_string);
    match actual {
        Some(actual) if actual == expected => Ok(actual),
        actual => Err(StepError::AssertionMismatch {
            field: field.to_string(),
            expected: expected.to_string(),
            actual,
        }),
    }
}

/// Compare response headers against expectations.
///
/// Header names match case-insensitively. The first mismatch is
/// returned as an assertion error.
pub fn validate_headers(
    headers: &HashMap<String, String>,
    expectations: &HashMap<String, String>,
) -> Result<(), StepError> {
    for (name, expected) in expectations {
        let actual = headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.clone());
        if actual.as_deref() != Some(expected.as_str()) {
            return Err(StepError::AssertionMismatch {
                field: format!("header {name}"),
                expected: expected.clone(),
                actual,
            });
        }
    }
    Ok(())
}
