//! Canonicalization of raw provisioning-tool output values.
//!
//! `terraform output -json` prints strings quoted and structures with
//! arbitrary whitespace. Values are reduced to a canonical form so that
//! semantically equal outputs compare equal:
//!
//! - objects and arrays are re-serialized compactly with sorted keys
//! - JSON string literals are unquoted; content that parses as JSON is
//!   normalized again, anything else is kept as text
//! - anything else is trimmed
//!
//! `normalize(normalize(x)) == normalize(x)` for every accepted input except
//! quoted text that only looks like JSON (`"[abc]"` becomes `[abc]`, which
//! is rejected on its own).

use serde_json::Value;

use crate::error::{IacError, IacResult};

/// Normalize a single raw output value.
pub fn normalize(raw: &str) -> IacResult<String> {
    let trimmed = raw.trim();
    match trimmed.chars().next() {
        Some('{') | Some('[') => {
            let value: Value = serde_json::from_str(trimmed)
                .map_err(|e| IacError::MalformedOutput(format!("{} in {}", e, preview(trimmed))))?;
            serde_json::to_string(&sort_keys(value))
                .map_err(|e| IacError::MalformedOutput(e.to_string()))
        }
        Some('"') => {
            let inner: String = serde_json::from_str(trimmed)
                .map_err(|e| IacError::MalformedOutput(format!("{} in {}", e, preview(trimmed))))?;
            Ok(normalize(&inner).unwrap_or_else(|_| inner.trim().to_string()))
        }
        _ => Ok(trimmed.to_string()),
    }
}

/// Rebuild objects with keys in lexical order, independent of map features.
fn sort_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            Value::Object(entries.into_iter().map(|(k, v)| (k, sort_keys(v))).collect())
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sort_keys).collect()),
        other => other,
    }
}

fn preview(s: &str) -> String {
    const MAX: usize = 40;
    match s.char_indices().nth(MAX) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}
