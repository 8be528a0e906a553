//! Reserved-character escaping for recorded query data.
//!
//! Object keys in recorded data may contain `.` and `$` (`"a.b"`, `"$or"`).
//! Downstream consumers treat those as path separators and operators, so the
//! collector stores keys with each reserved character replaced by a
//! private-use placeholder and restores them only in rendered text.
//!
//! Input keys that already contain a placeholder character cannot be told
//! apart from escaped ones after rendering; [`has_placeholder_keys`] lets the
//! caller flag that case.

use serde_json::{Map, Value};

/// Stands in for `.` in stored keys.
pub const DOT_PLACEHOLDER: char = '\u{E000}';
/// Stands in for `$` in stored keys.
pub const DOLLAR_PLACEHOLDER: char = '\u{E001}';

/// Replace reserved characters in every object key, at any depth.
///
/// Values are left untouched.
pub fn escape_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(key, value)| (escape_key(&key), escape_keys(value)))
                .collect::<Map<String, Value>>(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(escape_keys).collect()),
        other => other,
    }
}

fn escape_key(key: &str) -> String {
    key.chars()
        .map(|c| match c {
            '.' => DOT_PLACEHOLDER,
            '$' => DOLLAR_PLACEHOLDER,
            c => c,
        })
        .collect()
}

/// Put the reserved characters back into rendered text.
pub fn restore_reserved(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            DOT_PLACEHOLDER => '.',
            DOLLAR_PLACEHOLDER => '$',
            c => c,
        })
        .collect()
}

/// Whether any object key already contains a placeholder character.
pub fn has_placeholder_keys(value: &Value) -> bool {
    match value {
        Value::Object(map) => map.iter().any(|(key, value)| {
            key.contains([DOT_PLACEHOLDER, DOLLAR_PLACEHOLDER]) || has_placeholder_keys(value)
        }),
        Value::Array(items) => items.iter().any(has_placeholder_keys),
        _ => false,
    }
}

/// Whether any object key contains a literal `.` or `$`.
pub fn has_reserved_keys(value: &Value) -> bool {
    match value {
        Value::Object(map) => map
            .iter()
            .any(|(key, value)| key.contains(['.', '$']) || has_reserved_keys(value)),
        Value::Array(items) => items.iter().any(has_reserved_keys),
        _ => false,
    }
}
