//! Sensitive field redaction and payload truncation.
//!
//! # Responsibilities
//! - Replace the value of known-sensitive keys with a fixed marker
//! - Turn arbitrary serializable payloads into masked JSON text
//! - Truncate captured text before it is stored or logged
//!
//! # Design Decisions
//! - Keys match literally and case-insensitively; renamed or derived fields
//!   (e.g. `userPassword`) are NOT recognised
//! - Text that is not valid JSON (including payloads cut off at the capture
//!   limit) is masked with a textual `"key": "value"` pattern instead
//! - Masking never fails; the worst case is the unchanged input

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use serde_json::Value;

/// Marker written in place of a sensitive value.
pub const MASKED: &str = "***MASKED***";

/// Marker appended to text that was cut at the truncation limit.
pub const TRUNCATED: &str = "...truncated";

const SENSITIVE_KEYS: [&str; 4] = ["password", "secret", "clientsecret", "token"];

static SENSITIVE_PAIR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)"(password|secret|clientsecret|token)"\s*:\s*"(?:[^"\\]|\\.)*(?:"|$)"#)
        .expect("sensitive field pattern is valid")
});

fn is_sensitive(key: &str) -> bool {
    SENSITIVE_KEYS.iter().any(|k| key.eq_ignore_ascii_case(k))
}

/// Mask sensitive fields in serialized JSON text.
pub fn mask(text: &str) -> String {
    let lowered = text.to_ascii_lowercase();
    if !SENSITIVE_KEYS.iter().any(|k| lowered.contains(k)) {
        return text.to_string();
    }

    match serde_json::from_str::<Value>(text) {
        Ok(mut value) => {
            mask_value(&mut value);
            value.to_string()
        }
        Err(_) => mask_text(text),
    }
}

/// Mask sensitive fields of an already parsed JSON value in place.
pub fn mask_value(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for (key, field) in map.iter_mut() {
                if is_sensitive(key) {
                    *field = Value::String(MASKED.to_string());
                } else {
                    mask_value(field);
                }
            }
        }
        Value::Array(items) => items.iter_mut().for_each(mask_value),
        _ => {}
    }
}

fn mask_text(text: &str) -> String {
    SENSITIVE_PAIR
        .replace_all(text, |caps: &regex::Captures<'_>| {
            format!("\"{}\":\"{}\"", &caps[1], MASKED)
        })
        .into_owned()
}

/// Serialize any payload to masked JSON text.
///
/// A payload that cannot be serialized is represented as `serialization_error`.
pub fn serialize_masked<T: Serialize + ?Sized>(payload: &T) -> String {
    match serde_json::to_value(payload) {
        Ok(mut value) => {
            mask_value(&mut value);
            value.to_string()
        }
        Err(e) => {
            tracing::debug!(error = %e, "Payload serialization failed");
            "serialization_error".to_string()
        }
    }
}

/// Truncate to at most `max_chars` characters, appending [`TRUNCATED`] when cut.
pub fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}{}", &text[..idx], TRUNCATED),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_masks_password_leaves_other_fields() {
        let masked = mask(r#"{"password":"secret123","name":"bob"}"#);
        assert!(!masked.contains("secret123"));
        assert!(masked.contains(MASKED));
        assert!(masked.contains(r#""name":"bob""#));
    }

    #[test]
    fn test_key_match_is_case_insensitive() {
        for key in ["Password", "PASSWORD", "ClientSecret", "Token"] {
            let masked = mask(&format!(r#"{{"{}":"hunter2"}}"#, key));
            assert!(!masked.contains("hunter2"), "{} was not masked", key);
        }
    }

    #[test]
    fn test_nested_literal_keys() {
        let masked = mask(r#"{"user":{"name":"x","token":"abc"},"items":[{"secret":"s"}]}"#);
        assert!(!masked.contains("abc"));
        assert!(!masked.contains(r#""s""#));
        // Key order is preserved.
        assert!(masked.starts_with(r#"{"user":{"name":"x""#));
    }

    #[test]
    fn test_renamed_fields_are_not_masked() {
        let masked = mask(r#"{"userPassword":"p1"}"#);
        assert!(masked.contains("p1"));
    }

    #[test]
    fn test_invalid_json_falls_back_to_pattern() {
        let masked = mask(r#"{"name":"bob","password" : "abc"#);
        assert!(!masked.contains("abc"));
        assert!(masked.contains(MASKED));

        assert_eq!(mask("plain text"), "plain text");
    }

    #[test]
    fn test_serialize_masked() {
        let text = serialize_masked(&json!({"clientSecret": "zzz", "id": 7}));
        assert_eq!(text, r#"{"clientSecret":"***MASKED***","id":7}"#);
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("abc", 5), "abc");
        assert_eq!(truncate("abcdef", 3), "abc...truncated");
        // Multi-byte characters are counted, not bytes.
        assert_eq!(truncate("ééé", 2), "éé...truncated");
        let long = "x".repeat(5000);
        assert_eq!(truncate(&long, 4000).len(), 4000 + TRUNCATED.len());
    }
}
