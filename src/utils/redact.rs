use crate::utils::text::clip;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::collections::HashSet;

const DEFAULT_REDACTION: &str = "[REDACTED]";
const INLINE_REDACTION: &str = "***REDACTED***";

static SENSITIVE_KEYS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "password",
        "secret",
        "token",
        "access_token",
        "refresh_token",
        "app_secret",
        "client_secret",
        "authorization",
        "content",
        "content_base64",
    ]
    .into_iter()
    .collect()
});

static INLINE_REDACTION_PATTERNS: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    vec![
        (
            // Short-lived Dropbox access tokens.
            Regex::new(r"\bsl\.[A-Za-z0-9_-]{20,}").expect("inline redaction regex"),
            "sl.***REDACTED***",
        ),
        (
            Regex::new(r"\b(Bearer|Basic)\s+([A-Za-z0-9._~+/=-]{10,})").expect("inline redaction regex"),
            "$1 ***REDACTED***",
        ),
        (
            Regex::new(r#"\b(access_token|refresh_token|client_secret)=([^&\s"']+)"#)
                .expect("inline redaction regex"),
            "$1=***REDACTED***",
        ),
    ]
});

pub fn is_sensitive_key(key: &str) -> bool {
    let normalized = key.trim().to_lowercase();
    if normalized.is_empty() {
        return false;
    }
    SENSITIVE_KEYS.contains(normalized.as_str())
        || normalized.ends_with("_token")
        || normalized.ends_with("_secret")
}

pub fn redact_text(value: &str, max_string: usize) -> String {
    let mut out = value.to_string();
    for (re, replacement) in INLINE_REDACTION_PATTERNS.iter() {
        if re.is_match(&out) {
            out = re.replace_all(&out, *replacement).into_owned();
        }
    }
    clip(&out, max_string)
}

/// Deep copy of `value` that is safe to log: sensitive keys are replaced, strings are scanned
/// for inline credentials and clipped to `max_string` bytes.
pub fn redact_value(value: &Value, max_string: usize) -> Value {
    match value {
        Value::String(text) => Value::String(redact_text(text, max_string)),
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| redact_value(item, max_string))
                .collect(),
        ),
        Value::Object(map) => {
            let mut out = serde_json::Map::new();
            for (key, entry) in map {
                if is_sensitive_key(key) && !entry.is_null() {
                    out.insert(key.clone(), Value::String(DEFAULT_REDACTION.to_string()));
                } else {
                    out.insert(key.clone(), redact_value(entry, max_string));
                }
            }
            Value::Object(out)
        }
        _ => value.clone(),
    }
}

pub fn redact_secret(value: &str) -> String {
    if value.len() <= 8 {
        return INLINE_REDACTION.to_string();
    }
    format!("{}{}", crate::utils::text::truncate_utf8_prefix(value, 4), INLINE_REDACTION)
}
