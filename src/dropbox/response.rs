//! Turning Dropbox HTTP responses into plain JSON values and typed errors.

use crate::constants::{limits::ERROR_TEXT_BYTES, retry::MAX_RETRY_AFTER_MS};
use crate::errors::{ToolError, ToolErrorKind};
use crate::utils::redact::redact_text;
use serde_json::Value;

/// JSON bodies parse as JSON, anything else is wrapped as `{"text": ...}`, nothing becomes `{}`.
pub fn normalize_body(content_type: Option<&str>, body: &[u8]) -> Value {
    if body.iter().all(|b| b.is_ascii_whitespace()) {
        return Value::Object(Default::default());
    }
    let is_json = content_type
        .map(|ct| ct.to_ascii_lowercase().contains("json"))
        .unwrap_or(false);
    if is_json {
        if let Ok(parsed) = serde_json::from_slice::<Value>(body) {
            return parsed;
        }
    }
    serde_json::json!({ "text": String::from_utf8_lossy(body) })
}

/// Seconds from a `Retry-After` header, as capped milliseconds.
pub fn parse_retry_after(value: Option<&str>) -> Option<u64> {
    let secs = value?.trim().parse::<f64>().ok()?;
    if !secs.is_finite() || secs < 0.0 {
        return None;
    }
    Some(((secs * 1000.0) as u64).min(MAX_RETRY_AFTER_MS))
}

/// Maps a non-2xx Dropbox response to a `ToolError`.
///
/// Route errors (409) carry `error_summary` plus a tagged `error` union; those go into
/// `details` so the caller can branch on `.tag`. 400 responses are plain text.
pub fn error_from_response(
    route: &str,
    status: u16,
    content_type: Option<&str>,
    body: &[u8],
    retry_after_ms: Option<u64>,
) -> ToolError {
    let parsed = normalize_body(content_type, body);
    let error_summary = parsed
        .get("error_summary")
        .and_then(Value::as_str)
        .map(str::to_string);
    let text = parsed
        .get("text")
        .and_then(Value::as_str)
        .map(|t| redact_text(t.trim(), ERROR_TEXT_BYTES));
    let error_tag = parsed
        .get("error")
        .and_then(|e| e.get(".tag"))
        .and_then(Value::as_str)
        .map(str::to_string);
    let user_message = parsed
        .get("user_message")
        .and_then(|m| m.get("text").or(Some(m)))
        .and_then(Value::as_str)
        .map(str::to_string);

    let summary = error_summary
        .clone()
        .or_else(|| text.clone())
        .unwrap_or_else(|| format!("HTTP {}", status));

    let mut details = serde_json::json!({
        "route": route,
        "status": status,
    });
    if let Some(obj) = details.as_object_mut() {
        if let Some(summary) = &error_summary {
            obj.insert("error_summary".to_string(), Value::String(summary.clone()));
        }
        if let Some(error) = parsed.get("error") {
            obj.insert("error".to_string(), error.clone());
        }
        if let Some(message) = &user_message {
            obj.insert("user_message".to_string(), Value::String(message.clone()));
        }
        if let Some(text) = &text {
            obj.insert("body".to_string(), Value::String(text.clone()));
        }
        if let Some(ms) = retry_after_ms {
            obj.insert("retry_after_ms".to_string(), Value::from(ms));
        }
    }

    let err = match status {
        400 => ToolError::new(
            ToolErrorKind::InvalidParams,
            "BAD_INPUT",
            format!("Dropbox rejected the request to {}: {}", route, summary),
        ),
        401 => {
            let expired = error_tag.as_deref() == Some("expired_access_token");
            ToolError::new(
                ToolErrorKind::Denied,
                if expired {
                    "EXPIRED_ACCESS_TOKEN"
                } else {
                    "INVALID_ACCESS_TOKEN"
                },
                format!("Dropbox authentication failed: {}", summary),
            )
            .with_hint("Check DROPBOX_ACCESS_TOKEN or configure DROPBOX_REFRESH_TOKEN")
        }
        403 => ToolError::new(
            ToolErrorKind::Denied,
            "NO_ACCESS",
            format!("Access to {} was denied: {}", route, summary),
        )
        .with_hint("The token may lack the required scope for this route"),
        409 => ToolError::new(ToolErrorKind::Conflict, "ENDPOINT_ERROR", summary),
        429 => ToolError::new(
            ToolErrorKind::Retryable,
            "RATE_LIMITED",
            format!("Dropbox rate limit hit on {}", route),
        )
        .with_hint(match retry_after_ms {
            Some(ms) => format!("Retry after {} ms", ms),
            None => "Retry later".to_string(),
        }),
        500..=599 => ToolError::new(
            ToolErrorKind::Retryable,
            "SERVER_ERROR",
            format!("Dropbox server error ({}) on {}", status, route),
        ),
        _ => ToolError::new(
            ToolErrorKind::Internal,
            "UNEXPECTED_STATUS",
            format!("Unexpected HTTP {} from {}: {}", status, route, summary),
        ),
    };
    err.with_details(details)
}

pub fn map_reqwest_error(route: &str, err: reqwest::Error) -> ToolError {
    if err.is_timeout() {
        return ToolError::timeout(format!("Request to {} timed out", route));
    }
    let message = redact_text(&err.to_string(), ERROR_TEXT_BYTES);
    ToolError::retryable(format!("Request to {} failed: {}", route, message)).with_code("TRANSPORT")
}

#[cfg(test)]
mod tests {
    use super::*;

    const JSON: Option<&str> = Some("application/json");

    #[test]
    fn json_text_and_empty_bodies() {
        assert_eq!(normalize_body(JSON, br#"{"a":1}"#), serde_json::json!({"a": 1}));
        assert_eq!(
            normalize_body(Some("text/plain; charset=utf-8"), b"oops"),
            serde_json::json!({"text": "oops"})
        );
        assert_eq!(normalize_body(JSON, b"  "), serde_json::json!({}));
        assert_eq!(normalize_body(JSON, b"null"), Value::Null);
        assert_eq!(normalize_body(JSON, b"{broken"), serde_json::json!({"text": "{broken"}));
    }

    #[test]
    fn route_error_keeps_summary_and_union() {
        let body = br#"{"error_summary": "path/not_found/..", "error": {".tag": "path", "path": {".tag": "not_found"}}}"#;
        let err = error_from_response("files/get_metadata", 409, JSON, body, None);
        assert_eq!(err.kind, ToolErrorKind::Conflict);
        assert_eq!(err.code, "ENDPOINT_ERROR");
        assert_eq!(err.message, "path/not_found/..");
        let details = err.details.unwrap();
        assert_eq!(details["error"]["path"][".tag"], "not_found");
        assert_eq!(details["status"], 409);
    }

    #[test]
    fn bad_input_uses_plain_text() {
        let err = error_from_response(
            "files/list_folder",
            400,
            Some("text/plain"),
            b"Error in call to API function \"files/list_folder\": missing path",
            None,
        );
        assert_eq!(err.kind, ToolErrorKind::InvalidParams);
        assert_eq!(err.code, "BAD_INPUT");
        assert!(err.message.contains("missing path"));
    }

    #[test]
    fn expired_token_is_distinguished() {
        let body = br#"{"error_summary": "expired_access_token/", "error": {".tag": "expired_access_token"}}"#;
        let err = error_from_response("users/get_current_account", 401, JSON, body, None);
        assert_eq!(err.code, "EXPIRED_ACCESS_TOKEN");
        let err = error_from_response("users/get_current_account", 401, JSON, b"{}", None);
        assert_eq!(err.code, "INVALID_ACCESS_TOKEN");
    }

    #[test]
    fn rate_limit_is_retryable_with_delay() {
        let err = error_from_response("files/upload", 429, JSON, b"{}", Some(3000));
        assert!(err.retryable);
        assert_eq!(err.code, "RATE_LIMITED");
        assert_eq!(err.details.unwrap()["retry_after_ms"], 3000);
    }

    #[test]
    fn retry_after_is_parsed_and_capped() {
        assert_eq!(parse_retry_after(Some("2")), Some(2000));
        assert_eq!(parse_retry_after(Some("0.5")), Some(500));
        assert_eq!(parse_retry_after(Some("100000")), Some(MAX_RETRY_AFTER_MS));
        assert_eq!(parse_retry_after(Some("soon")), None);
        assert_eq!(parse_retry_after(None), None);
    }
}
