//! Dropbox path conventions.
//!
//! The root folder is the empty string, every other path starts with `/`. Files can also be
//! addressed by id (`id:...`), revision (`rev:...`) or namespace (`ns:123/...`).

use crate::errors::ToolError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

/// Argument fields that carry a Dropbox path and get normalized before a request.
pub const PATH_FIELDS: &[&str] = &["path", "from_path", "to_path", "parent_path"];

/// Routes whose `path` is relative to a shared link and always starts with `/`, even at the
/// link's root.
pub const LINK_RELATIVE_ROUTES: &[&str] = &[
    "sharing/get_shared_link_metadata",
    "sharing/get_shared_link_file",
];

static NAMESPACE_PATH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^ns:[0-9]+(/.*)?$").expect("namespace path regex"));

pub fn is_root(path: &str) -> bool {
    path.is_empty() || path == "/"
}

/// Normalizes a user-supplied path: `/` and blanks become the root, a missing leading slash is
/// added, trailing slashes are dropped. `id:`/`rev:`/`ns:` references pass through untouched.
/// Whitespace is only ignored for the root check; names may end in spaces.
pub fn normalize_path(raw: &str) -> Result<String, ToolError> {
    if raw.contains('\0') {
        return Err(ToolError::invalid_params("Dropbox path must not contain null bytes"));
    }
    if is_root(raw.trim()) {
        return Ok(String::new());
    }
    if let Some(rest) = raw.strip_prefix("id:") {
        if rest.is_empty() {
            return Err(ToolError::invalid_params("Dropbox file id must not be empty"));
        }
        return Ok(raw.to_string());
    }
    if raw.starts_with("rev:") {
        return Ok(raw.to_string());
    }
    if raw.starts_with("ns:") {
        if !NAMESPACE_PATH.is_match(raw) {
            return Err(ToolError::invalid_params(format!(
                "Invalid namespace path '{}': expected ns:<id>[/path]",
                raw
            )));
        }
        return Ok(raw.to_string());
    }
    let mut path = if raw.starts_with('/') {
        raw.to_string()
    } else {
        format!("/{}", raw)
    };
    while path.len() > 1 && path.ends_with('/') {
        path.pop();
    }
    if path.contains("//") {
        return Err(ToolError::invalid_params(format!(
            "Invalid Dropbox path '{}': empty path segment",
            raw
        )));
    }
    Ok(path)
}

/// Path inside a shared link: a leading `/` is added, the link root stays `/`.
pub fn normalize_link_path(raw: &str) -> Result<String, ToolError> {
    if raw.contains('\0') {
        return Err(ToolError::invalid_params("Dropbox path must not contain null bytes"));
    }
    if raw.starts_with('/') {
        Ok(raw.to_string())
    } else {
        Ok(format!("/{}", raw))
    }
}

pub fn normalize_link_path_fields(value: &mut Value) -> Result<(), ToolError> {
    if let Some(Value::String(raw)) = value.get_mut("path") {
        *raw = normalize_link_path(raw)?;
    }
    Ok(())
}

/// Normalizes every path field in an argument tree, including nested commit info and batch
/// entries. String arrays under `paths` are normalized element-wise.
pub fn normalize_path_fields(value: &mut Value) -> Result<(), ToolError> {
    match value {
        Value::Object(map) => {
            for (key, field) in map.iter_mut() {
                match field {
                    Value::String(raw) if PATH_FIELDS.contains(&key.as_str()) => {
                        *raw = normalize_path(raw)?;
                    }
                    Value::Array(items) if key == "paths" => {
                        for item in items.iter_mut() {
                            if let Value::String(raw) = item {
                                *raw = normalize_path(raw)?;
                            }
                        }
                    }
                    other => normalize_path_fields(other)?,
                }
            }
            Ok(())
        }
        Value::Array(items) => items.iter_mut().try_for_each(normalize_path_fields),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn normalizes_nested_path_fields() {
        let mut args = json!({
            "entries": [{"from_path": "a/", "to_path": "/b"}],
            "commit": {"path": "c.txt", "mode": "add"},
            "paths": ["/", "d"],
            "url": "https://example.com/x/"
        });
        normalize_path_fields(&mut args).unwrap();
        assert_eq!(args["entries"][0]["from_path"], "/a");
        assert_eq!(args["entries"][0]["to_path"], "/b");
        assert_eq!(args["commit"]["path"], "/c.txt");
        assert_eq!(args["paths"], json!(["", "/d"]));
        assert_eq!(args["url"], "https://example.com/x/");

        let mut bad = json!({"entries": [{"path": "ns:x"}]});
        assert!(normalize_path_fields(&mut bad).is_err());
    }

    #[test]
    fn root_is_empty_string() {
        assert_eq!(normalize_path("/").unwrap(), "");
        assert_eq!(normalize_path("  ").unwrap(), "");
        assert_eq!(normalize_path("").unwrap(), "");
    }

    #[test]
    fn adds_leading_and_strips_trailing_slash() {
        assert_eq!(normalize_path("Photos/2024/").unwrap(), "/Photos/2024");
        assert_eq!(normalize_path("/Photos").unwrap(), "/Photos");
    }

    #[test]
    fn trailing_spaces_in_names_are_kept() {
        assert_eq!(normalize_path("/notes ").unwrap(), "/notes ");
        assert_eq!(normalize_path("a b ").unwrap(), "/a b ");
    }

    #[test]
    fn link_paths_keep_the_root_slash() {
        assert_eq!(normalize_link_path("/").unwrap(), "/");
        assert_eq!(normalize_link_path("").unwrap(), "/");
        assert_eq!(normalize_link_path("sub/file.txt").unwrap(), "/sub/file.txt");
        let mut arg = serde_json::json!({"url": "https://db.tt/x", "path": "/"});
        normalize_link_path_fields(&mut arg).unwrap();
        assert_eq!(arg["path"], "/");
    }

    #[test]
    fn references_pass_through() {
        assert_eq!(normalize_path("id:a4ayc_80_OEAAAAAAAAAYa").unwrap(), "id:a4ayc_80_OEAAAAAAAAAYa");
        assert_eq!(normalize_path("rev:a1c10ce0dd78").unwrap(), "rev:a1c10ce0dd78");
        assert_eq!(normalize_path("ns:1234/Docs").unwrap(), "ns:1234/Docs");
    }

    #[test]
    fn rejects_malformed_paths() {
        assert!(normalize_path("ns:abc").is_err());
        assert!(normalize_path("id:").is_err());
        assert!(normalize_path("/a//b").is_err());
    }
}
