use crate::errors::ToolError;
use crate::utils::dropbox_path::normalize_path;
use base64::Engine;
use serde_json::Value;

/// Argument checks shared by the hand-written tools. Catalog schemas already ran by the time a
/// handler sees its arguments; these helpers cover what JSON Schema cannot express.
#[derive(Clone)]
pub struct Validation;

impl Validation {
    pub fn new() -> Self {
        Self
    }

    pub fn ensure_string(
        &self,
        value: &Value,
        label: &str,
        trim: bool,
    ) -> Result<String, ToolError> {
        let text = value.as_str().ok_or_else(|| {
            ToolError::invalid_params(format!("{} must be a non-empty string", label))
        })?;
        let normalized = text.trim();
        if normalized.is_empty() {
            return Err(ToolError::invalid_params(format!(
                "{} must be a non-empty string",
                label
            )));
        }
        Ok(if trim {
            normalized.to_string()
        } else {
            text.to_string()
        })
    }

    pub fn ensure_optional_string(
        &self,
        value: Option<&Value>,
        label: &str,
        trim: bool,
    ) -> Result<Option<String>, ToolError> {
        match value {
            None => Ok(None),
            Some(val) if val.is_null() => Ok(None),
            Some(val) => self.ensure_string(val, label, trim).map(Some),
        }
    }

    pub fn ensure_optional_bool(
        &self,
        value: Option<&Value>,
        label: &str,
    ) -> Result<Option<bool>, ToolError> {
        match value {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Bool(flag)) => Ok(Some(*flag)),
            Some(_) => Err(ToolError::invalid_params(format!(
                "{} must be a boolean",
                label
            ))),
        }
    }

    pub fn ensure_limit(
        &self,
        value: Option<&Value>,
        label: &str,
        min: u64,
        max: u64,
    ) -> Result<Option<u64>, ToolError> {
        let Some(value) = value.filter(|v| !v.is_null()) else {
            return Ok(None);
        };
        let numeric = value.as_u64().ok_or_else(|| {
            ToolError::invalid_params(format!(
                "{} must be an integer between {} and {}",
                label, min, max
            ))
        })?;
        if numeric < min || numeric > max {
            return Err(ToolError::invalid_params(format!(
                "{} must be an integer between {} and {}",
                label, min, max
            )));
        }
        Ok(Some(numeric))
    }

    pub fn ensure_path(&self, value: Option<&Value>, label: &str) -> Result<String, ToolError> {
        match value {
            None | Some(Value::Null) => Ok(String::new()),
            Some(Value::String(raw)) => normalize_path(raw),
            Some(_) => Err(ToolError::invalid_params(format!(
                "{} must be a string path",
                label
            ))),
        }
    }

    pub fn ensure_email(&self, value: &Value, label: &str) -> Result<String, ToolError> {
        let email = self.ensure_string(value, label, true)?;
        let valid = email
            .split_once('@')
            .map(|(user, domain)| !user.is_empty() && domain.contains('.') && !domain.ends_with('.'))
            .unwrap_or(false);
        if !valid {
            return Err(ToolError::invalid_params(format!(
                "{} must be an email address, got '{}'",
                label, email
            )));
        }
        Ok(email)
    }

    /// Reads a file body given either as UTF-8 `content` or as `content_base64`.
    pub fn ensure_content(&self, args: &Value) -> Result<Vec<u8>, ToolError> {
        let text = args.get("content").filter(|v| !v.is_null());
        let encoded = args.get("content_base64").filter(|v| !v.is_null());
        match (text, encoded) {
            (Some(_), Some(_)) => Err(ToolError::invalid_params(
                "Provide either content or content_base64, not both",
            )),
            (Some(text), None) => text
                .as_str()
                .map(|s| s.as_bytes().to_vec())
                .ok_or_else(|| ToolError::invalid_params("content must be a string")),
            (None, Some(encoded)) => {
                let raw = encoded
                    .as_str()
                    .ok_or_else(|| ToolError::invalid_params("content_base64 must be a string"))?;
                base64::engine::general_purpose::STANDARD
                    .decode(raw.trim())
                    .map_err(|err| {
                        ToolError::invalid_params(format!("content_base64 is not valid base64: {}", err))
                    })
            }
            (None, None) => Err(ToolError::invalid_params(
                "Missing file body: provide content or content_base64",
            )),
        }
    }
}

impl Default for Validation {
    fn default() -> Self {
        Self::new()
    }
}
