use serde::Serialize;
use serde_json::Value;
use std::fmt;

use super::{ToolError, ToolErrorKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[repr(i32)]
pub enum ErrorCode {
    ParseError = -32700,
    InvalidRequest = -32600,
    MethodNotFound = -32601,
    InvalidParams = -32602,
    InternalError = -32603,
}

impl ErrorCode {
    pub fn as_i32(self) -> i32 {
        self as i32
    }
}

/// JSON-RPC level failure. Tool execution failures are reported inside a
/// successful `tools/call` result instead; see `mcp::server`.
#[derive(Debug, Clone, Serialize)]
pub struct McpError {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl McpError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidParams, message)
    }
}

impl From<&ToolError> for McpError {
    fn from(err: &ToolError) -> Self {
        let code = match err.kind {
            ToolErrorKind::InvalidParams | ToolErrorKind::NotFound => ErrorCode::InvalidParams,
            _ => ErrorCode::InternalError,
        };
        let mut message = err.message.clone();
        if let Some(hint) = &err.hint {
            message.push_str("\nhint: ");
            message.push_str(hint);
        }
        Self::new(code, message).with_data(serde_json::json!({
            "code": err.code,
            "details": err.details,
        }))
    }
}

impl fmt::Display for McpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for McpError {}
