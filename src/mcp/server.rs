use crate::app::App;
use crate::constants::server::{NAME, PROTOCOL_VERSION, VERSION};
use crate::errors::{ErrorCode, McpError, ToolError};
use crate::mcp::catalog::{list_tools, validate_tool_args};
use crate::mcp::protocol::{JsonRpcRequest, JsonRpcResponse};
use crate::services::logger::Logger;
use serde_json::Value;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};

pub struct McpServer {
    app: Arc<App>,
    logger: Logger,
}

impl McpServer {
    pub fn new(app: Arc<App>) -> Self {
        let logger = app.logger.child("mcp");
        Self { app, logger }
    }

    fn handle_initialize(&self) -> Value {
        serde_json::json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {"tools": {"listChanged": false}},
            "serverInfo": {"name": NAME, "version": VERSION},
        })
    }

    fn handle_tools_list(&self) -> Value {
        serde_json::json!({ "tools": list_tools() })
    }

    /// Schema problems and unknown tools are protocol errors; anything the tool itself reports
    /// comes back as an `isError` result so the model can read and react to it.
    pub async fn handle_tools_call(&self, name: &str, raw_args: Value) -> Result<Value, McpError> {
        if !self.app.tool_executor.has_tool(name) {
            let err = self.app.tool_executor.unknown_tool_error(name);
            return Err(McpError::from(&err));
        }
        let args = match raw_args {
            Value::Null => Value::Object(Default::default()),
            other => other,
        };
        validate_tool_args(name, &args)?;

        let (payload, is_error) = match self.app.tool_executor.execute(name, args).await {
            Ok(envelope) => (envelope, false),
            Err(err) => (err.to_payload(), true),
        };
        let text = serde_json::to_string(&payload)
            .map_err(|err| McpError::new(ErrorCode::InternalError, err.to_string()))?;
        let mut result = serde_json::json!({
            "content": [ { "type": "text", "text": text } ],
        });
        if is_error {
            result["isError"] = Value::Bool(true);
        }
        Ok(result)
    }

    /// Handles one line of input; `None` means nothing is written back (notifications).
    pub async fn handle_line(&self, line: &str) -> Option<JsonRpcResponse> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return None;
        }
        let parsed: Value = match serde_json::from_str(trimmed) {
            Ok(value) => value,
            Err(_) => {
                return Some(JsonRpcResponse::failure(
                    Value::Null,
                    ErrorCode::ParseError.as_i32(),
                    "Parse error".to_string(),
                ))
            }
        };
        let request: JsonRpcRequest = match serde_json::from_value(parsed) {
            Ok(req) => req,
            Err(_) => {
                return Some(JsonRpcResponse::failure(
                    Value::Null,
                    ErrorCode::InvalidRequest.as_i32(),
                    "Invalid request".to_string(),
                ))
            }
        };
        self.handle_request(request).await
    }

    pub async fn handle_request(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        // Requests without an id are notifications and never get a response.
        let id = request.id.clone()?;
        if request.jsonrpc != "2.0" {
            return Some(JsonRpcResponse::failure(
                id,
                ErrorCode::InvalidRequest.as_i32(),
                "Invalid request: jsonrpc must be \"2.0\"".to_string(),
            ));
        }
        let response = match request.method.as_str() {
            "initialize" => JsonRpcResponse::success(id, self.handle_initialize()),
            "ping" => JsonRpcResponse::success(id, serde_json::json!({})),
            "tools/list" => JsonRpcResponse::success(id, self.handle_tools_list()),
            "tools/call" => {
                let params = request.params.as_object().cloned().unwrap_or_default();
                let name = params.get("name").and_then(|v| v.as_str()).unwrap_or("");
                if name.is_empty() {
                    JsonRpcResponse::failure(
                        id,
                        ErrorCode::InvalidParams.as_i32(),
                        "Missing tool name".to_string(),
                    )
                } else {
                    let args = params.get("arguments").cloned().unwrap_or(Value::Null);
                    match self.handle_tools_call(name, args).await {
                        Ok(result) => JsonRpcResponse::success(id, result),
                        Err(err) => JsonRpcResponse::from_error(id, err),
                    }
                }
            }
            _ if request.method.starts_with("notifications/") => {
                JsonRpcResponse::success(id, serde_json::json!({}))
            }
            other => JsonRpcResponse::failure(
                id,
                ErrorCode::MethodNotFound.as_i32(),
                format!("Method not found: {}", other),
            ),
        };
        Some(response)
    }

    pub async fn run_stdio(&self) -> Result<(), ToolError> {
        let stdin = tokio::io::stdin();
        let stdout = tokio::io::stdout();
        let mut reader = BufReader::new(stdin).lines();
        let mut writer = BufWriter::new(stdout);
        self.logger.info(
            "serving MCP over stdio",
            Some(&serde_json::json!({ "version": VERSION })),
        );

        while let Some(line) = reader.next_line().await? {
            let Some(response) = self.handle_line(&line).await else {
                continue;
            };
            let payload = serde_json::to_string(&response)?;
            if let Err(err) = write_line(&mut writer, &payload).await {
                self.logger.error(
                    "failed to write response",
                    Some(&serde_json::json!({ "error": err.to_string() })),
                );
                return Err(err.into());
            }
        }

        self.logger.info("stdin closed, shutting down", Some(&self.logger.stats()));
        Ok(())
    }
}

async fn write_line<W: AsyncWriteExt + Unpin>(writer: &mut W, line: &str) -> std::io::Result<()> {
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await
}

pub async fn run_stdio() -> Result<(), ToolError> {
    let app = App::initialize()?;
    McpServer::new(Arc::new(app)).run_stdio().await
}
