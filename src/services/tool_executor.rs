use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use crate::errors::ToolError;
use crate::services::logger::Logger;
use crate::utils::suggest::suggest;

use serde_json::Value;

#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn handle(&self, args: Value) -> Result<Value, ToolError>;
}

#[derive(Clone)]
pub struct ToolExecutor {
    logger: Logger,
    handlers: Arc<HashMap<String, Arc<dyn ToolHandler>>>,
}

impl ToolExecutor {
    pub fn new(logger: Logger, handlers: HashMap<String, Arc<dyn ToolHandler>>) -> Self {
        Self {
            logger: logger.child("executor"),
            handlers: Arc::new(handlers),
        }
    }

    pub fn has_tool(&self, tool: &str) -> bool {
        self.handlers.contains_key(tool)
    }

    pub fn tool_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn unknown_tool_error(&self, tool: &str) -> ToolError {
        let candidates = self.tool_names();
        let suggestions = suggest(tool, &candidates, 5);
        let hint = if suggestions.is_empty() {
            "Call tools/list to see the available tools".to_string()
        } else {
            format!("Did you mean: {}", suggestions.join(", "))
        };
        ToolError::invalid_params(format!("Unknown tool: {}", tool))
            .with_code("UNKNOWN_TOOL")
            .with_hint(hint)
    }

    fn wrap_result(&self, tool: &str, trace_id: &str, started: Instant, result: Value) -> Value {
        serde_json::json!({
            "ok": true,
            "result": result,
            "meta": {
                "tool": tool,
                "trace_id": trace_id,
                "duration_ms": started.elapsed().as_millis() as u64,
            },
        })
    }

    pub async fn execute(&self, tool: &str, args: Value) -> Result<Value, ToolError> {
        let started = Instant::now();
        let Some(handler) = self.handlers.get(tool) else {
            return Err(self.unknown_tool_error(tool));
        };

        let mut args = match args {
            Value::Null => Value::Object(Default::default()),
            other => other,
        };
        let trace_id = args
            .get("trace_id")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        if let Value::Object(map) = &mut args {
            map.remove("trace_id");
        }

        self.logger
            .debug(tool, Some(&serde_json::json!({ "trace_id": trace_id })));

        match handler.handle(args).await {
            Ok(result) => Ok(self.wrap_result(tool, &trace_id, started, result)),
            Err(err) => {
                self.logger.warn(
                    &format!("{} failed", tool),
                    Some(&serde_json::json!({
                        "trace_id": trace_id,
                        "code": err.code,
                        "kind": err.kind,
                        "duration_ms": started.elapsed().as_millis() as u64,
                    })),
                );
                Err(err)
            }
        }
    }
}
