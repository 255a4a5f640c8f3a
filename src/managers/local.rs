use crate::constants::content_hash::BLOCK_SIZE;
use crate::dropbox::content_hash::ContentHasher;
use crate::errors::ToolError;
use crate::services::logger::Logger;
use crate::services::tool_executor::ToolHandler;
use crate::services::validation::Validation;
use serde_json::Value;

pub const LOCAL_TOOLS: &[&str] = &["content_hash"];

/// Tools answered without a Dropbox request.
#[derive(Clone)]
pub struct LocalManager {
    logger: Logger,
    validation: Validation,
}

impl LocalManager {
    pub fn new(logger: Logger, validation: Validation) -> Self {
        Self {
            logger: logger.child("local"),
            validation,
        }
    }

    fn content_hash(&self, args: &Value) -> Result<Value, ToolError> {
        let bytes = self.validation.ensure_content(args)?;
        let mut hasher = ContentHasher::new();
        hasher.update(&bytes);
        let hash = hasher.finish();
        self.logger.debug(
            "content_hash",
            Some(&serde_json::json!({ "bytes": bytes.len() })),
        );
        Ok(serde_json::json!({
            "content_hash": hash,
            "bytes": bytes.len(),
            "block_size": BLOCK_SIZE,
        }))
    }
}

#[async_trait::async_trait]
impl ToolHandler for LocalManager {
    async fn handle(&self, args: Value) -> Result<Value, ToolError> {
        self.content_hash(&args)
    }
}
