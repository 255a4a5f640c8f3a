use crate::dropbox::DropboxClient;
use crate::errors::ToolError;
use crate::managers::composite::{CompositeManager, CompositeTool, COMPOSITE_TOOLS};
use crate::managers::endpoint::EndpointTool;
use crate::managers::local::{LocalManager, LOCAL_TOOLS};
use crate::mcp::catalog::{schema_compile_failures, tool_catalog};
use crate::services::config::DropboxConfig;
use crate::services::logger::Logger;
use crate::services::tool_executor::{ToolExecutor, ToolHandler};
use crate::services::validation::Validation;
use std::collections::HashMap;
use std::sync::Arc;

pub struct App {
    pub logger: Logger,
    pub config: Arc<DropboxConfig>,
    pub tool_executor: Arc<ToolExecutor>,
}

impl App {
    fn validate_tool_wiring(handlers: &HashMap<String, Arc<dyn ToolHandler>>) -> Result<(), ToolError> {
        let mut missing: Vec<String> = tool_catalog()
            .iter()
            .filter(|tool| !handlers.contains_key(&tool.name))
            .map(|tool| tool.name.clone())
            .collect();
        let broken = schema_compile_failures();
        if missing.is_empty() && broken.is_empty() {
            return Ok(());
        }
        missing.sort();
        Err(ToolError::internal("Tool wiring is incomplete")
            .with_hint("Every tool in tool_catalog.json needs a compiling schema and a handler")
            .with_details(serde_json::json!({
                "missing_tools": missing,
                "invalid_schemas": broken,
            })))
    }

    /// Builds the app from `DROPBOX_*` environment variables.
    pub fn initialize() -> Result<Self, ToolError> {
        let config = DropboxConfig::from_env()?;
        Self::with_config(config)
    }

    pub fn with_config(config: DropboxConfig) -> Result<Self, ToolError> {
        let logger = Logger::new("dropbox");
        let validation = Validation::new();
        let config = Arc::new(config);
        if !config.has_credentials() {
            logger.warn(
                "no Dropbox credentials configured; tools that call Dropbox will fail",
                None,
            );
        }

        let client = Arc::new(DropboxClient::new(config.clone(), logger.clone())?);
        let composite = Arc::new(CompositeManager::new(
            logger.clone(),
            client.clone(),
            validation.clone(),
        ));
        let local = Arc::new(LocalManager::new(logger.clone(), validation.clone()));

        let mut handlers: HashMap<String, Arc<dyn ToolHandler>> = HashMap::new();
        for entry in tool_catalog().iter() {
            if let Some(tool) =
                EndpointTool::from_entry(entry, client.clone(), validation.clone(), &logger)
            {
                handlers.insert(entry.name.clone(), Arc::new(tool));
            }
        }
        for name in COMPOSITE_TOOLS {
            handlers.insert(
                (*name).to_string(),
                Arc::new(CompositeTool::new(name, composite.clone())),
            );
        }
        for name in LOCAL_TOOLS {
            handlers.insert((*name).to_string(), local.clone());
        }

        Self::validate_tool_wiring(&handlers)?;
        logger.debug(
            "tools wired",
            Some(&serde_json::json!({ "count": handlers.len() })),
        );

        let tool_executor = Arc::new(ToolExecutor::new(logger.clone(), handlers));
        Ok(Self {
            logger,
            config,
            tool_executor,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_catalog_tool_has_a_handler() {
        let app = App::with_config(DropboxConfig::new(None)).unwrap();
        for tool in tool_catalog() {
            assert!(app.tool_executor.has_tool(&tool.name), "{} is unwired", tool.name);
        }
        assert_eq!(app.tool_executor.tool_names().len(), tool_catalog().len());
    }

    #[test]
    fn wiring_check_reports_missing_tools() {
        let err = App::validate_tool_wiring(&HashMap::new()).unwrap_err();
        let missing = err.details.unwrap()["missing_tools"].clone();
        assert!(missing.as_array().unwrap().iter().any(|v| v == "get_metadata"));
    }
}
