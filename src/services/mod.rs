pub mod config;
pub mod logger;
pub mod token_provider;
pub mod tool_executor;
pub mod validation;
