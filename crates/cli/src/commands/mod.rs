//! CLI subcommands.

pub mod chat;
pub mod forget;
pub mod history;
pub mod serve;

use std::path::Path;

use threadline_agent::ChatService;
use threadline_config::AppConfig;

/// Load configuration from `path`, or the default location.
pub fn load_config(path: Option<&Path>) -> Result<AppConfig, Box<dyn std::error::Error>> {
    tracing::debug!(path = ?path, "Loading config");
    let config = match path {
        Some(path) => AppConfig::load_with_env(path),
        None => AppConfig::load(),
    };
    Ok(config.map_err(|e| format!("Failed to load config: {e}"))?)
}

/// Build the chat service the same way the gateway does.
pub async fn build_service(config: &AppConfig) -> Result<ChatService, Box<dyn std::error::Error>> {
    let provider = threadline_providers::build_from_config(config)?;
    tracing::debug!(provider = provider.name(), model = %config.model, "Provider ready");
    Ok(ChatService::from_config(config, provider).await?)
}
