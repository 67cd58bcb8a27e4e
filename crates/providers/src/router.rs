//! Provider construction from configuration.

use std::sync::Arc;
use threadline_config::AppConfig;
use threadline_core::error::ProviderError;
use threadline_core::provider::Provider;
use tracing::{info, warn};

use crate::openai_compat::OpenAiCompatProvider;

/// Build the model provider described by `config`.
///
/// The provider is named after the endpoint host so logs tell OpenAI,
/// OpenRouter, and local servers apart.
pub fn build_from_config(config: &AppConfig) -> Result<Arc<dyn Provider>, ProviderError> {
    if !config.has_api_key() {
        warn!("No API key configured; model calls will be rejected upstream");
    }

    let name = provider_name(&config.base_url);
    let provider = OpenAiCompatProvider::new(
        name,
        &config.base_url,
        config.api_key.clone().unwrap_or_default(),
    )?;

    info!(provider = name, model = %config.model, "Model provider ready");
    Ok(Arc::new(provider))
}

/// Derive a short provider name from a base URL.
fn provider_name(base_url: &str) -> &'static str {
    if base_url.contains("api.openai.com") {
        "openai"
    } else if base_url.contains("openrouter.ai") {
        "openrouter"
    } else if base_url.contains("localhost:11434") {
        "ollama"
    } else {
        "custom"
    }
}
