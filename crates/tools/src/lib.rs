//! Built-in tool implementations for Threadline.
//!
//! Tools are only offered to the model when a message opens with a trigger
//! prefix; see the agent crate's tool gate.

pub mod echo_upper;
pub mod http;
pub mod weather;
pub mod wiki;

use threadline_config::ToolsConfig;
use threadline_core::tool::ToolRegistry;

pub use echo_upper::EchoUpperTool;
pub use weather::WeatherTool;
pub use wiki::WikiSummaryTool;

/// Create the tool registry with all built-in tools, wired to `config`.
pub fn default_registry(config: &ToolsConfig) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Box::new(WeatherTool::new(
        &config.geocoding_base_url,
        &config.weather_base_url,
        config.http_timeout_secs,
    )));
    registry.register(Box::new(WikiSummaryTool::new(
        &config.wiki_base_url,
        config.http_timeout_secs,
    )));
    registry.register(Box::new(EchoUpperTool));
    registry
}
