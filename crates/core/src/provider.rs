//! Provider trait: the abstraction over the language model.
//!
//! A Provider takes the assembled message list and returns a reply,
//! optionally annotated with tool-call requests. Whether the model may
//! request tools is decided by the caller and passed explicitly as
//! `tools_enabled`; a provider never advertises tools when it is false.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;
use crate::message::Message;
use crate::token;

/// Configuration for a provider request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderRequest {
    /// The model to use (e.g., "gpt-4o-mini")
    pub model: String,

    /// The conversation messages, system message first
    pub messages: Vec<Message>,

    /// Temperature (0.0 = deterministic, 1.0 = creative)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens to generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Whether the model may request tool invocations on this call
    #[serde(default)]
    pub tools_enabled: bool,

    /// Tools the model may call when `tools_enabled` is set
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,
}

fn default_temperature() -> f32 {
    0.2
}

impl ProviderRequest {
    /// The tool definitions that should actually be sent upstream.
    pub fn advertised_tools(&self) -> &[ToolDefinition] {
        if self.tools_enabled {
            self.tools.as_slice()
        } else {
            &[]
        }
    }
}

/// A tool definition sent to the model so it knows what tools it can call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// The tool name
    pub name: String,

    /// Description of what the tool does
    pub description: String,

    /// JSON Schema describing the tool's parameters
    pub parameters: serde_json::Value,
}

/// A complete response from a provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderResponse {
    /// The generated assistant message
    pub message: Message,

    /// Token usage statistics
    pub usage: Option<Usage>,

    /// Which model actually responded (may differ from requested)
    pub model: String,
}

/// Token usage information.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// The core Provider trait.
///
/// The turn controller calls `complete()` without knowing which backend is
/// in use. `count_tokens()` is the token-counting capability the history
/// trimmer delegates to.
#[async_trait]
pub trait Provider: Send + Sync {
    /// A human-readable name for this provider (e.g., "openai").
    fn name(&self) -> &str;

    /// Send a request and get a complete response.
    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError>;

    /// Estimate how many prompt tokens `messages` would cost.
    ///
    /// Default implementation is the character heuristic in [`token`].
    fn count_tokens(&self, messages: &[Message]) -> usize {
        token::estimate_messages_tokens(messages)
    }

    /// Health check: can we reach the provider?
    async fn health_check(&self) -> Result<bool, ProviderError> {
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(tools_enabled: bool) -> ProviderRequest {
        ProviderRequest {
            model: "gpt-4o-mini".into(),
            messages: vec![],
            temperature: default_temperature(),
            max_tokens: None,
            tools_enabled,
            tools: vec![ToolDefinition {
                name: "get_weather".into(),
                description: "Current weather for a city".into(),
                parameters: serde_json::json!({"type": "object"}),
            }],
        }
    }

    #[test]
    fn tools_hidden_when_disabled() {
        assert!(request(false).advertised_tools().is_empty());
        assert_eq!(request(true).advertised_tools().len(), 1);
    }

    #[test]
    fn provider_request_defaults() {
        let req: ProviderRequest =
            serde_json::from_str(r#"{"model":"m","messages":[]}"#).unwrap();
        assert!((req.temperature - 0.2).abs() < f32::EPSILON);
        assert!(!req.tools_enabled);
        assert!(req.tools.is_empty());
    }

    #[test]
    fn tool_definition_serialization() {
        let tool = ToolDefinition {
            name: "wiki_summary".into(),
            description: "Summarize an encyclopedia article".into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "topic": { "type": "string" }
                },
                "required": ["topic"]
            }),
        };
        let json = serde_json::to_string(&tool).unwrap();
        assert!(json.contains("wiki_summary"));
        assert!(json.contains("topic"));
    }
}
