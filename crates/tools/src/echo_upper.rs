//! Echo-in-uppercase demo tool. Needs no network, handy for smoke tests.

use async_trait::async_trait;
use threadline_core::error::ToolError;
use threadline_core::tool::{Tool, ToolResult};

pub struct EchoUpperTool;

#[async_trait]
impl Tool for EchoUpperTool {
    fn name(&self) -> &str {
        "echo_upper"
    }

    fn description(&self) -> &str {
        "Returns the given text in UPPERCASE."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "text": {"type": "string", "description": "Text to uppercase"}
            },
            "required": ["text"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let text = arguments["text"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'text' argument".into()))?;
        Ok(ToolResult::text(text.to_uppercase()))
    }
}
