//! Shared HTTP plumbing for tools that call public JSON APIs.
//!
//! Every transport or decoding failure is mapped to a [`ToolError`] so the
//! registry can hand it back to the model as an error value.

use reqwest::{Client, Url};
use serde::de::DeserializeOwned;
use std::time::Duration;
use threadline_core::error::ToolError;
use tracing::{debug, warn};

const USER_AGENT: &str = concat!("threadline/", env!("CARGO_PKG_VERSION"));

/// A JSON-over-HTTP client bound to one tool name and timeout.
#[derive(Clone)]
pub struct JsonClient {
    client: Client,
    tool_name: &'static str,
    timeout_secs: u64,
}

impl JsonClient {
    pub fn new(tool_name: &'static str, timeout_secs: u64) -> Self {
        // Timeout and user agent are also set per request, so the fallback
        // client still honours them.
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent(USER_AGENT)
            .build()
            .unwrap_or_else(|e| {
                warn!(tool = tool_name, error = %e, "HTTP client setup failed; using defaults");
                Client::new()
            });

        Self {
            client,
            tool_name,
            timeout_secs,
        }
    }

    /// Build a URL from a base, a path, and query parameters.
    pub fn url(&self, base: &str, path: &str, query: &[(&str, &str)]) -> Result<Url, ToolError> {
        let raw = format!("{}{}", base.trim_end_matches('/'), path);
        Url::parse_with_params(&raw, query).map_err(|e| self.failed(format!("bad URL {raw}: {e}")))
    }

    /// GET `url` and decode a JSON body.
    pub async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, ToolError> {
        debug!(tool = self.tool_name, %url, "Tool HTTP request");

        let response = self
            .client
            .get(url)
            .timeout(Duration::from_secs(self.timeout_secs))
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ToolError::Timeout {
                        tool_name: self.tool_name.into(),
                        timeout_secs: self.timeout_secs,
                    }
                } else {
                    self.failed(format!("network error: {e}"))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ToolError::UpstreamStatus {
                tool_name: self.tool_name.into(),
                status: status.as_u16(),
            });
        }

        response
            .json::<T>()
            .await
            .map_err(|e| self.failed(format!("malformed response: {e}")))
    }

    pub fn failed(&self, reason: impl Into<String>) -> ToolError {
        ToolError::ExecutionFailed {
            tool_name: self.tool_name.into(),
            reason: reason.into(),
        }
    }
}
