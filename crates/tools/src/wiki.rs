//! Encyclopedia summary tool backed by the Wikipedia REST API.

use async_trait::async_trait;
use serde::Deserialize;
use threadline_core::error::ToolError;
use threadline_core::tool::{Tool, ToolResult};

use crate::http::JsonClient;

pub struct WikiSummaryTool {
    http: JsonClient,
    base_url: String,
}

impl WikiSummaryTool {
    pub fn new(base_url: impl Into<String>, timeout_secs: u64) -> Self {
        Self {
            http: JsonClient::new("wiki_summary", timeout_secs),
            base_url: base_url.into(),
        }
    }

    fn summary_url(&self, topic: &str) -> Result<reqwest::Url, ToolError> {
        let mut url = self.http.url(&self.base_url, "", &[])?;
        url.set_query(None);

        // Page titles use underscores for spaces.
        let title = topic.split_whitespace().collect::<Vec<_>>().join("_");
        url.path_segments_mut()
            .map_err(|_| self.http.failed(format!("base URL cannot hold a path: {}", self.base_url)))?
            .pop_if_empty()
            .extend(["api", "rest_v1", "page", "summary", title.as_str()]);
        Ok(url)
    }
}

#[derive(Deserialize)]
struct Summary {
    title: String,
    #[serde(default)]
    extract: String,
    #[serde(default)]
    content_urls: Option<ContentUrls>,
}

#[derive(Deserialize)]
struct ContentUrls {
    desktop: PageUrl,
}

#[derive(Deserialize)]
struct PageUrl {
    page: String,
}

#[async_trait]
impl Tool for WikiSummaryTool {
    fn name(&self) -> &str {
        "wiki_summary"
    }

    fn description(&self) -> &str {
        "Fetch a short encyclopedia summary of a topic from Wikipedia."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "topic": {
                    "type": "string",
                    "description": "Article title or topic, e.g. 'Rust (programming language)'"
                }
            },
            "required": ["topic"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let topic = arguments["topic"]
            .as_str()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'topic' argument".into()))?;

        let summary: Summary = self.http.get_json(self.summary_url(topic)?).await?;

        Ok(ToolResult::structured(serde_json::json!({
            "title": summary.title,
            "extract": summary.extract,
            "url": summary.content_urls.map(|c| c.desktop.page),
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn title_is_path_encoded() {
        let tool = WikiSummaryTool::new("https://en.wikipedia.org", 5);
        let url = tool.summary_url("Rust (programming language)").unwrap();
        assert_eq!(
            url.as_str(),
            "https://en.wikipedia.org/api/rest_v1/page/summary/Rust_(programming_language)"
        );

        let url = tool.summary_url("AC/DC").unwrap();
        assert!(url.path().ends_with("/summary/AC%2FDC"));
    }

    #[tokio::test]
    async fn fetches_summary() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/rest_v1/page/summary/Alan_Turing"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "title": "Alan Turing",
                "extract": "Alan Mathison Turing was an English mathematician.",
                "content_urls": {"desktop": {"page": "https://en.wikipedia.org/wiki/Alan_Turing"}}
            })))
            .mount(&server)
            .await;

        let tool = WikiSummaryTool::new(server.uri(), 5);
        let result = tool
            .execute(serde_json::json!({"topic": "Alan Turing"}))
            .await
            .unwrap();

        let data = result.data.unwrap();
        assert_eq!(data["title"], "Alan Turing");
        assert!(data["extract"].as_str().unwrap().contains("mathematician"));
        assert_eq!(data["url"], "https://en.wikipedia.org/wiki/Alan_Turing");
    }

    #[tokio::test]
    async fn missing_page_is_upstream_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let tool = WikiSummaryTool::new(server.uri(), 5);
        let err = tool
            .execute(serde_json::json!({"topic": "Nonexistent page"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::UpstreamStatus { status: 404, .. }));
    }

    #[tokio::test]
    async fn malformed_body_fails() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let tool = WikiSummaryTool::new(server.uri(), 5);
        let err = tool
            .execute(serde_json::json!({"topic": "Anything"}))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("malformed response"));
    }
}
