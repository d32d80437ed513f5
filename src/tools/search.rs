//! Web search through the langsearch.com API

use super::{parse_input, Tool, ToolContext, ToolOutput};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://api.langsearch.com";
const NUM_RESULTS: u32 = 2;

#[derive(Debug, Clone)]
pub struct SearchConfig {
    pub api_key: Option<String>,
    pub base_url: String,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }
}

impl SearchConfig {
    pub fn from_env() -> Self {
        Self {
            api_key: std::env::var("LANGSEARCH_API_KEY")
                .ok()
                .filter(|k| !k.is_empty()),
            base_url: std::env::var("LANGSEARCH_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_BASE_URL.to_string()),
        }
    }
}

pub struct SearchTool {
    client: Client,
    config: SearchConfig,
}

#[derive(Debug, Deserialize)]
struct SearchInput {
    query: String,
}

impl SearchTool {
    pub fn new(config: SearchConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();
        Self { client, config }
    }

    async fn search(&self, api_key: &str, query: &str) -> Result<Value, String> {
        let url = format!("{}/v1/web-search", self.config.base_url.trim_end_matches('/'));

        let response = self
            .client
            .post(&url)
            .bearer_auth(api_key)
            .json(&json!({ "query": query, "num_results": NUM_RESULTS }))
            .send()
            .await
            .map_err(|e| format!("Search request failed: {e}"))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(format!("Search failed with HTTP {}: {body}", status.as_u16()));
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| format!("Invalid search response: {e}"))
    }
}

#[async_trait]
impl Tool for SearchTool {
    fn name(&self) -> &'static str {
        "search_tool"
    }

    fn description(&self) -> String {
        "Search the web for current information and return the top results as JSON. \
         Use for facts that may have changed recently or that you are unsure about."
            .to_string()
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "required": ["query"],
            "properties": {
                "query": {"type": "string", "description": "Search query"}
            }
        })
    }

    async fn run(&self, input: Value, ctx: ToolContext) -> ToolOutput {
        let input: SearchInput = match parse_input(input) {
            Ok(i) => i,
            Err(e) => return e,
        };

        let Some(api_key) = self.config.api_key.as_deref() else {
            return ToolOutput::json_error("LANGSEARCH_API_KEY is not set");
        };

        tokio::select! {
            () = ctx.cancel.cancelled() => ToolOutput::json_error("search cancelled"),
            result = self.search(api_key, &input.query) => match result {
                Ok(value) => ToolOutput::json(&value),
                Err(e) => {
                    tracing::warn!(session_id = %ctx.session_id, error = %e, "Search failed");
                    ToolOutput::json_error(e)
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::ResultKind;
    use crate::tools::test_context;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn tool_for(server: &MockServer) -> SearchTool {
        SearchTool::new(SearchConfig {
            api_key: Some("secret".to_string()),
            base_url: server.uri(),
        })
    }

    #[tokio::test]
    async fn test_search_returns_json() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/web-search"))
            .and(header("authorization", "Bearer secret"))
            .and(body_json(json!({"query": "rust", "num_results": 2})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": {"webPages": {"value": [{"name": "Rust", "url": "https://rust-lang.org"}]}}
            })))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let result = tool_for(&server)
            .run(json!({"query": "rust"}), test_context(dir.path()))
            .await;

        assert!(result.success, "{}", result.output);
        assert_eq!(result.kind, ResultKind::Json);
        let value: Value = serde_json::from_str(&result.output).unwrap();
        assert_eq!(value["data"]["webPages"]["value"][0]["name"], "Rust");
    }

    #[tokio::test]
    async fn test_search_http_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let result = tool_for(&server)
            .run(json!({"query": "rust"}), test_context(dir.path()))
            .await;

        assert!(!result.success);
        let value: Value = serde_json::from_str(&result.output).unwrap();
        assert!(value["error"].as_str().unwrap().contains("401"));
    }

    #[tokio::test]
    async fn test_search_without_key() {
        let dir = tempfile::tempdir().unwrap();
        let result = SearchTool::new(SearchConfig::default())
            .run(json!({"query": "rust"}), test_context(dir.path()))
            .await;
        assert!(!result.success);
        assert!(result.output.contains("LANGSEARCH_API_KEY"));
    }
}
