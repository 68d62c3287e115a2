//! Research tools: web search placeholder and page scraping

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use super::{parse_arguments, Tool, ToolError, ToolSchema};

/// Longest page excerpt returned per URL, in characters
const MAX_PAGE_CHARS: usize = 10_000;

/// Web search stand-in; no search provider is configured
pub struct SearchWebTool;

#[derive(Debug, Deserialize)]
struct SearchArgs {
    query: String,
}

#[async_trait]
impl Tool for SearchWebTool {
    fn name(&self) -> &str {
        "search_web"
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema::new(
            self.name(),
            "Lightweight web search placeholder. Summarize what you would search \
             and what information you need.",
        )
        .with_parameters(json!({
            "type": "object",
            "properties": {
                "query": {"type": "string", "description": "Search query"}
            },
            "required": ["query"]
        }))
    }

    async fn invoke(&self, arguments: serde_json::Value) -> Result<String, ToolError> {
        let args: SearchArgs = parse_arguments(arguments)?;
        tracing::debug!(query = %args.query, "search_web called without a provider");

        Ok("Search is not enabled in this environment. Please provide specific URLs to scrape, \
            or describe what information you want me to extract."
            .to_string())
    }
}

/// Fetches pages and returns their text wrapped in `<Document>` tags
pub struct ScrapeWebpagesTool {
    client: reqwest::Client,
    timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct ScrapeArgs {
    urls: Vec<String>,
}

impl ScrapeWebpagesTool {
    pub fn new(timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            timeout,
        }
    }

    async fn fetch(&self, url: &str) -> Result<String, ToolError> {
        let response = self
            .client
            .get(url)
            .timeout(self.timeout)
            .send()
            .await?
            .error_for_status()?;
        Ok(response.text().await?)
    }
}

fn document(url: &str, body: &str) -> String {
    format!("<Document url=\"{}\">\n{}\n</Document>", url, body)
}

#[async_trait]
impl Tool for ScrapeWebpagesTool {
    fn name(&self) -> &str {
        "scrape_webpages"
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema::new(
            self.name(),
            "Fetch the provided web pages and return their raw text content concatenated.",
        )
        .with_parameters(json!({
            "type": "object",
            "properties": {
                "urls": {
                    "type": "array",
                    "items": {"type": "string"},
                    "description": "URLs to fetch"
                }
            },
            "required": ["urls"]
        }))
    }

    async fn invoke(&self, arguments: serde_json::Value) -> Result<String, ToolError> {
        let args: ScrapeArgs = parse_arguments(arguments)?;
        if args.urls.is_empty() {
            return Err(ToolError::InvalidArguments("no URLs given".to_string()));
        }

        let mut pages = Vec::with_capacity(args.urls.len());
        for url in &args.urls {
            match self.fetch(url).await {
                Ok(text) => {
                    let excerpt: String = text.chars().take(MAX_PAGE_CHARS).collect();
                    pages.push(document(url, &excerpt));
                }
                Err(e) => {
                    tracing::warn!(url = %url, "Failed to scrape page: {}", e);
                    pages.push(document(url, &format!("ERROR: {}", e)));
                }
            }
        }

        Ok(pages.join("\n\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn search_explains_it_is_disabled() {
        let result = SearchWebTool.invoke(json!({"query": "rust"})).await.unwrap();
        assert!(result.contains("Search is not enabled"));
    }

    #[tokio::test]
    async fn scrape_rejects_missing_urls() {
        let tool = ScrapeWebpagesTool::new(Duration::from_secs(1));

        let missing = tool.invoke(json!({})).await.unwrap_err();
        let empty = tool.invoke(json!({"urls": []})).await.unwrap_err();

        assert!(matches!(missing, ToolError::InvalidArguments(_)));
        assert!(matches!(empty, ToolError::InvalidArguments(_)));
    }

    #[tokio::test]
    async fn scrape_reports_unreachable_urls_inline() {
        let tool = ScrapeWebpagesTool::new(Duration::from_secs(1));

        let result = tool
            .invoke(json!({"urls": ["not a url"]}))
            .await
            .unwrap();

        assert!(result.starts_with("<Document url=\"not a url\">"));
        assert!(result.contains("ERROR:"));
    }
}
