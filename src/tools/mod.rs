// Tools available to worker agents
//
// Tools are external collaborators: the agent system only sees their name,
// schema and `invoke`. Failures come back as `ToolError` and are turned into
// tool-result messages by the worker.

pub mod documents;
pub mod research;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::AppConfig;

pub use documents::DocumentStore;

/// Tool execution errors
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Tool schema for model function calling
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    /// Input parameters (JSON Schema)
    pub parameters: serde_json::Value,
}

impl ToolSchema {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {},
                "required": []
            }),
        }
    }

    pub fn with_parameters(mut self, parameters: serde_json::Value) -> Self {
        self.parameters = parameters;
        self
    }
}

/// Tool/function trait
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn schema(&self) -> ToolSchema;

    /// Runs the tool and returns its textual result
    async fn invoke(&self, arguments: serde_json::Value) -> Result<String, ToolError>;
}

/// Deserializes tool arguments, mapping failures to `InvalidArguments`
pub(crate) fn parse_arguments<T: serde::de::DeserializeOwned>(
    arguments: serde_json::Value,
) -> Result<T, ToolError> {
    serde_json::from_value(arguments).map_err(|e| ToolError::InvalidArguments(e.to_string()))
}

/// Tools by name
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Research and document tools configured from `config`
    pub fn standard(config: &AppConfig) -> Self {
        let store = DocumentStore::new(&config.document_root);
        let timeout = Duration::from_secs(config.scrape_timeout_secs);

        Self::new()
            .with(research::SearchWebTool)
            .with(research::ScrapeWebpagesTool::new(timeout))
            .with(documents::CreateOutlineTool::new(store.clone()))
            .with(documents::ReadDocumentTool::new(store.clone()))
            .with(documents::WriteDocumentTool::new(store.clone()))
            .with(documents::EditDocumentTool::new(store))
    }

    pub fn with(mut self, tool: impl Tool + 'static) -> Self {
        self.register(Arc::new(tool));
        self
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_registry_holds_every_roster_tool() {
        let config = AppConfig::default();
        let registry = ToolRegistry::standard(&config);

        assert_eq!(
            registry.names(),
            vec![
                "create_outline",
                "edit_document",
                "read_document",
                "scrape_webpages",
                "search_web",
                "write_document",
            ]
        );
    }

    #[test]
    fn invalid_arguments_are_reported() {
        #[derive(Debug, Deserialize)]
        struct Args {
            #[allow(dead_code)]
            urls: Vec<String>,
        }

        let err = parse_arguments::<Args>(serde_json::json!({})).unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
        assert!(err.to_string().contains("urls"));
    }
}
