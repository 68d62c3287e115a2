//! Model backend seam
//!
//! `ChatModel` is the only thing the agent system knows about a language
//! model. Every call goes through [`generate`], which reports the call to a
//! [`GenerationObserver`] so token streaming can be filtered per run.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::agents::events::{GenerationObserver, RunId};
use crate::agents::messages::{Message, ToolCall};
use crate::tools::ToolSchema;

/// Model backend errors
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Model API returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Invalid response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Model unavailable: {0}")]
    Unavailable(String),
}

/// Complete result of one model call
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelResponse {
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
}

impl ModelResponse {
    /// Assistant message carrying this response, tool calls included
    pub fn to_message(&self) -> Message {
        Message::assistant(self.content.clone()).with_tool_calls(self.tool_calls.clone())
    }
}

/// Language model backend
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Runs one completion over `messages`. Implementations that stream call
    /// `on_token` for every text delta as it arrives; the returned response
    /// always carries the full text.
    async fn complete(
        &self,
        messages: &[Message],
        tools: &[ToolSchema],
        on_token: &mut (dyn for<'t> FnMut(&'t str) + Send),
    ) -> Result<ModelResponse, ModelError>;
}

/// Calls `model` as one observed generation run
pub async fn generate(
    model: &dyn ChatModel,
    observer: &dyn GenerationObserver,
    messages: &[Message],
    tools: &[ToolSchema],
) -> Result<ModelResponse, ModelError> {
    let run_id = RunId::new();
    observer.on_start(&run_id, messages);

    let mut on_token = |text: &str| observer.on_chunk(&run_id, text);
    let result = model.complete(messages, tools, &mut on_token).await;

    match &result {
        Ok(_) => observer.on_end(&run_id),
        Err(e) => observer.on_error(&run_id, &e.to_string()),
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::mock::{MockResponse, ScriptedModel};
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    impl GenerationObserver for Recorder {
        fn on_start(&self, _run_id: &RunId, prompt: &[Message]) {
            self.events.lock().push(format!("start:{}", prompt.len()));
        }

        fn on_chunk(&self, _run_id: &RunId, text: &str) {
            self.events.lock().push(format!("chunk:{}", text));
        }

        fn on_end(&self, _run_id: &RunId) {
            self.events.lock().push("end".to_string());
        }

        fn on_error(&self, _run_id: &RunId, message: &str) {
            self.events.lock().push(format!("error:{}", message));
        }
    }

    #[tokio::test]
    async fn generate_reports_full_lifecycle() {
        let model = ScriptedModel::new().then(MockResponse::text("Hello world"));
        let recorder = Recorder::default();

        let response = generate(&model, &recorder, &[Message::user("hi")], &[])
            .await
            .unwrap();

        assert_eq!(response.content, "Hello world");
        assert_eq!(
            *recorder.events.lock(),
            vec!["start:1", "chunk:Hello ", "chunk:world", "end"]
        );
    }

    #[tokio::test]
    async fn generate_reports_failures() {
        let model = ScriptedModel::new().then(MockResponse::error("backend down"));
        let recorder = Recorder::default();

        let result = generate(&model, &recorder, &[Message::user("hi")], &[]).await;

        assert!(result.is_err());
        assert_eq!(
            *recorder.events.lock(),
            vec!["start:1", "error:Model unavailable: backend down"]
        );
    }
}
