//! Scripted model backend for deterministic testing
//!
//! Responses are chosen in this order:
//! 1. the first rule whose pattern appears in any prompt message,
//! 2. the next queued response,
//! 3. the fallback response.
//!
//! # Example
//!
//! ```rust,ignore
//! let model = ScriptedModel::new()
//!     .when("decide which worker", MockResponse::text("search"))
//!     .then(MockResponse::tool_call("search_web", json!({"query": "tokio"})))
//!     .then(MockResponse::text("Tokio is an async runtime."));
//! ```

use std::collections::VecDeque;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::model::{ChatModel, ModelError, ModelResponse};
use crate::agents::messages::{Message, ToolCall};
use crate::tools::ToolSchema;

/// A mock response configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MockResponse {
    /// Text content to return
    pub content: String,

    /// Tool calls to return
    pub tool_calls: Vec<ToolCall>,

    /// Whether this response should fail
    pub should_fail: Option<String>,

    /// Deliver the content through `on_token` word by word
    pub stream: bool,
}

impl MockResponse {
    /// Create a streamed text response
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            stream: true,
            ..Default::default()
        }
    }

    /// Create a response with a tool call
    pub fn tool_call(name: impl Into<String>, arguments: serde_json::Value) -> Self {
        Self::tool_calls(vec![(name, arguments)])
    }

    /// Create a response with multiple tool calls
    pub fn tool_calls(calls: Vec<(impl Into<String>, serde_json::Value)>) -> Self {
        let tool_calls = calls
            .into_iter()
            .map(|(name, arguments)| {
                ToolCall::new(format!("call_{}", Uuid::new_v4()), name, arguments)
            })
            .collect();

        Self {
            tool_calls,
            ..Default::default()
        }
    }

    /// Create a failing response
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            should_fail: Some(message.into()),
            ..Default::default()
        }
    }

    /// Return the content in one piece without token callbacks
    pub fn unstreamed(mut self) -> Self {
        self.stream = false;
        self
    }
}

struct Rule {
    pattern: String,
    response: MockResponse,
}

/// Deterministic `ChatModel` driven by rules and a queue
pub struct ScriptedModel {
    rules: Vec<Rule>,
    queue: Mutex<VecDeque<MockResponse>>,
    fallback: MockResponse,
    calls: Mutex<Vec<Vec<Message>>>,
}

impl Default for ScriptedModel {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedModel {
    pub fn new() -> Self {
        Self {
            rules: Vec::new(),
            queue: Mutex::new(VecDeque::new()),
            fallback: MockResponse::text("OK"),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Answer with `response` whenever any prompt message contains `pattern`
    pub fn when(mut self, pattern: impl Into<String>, response: MockResponse) -> Self {
        self.rules.push(Rule {
            pattern: pattern.into(),
            response,
        });
        self
    }

    /// Queue a response for the next unmatched call
    pub fn then(self, response: MockResponse) -> Self {
        self.queue.lock().push_back(response);
        self
    }

    /// Response used when no rule matches and the queue is empty
    pub fn otherwise(mut self, response: MockResponse) -> Self {
        self.fallback = response;
        self
    }

    /// Every prompt received so far, in call order
    pub fn calls(&self) -> Vec<Vec<Message>> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    fn pick(&self, messages: &[Message]) -> MockResponse {
        let matched = self.rules.iter().find(|rule| {
            messages
                .iter()
                .any(|message| message.content().contains(&rule.pattern))
        });

        match matched {
            Some(rule) => rule.response.clone(),
            None => self
                .queue
                .lock()
                .pop_front()
                .unwrap_or_else(|| self.fallback.clone()),
        }
    }
}

#[async_trait]
impl ChatModel for ScriptedModel {
    async fn complete(
        &self,
        messages: &[Message],
        _tools: &[ToolSchema],
        on_token: &mut (dyn for<'t> FnMut(&'t str) + Send),
    ) -> Result<ModelResponse, ModelError> {
        self.calls.lock().push(messages.to_vec());
        let response = self.pick(messages);

        if let Some(message) = response.should_fail {
            return Err(ModelError::Unavailable(message));
        }

        if response.stream {
            for piece in response.content.split_inclusive(char::is_whitespace) {
                on_token(piece);
            }
        }

        Ok(ModelResponse {
            content: response.content,
            tool_calls: response.tool_calls,
        })
    }
}
