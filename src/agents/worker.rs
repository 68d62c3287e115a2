use std::sync::Arc;

use serde_json::json;

use super::context::ExecutionScope;
use super::errors::AgentResult;
use super::messages::{Message, ToolCall};
use super::state::{Command, ExecutionState, Goto, StatePatch};
use crate::llm::{generate, ChatModel, ModelResponse};
use crate::tools::Tool;

/// Worker Agent that runs a tool-using think/act loop for one team member
pub struct WorkerNode {
    name: String,
    instruction: Option<String>,
    tools: Vec<Arc<dyn Tool>>,
    model: Arc<dyn ChatModel>,
    max_iterations: usize,
    tools_enabled: bool,
}

impl WorkerNode {
    pub fn new(name: impl Into<String>, model: Arc<dyn ChatModel>, max_iterations: usize) -> Self {
        Self {
            name: name.into(),
            instruction: None,
            tools: Vec::new(),
            model,
            max_iterations,
            tools_enabled: true,
        }
    }

    pub fn with_instruction(mut self, instruction: Option<String>) -> Self {
        self.instruction = instruction;
        self
    }

    pub fn with_tools(mut self, tools: Vec<Arc<dyn Tool>>) -> Self {
        self.tools = tools;
        self
    }

    /// When disabled the model is never offered tools, so the loop ends after
    /// the first response
    pub fn with_tools_enabled(mut self, enabled: bool) -> Self {
        self.tools_enabled = enabled;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Runs the tool loop over the current history and hands a labeled
    /// message back to the team supervisor.
    ///
    /// The loop stops at the first response without tool calls or after
    /// `max_iterations` model calls, whichever comes first; in both cases the
    /// last response becomes the worker's message. Tool failures are fed back
    /// to the model as error results and never end the loop. With tools
    /// disabled the first response is final and its tool calls are ignored.
    pub async fn run(&self, state: &ExecutionState, scope: ExecutionScope<'_>) -> AgentResult<Command> {
        let _node = scope.context.enter_node(&self.name);

        let mut transcript: Vec<Message> = self
            .instruction
            .iter()
            .map(Message::system)
            .chain(state.history().iter().cloned())
            .collect();

        let schemas = if self.tools_enabled {
            self.tools.iter().map(|tool| tool.schema()).collect()
        } else {
            Vec::new()
        };

        let mut last = ModelResponse::default();
        for iteration in 1..=self.max_iterations {
            let response =
                generate(self.model.as_ref(), scope.observer, &transcript, &schemas).await?;
            transcript.push(response.to_message());
            let calls = response.tool_calls.clone();
            last = response;

            if calls.is_empty() {
                break;
            }
            if !self.tools_enabled {
                tracing::debug!(
                    worker = %self.name,
                    "Tools disabled, ignoring {} requested tool call(s)",
                    calls.len()
                );
                break;
            }
            if iteration == self.max_iterations {
                tracing::warn!(
                    request_id = %scope.context.request_id(),
                    worker = %self.name,
                    "Iteration cap of {} reached with tool calls pending",
                    self.max_iterations
                );
                break;
            }

            for call in &calls {
                transcript.push(self.invoke_tool(call).await);
            }
        }

        tracing::info!(
            request_id = %scope.context.request_id(),
            worker = %self.name,
            "Worker finished"
        );

        let message = Message::assistant(last.content).authored_by(&self.name);
        Ok(Command::new(Goto::Supervisor, StatePatch::message(message)))
    }

    async fn invoke_tool(&self, call: &ToolCall) -> Message {
        let Some(tool) = self.tools.iter().find(|tool| tool.name() == call.name) else {
            tracing::warn!(worker = %self.name, tool = %call.name, "Model requested unknown tool");
            return Message::tool_result(call, format!("ERROR: unknown tool `{}`", call.name));
        };

        match tool.invoke(call.arguments.clone()).await {
            Ok(output) => Message::tool_result(call, output),
            Err(e) => {
                tracing::warn!(worker = %self.name, tool = %call.name, "Tool failed: {}", e);
                let payload = json!({"error": e.to_string(), "arguments": call.arguments});
                Message::tool_result(call, format!("ERROR: {}", payload))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::context::RequestContext;
    use crate::agents::events::NoopObserver;
    use crate::agents::messages::Role;
    use crate::llm::{MockResponse, ScriptedModel};
    use crate::tools::research::{ScrapeWebpagesTool, SearchWebTool};
    use std::time::Duration;

    fn scope_parts() -> (RequestContext, NoopObserver) {
        (RequestContext::new("find tokio docs", None), NoopObserver)
    }

    #[tokio::test]
    async fn plain_response_is_labeled_with_worker_name() {
        let model = Arc::new(ScriptedModel::new().then(MockResponse::text("Tokio is a runtime.")));
        let worker = WorkerNode::new("search", model.clone(), 4);
        let (context, observer) = scope_parts();

        let command = worker
            .run(&ExecutionState::seeded("find tokio docs"), ExecutionScope::new(&context, &observer))
            .await
            .unwrap();

        assert_eq!(command.goto, Goto::Supervisor);
        assert_eq!(command.update.messages.len(), 1);
        let message = &command.update.messages[0];
        assert_eq!(message.author(), Some("search"));
        assert_eq!(message.content(), "Tokio is a runtime.");
        assert_eq!(model.call_count(), 1);
    }

    #[tokio::test]
    async fn tool_results_are_fed_back_before_final_answer() {
        let model = Arc::new(
            ScriptedModel::new()
                .then(MockResponse::tool_call("search_web", json!({"query": "tokio"})))
                .then(MockResponse::text("Search is unavailable; here is what I know.")),
        );
        let worker = WorkerNode::new("search", model.clone(), 4)
            .with_instruction(Some("Be brief.".to_string()))
            .with_tools(vec![Arc::new(SearchWebTool)]);
        let (context, observer) = scope_parts();

        let command = worker
            .run(&ExecutionState::seeded("find tokio docs"), ExecutionScope::new(&context, &observer))
            .await
            .unwrap();

        let calls = model.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0][0].role(), Role::System);
        let tool_message = calls[1].last().unwrap();
        assert_eq!(tool_message.role(), Role::Tool);
        assert!(tool_message.content().contains("Search is not enabled"));
        assert_eq!(
            command.update.messages[0].content(),
            "Search is unavailable; here is what I know."
        );
    }

    #[tokio::test]
    async fn loop_stops_at_iteration_cap() {
        let model = Arc::new(
            ScriptedModel::new()
                .otherwise(MockResponse::tool_call("search_web", json!({"query": "again"}))),
        );
        let worker =
            WorkerNode::new("search", model.clone(), 3).with_tools(vec![Arc::new(SearchWebTool)]);
        let (context, observer) = scope_parts();

        let command = worker
            .run(&ExecutionState::seeded("loop forever"), ExecutionScope::new(&context, &observer))
            .await
            .unwrap();

        assert_eq!(model.call_count(), 3);
        assert_eq!(command.update.messages[0].author(), Some("search"));
    }

    #[tokio::test]
    async fn failing_tool_becomes_error_result() {
        let model = Arc::new(
            ScriptedModel::new()
                .then(MockResponse::tool_call("scrape_webpages", json!({})))
                .then(MockResponse::text("I could not fetch any page.")),
        );
        let worker = WorkerNode::new("web_scraper", model.clone(), 4)
            .with_tools(vec![Arc::new(ScrapeWebpagesTool::new(Duration::from_secs(1)))]);
        let (context, observer) = scope_parts();

        let command = worker
            .run(&ExecutionState::seeded("scrape it"), ExecutionScope::new(&context, &observer))
            .await
            .unwrap();

        let tool_message = model.calls()[1].last().cloned().unwrap();
        assert_eq!(tool_message.role(), Role::Tool);
        assert!(tool_message.content().starts_with("ERROR:"));
        assert!(tool_message.content().contains("urls"));
        assert_eq!(command.update.messages[0].content(), "I could not fetch any page.");
    }

    #[tokio::test]
    async fn unknown_tool_is_reported_to_model() {
        let model = Arc::new(
            ScriptedModel::new()
                .then(MockResponse::tool_call("python_repl", json!({"code": "1+1"})))
                .then(MockResponse::text("done")),
        );
        let worker = WorkerNode::new("doc_writer", model.clone(), 4);
        let (context, observer) = scope_parts();

        worker
            .run(&ExecutionState::seeded("chart"), ExecutionScope::new(&context, &observer))
            .await
            .unwrap();

        let tool_message = model.calls()[1].last().cloned().unwrap();
        assert!(tool_message.content().contains("unknown tool `python_repl`"));
    }

    #[tokio::test]
    async fn disabled_tools_end_the_loop_after_one_call() {
        let model = Arc::new(
            ScriptedModel::new()
                .then(MockResponse::tool_call("search_web", json!({"query": "tokio"})))
                .then(MockResponse::text("never requested")),
        );
        let worker = WorkerNode::new("search", model.clone(), 4)
            .with_tools(vec![Arc::new(SearchWebTool)])
            .with_tools_enabled(false);
        let (context, observer) = scope_parts();

        let command = worker
            .run(&ExecutionState::seeded("find tokio docs"), ExecutionScope::new(&context, &observer))
            .await
            .unwrap();

        assert_eq!(model.call_count(), 1);
        assert_eq!(command.update.messages.len(), 1);
        assert_eq!(command.update.messages[0].author(), Some("search"));
        assert!(command.update.messages[0].tool_calls().is_empty());
    }

    #[tokio::test]
    async fn node_frame_is_restored_after_model_failure() {
        let model = Arc::new(ScriptedModel::new().then(MockResponse::error("backend down")));
        let worker = WorkerNode::new("search", model, 4);
        let (context, observer) = scope_parts();
        let _supervisor = context.enter_node("supervisor");

        let result = worker
            .run(&ExecutionState::seeded("hi"), ExecutionScope::new(&context, &observer))
            .await;

        assert!(result.is_err());
        assert_eq!(context.frame().active_node, "supervisor");
    }
}
