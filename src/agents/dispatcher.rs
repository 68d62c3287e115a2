use std::sync::Arc;

use super::context::ExecutionScope;
use super::messages::Message;
use super::prompts::{library, vars};
use super::state::{Command, ExecutionState, Goto, StatePatch};
use super::types::{RESEARCH_TEAM, WRITING_TEAM};
use crate::llm::{generate, ChatModel};

/// Node name recorded in the context frame while the dispatcher decides
pub const DISPATCHER_NODE: &str = "dispatcher";

const RESEARCH_KEYWORDS: &[&str] = &[
    "搜索", "查找", "调研", "分析", "研究", "收集信息", "最新", "search", "find", "research",
    "analyze", "investigate", "gather", "latest", "compare", "评估", "市场", "趋势", "数据",
];

const AUTHORING_KEYWORDS: &[&str] = &[
    "整理", "总结", "撰写", "编写", "文档", "报告", "记录", "笔记", "organize", "summarize",
    "write", "document", "report", "note", "format", "create document", "draft",
];

/// Teams and heuristics used by the top-level dispatcher
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    pub research_team: String,
    /// The team whose output is shown to the user
    pub authoring_team: String,
    /// Checked first; any match sends the request to research
    pub research_keywords: Vec<String>,
    pub authoring_keywords: Vec<String>,
    /// Ask the model to confirm research routes
    pub consult_model: bool,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            research_team: RESEARCH_TEAM.to_string(),
            authoring_team: WRITING_TEAM.to_string(),
            research_keywords: RESEARCH_KEYWORDS.iter().map(|k| k.to_string()).collect(),
            authoring_keywords: AUTHORING_KEYWORDS.iter().map(|k| k.to_string()).collect(),
            consult_model: true,
        }
    }
}

impl DispatcherConfig {
    pub fn with_consult_model(mut self, consult_model: bool) -> Self {
        self.consult_model = consult_model;
        self
    }

    /// Heuristic team for a fresh request. Research keywords win over
    /// authoring keywords; with no match the request goes to research.
    pub fn classify(&self, request: &str) -> &str {
        let request = request.to_lowercase();
        let matches = |keywords: &[String]| keywords.iter().any(|k| request.contains(k.as_str()));

        if matches(&self.research_keywords) {
            &self.research_team
        } else if matches(&self.authoring_keywords) {
            &self.authoring_team
        } else {
            &self.research_team
        }
    }
}

/// Top-level router between teams
///
/// Every route into the authoring team marks it as the terminal stage, both
/// on the request context and in the state patch.
pub struct Dispatcher {
    config: DispatcherConfig,
    model: Arc<dyn ChatModel>,
}

impl Dispatcher {
    pub fn new(config: DispatcherConfig, model: Arc<dyn ChatModel>) -> Self {
        Self { config, model }
    }

    pub async fn route(&self, state: &ExecutionState, scope: ExecutionScope<'_>) -> Command {
        let context = scope.context;
        let _node = context.enter_node(DISPATCHER_NODE);
        let research = &self.config.research_team;
        let authoring = &self.config.authoring_team;

        let target = if state.is_done(authoring) {
            None
        } else if state.is_done(research) {
            Some(authoring.clone())
        } else {
            let heuristic = self.config.classify(state.initial_request()).to_string();
            if self.should_consult(&heuristic, state) {
                Some(self.consult(heuristic, state, scope).await)
            } else {
                Some(heuristic)
            }
        };

        let Some(team) = target else {
            tracing::info!(request_id = %context.request_id(), "Dispatcher routing to: {}", Goto::End);
            return Command::new(Goto::End, StatePatch::next(Goto::End.to_string()));
        };

        tracing::info!(request_id = %context.request_id(), "Dispatcher routing to: {}", team);
        let mut update = StatePatch::next(team.clone());
        if &team == authoring {
            context.mark_terminal(authoring);
            update = update.mark_terminal(authoring.clone());
        }
        Command::new(Goto::Team(team), update)
    }

    fn should_consult(&self, heuristic: &str, state: &ExecutionState) -> bool {
        self.config.consult_model
            && heuristic == self.config.research_team
            && state.history().len() > 1
    }

    /// Asks the model to confirm the heuristic route; keeps it on failure or
    /// when the answer names no team
    async fn consult(&self, heuristic: String, state: &ExecutionState, scope: ExecutionScope<'_>) -> String {
        let teams = [&self.config.research_team, &self.config.authoring_team];
        let template = library::dispatcher_routing();
        let variables = vars([
            ("teams", format!("{}, {}", teams[0], teams[1])),
            ("research_team", self.config.research_team.clone()),
            ("writing_team", self.config.authoring_team.clone()),
        ]);

        let prompt: Vec<Message> = std::iter::once(Message::system(template.render_system(&variables)))
            .chain(state.history().iter().cloned())
            .collect();

        match generate(self.model.as_ref(), scope.observer, &prompt, &[]).await {
            Ok(response) => {
                let content = response.content.to_lowercase();
                teams
                    .iter()
                    .find(|team| content.contains(&team.to_lowercase()))
                    .map(|team| team.to_string())
                    .unwrap_or(heuristic)
            }
            Err(e) => {
                tracing::warn!(
                    request_id = %scope.context.request_id(),
                    "Dispatcher consultation failed, keeping {}: {}",
                    heuristic,
                    e
                );
                heuristic
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::context::RequestContext;
    use crate::agents::events::NoopObserver;
    use crate::llm::{MockResponse, ScriptedModel};

    fn dispatcher(model: Arc<ScriptedModel>) -> Dispatcher {
        Dispatcher::new(DispatcherConfig::default(), model)
    }

    #[test]
    fn classify_prefers_research_keywords() {
        let config = DispatcherConfig::default();

        assert_eq!(config.classify("Summarize this in a short report"), WRITING_TEAM);
        assert_eq!(config.classify("Research the latest Rust release"), RESEARCH_TEAM);
        assert_eq!(config.classify("Write a report comparing runtimes after you search"), RESEARCH_TEAM);
        assert_eq!(config.classify("帮我整理一下会议笔记"), WRITING_TEAM);
        assert_eq!(config.classify("hello there"), RESEARCH_TEAM);
    }

    #[tokio::test]
    async fn summarize_goes_straight_to_writing_and_marks_it_terminal() {
        let model = Arc::new(ScriptedModel::new());
        let context = RequestContext::new("Summarize this in a short report", None);
        let state = ExecutionState::seeded("Summarize this in a short report");

        let command = dispatcher(model.clone())
            .route(&state, ExecutionScope::new(&context, &NoopObserver))
            .await;

        assert_eq!(command.goto, Goto::Team(WRITING_TEAM.to_string()));
        assert_eq!(command.update.terminal_team.as_deref(), Some(WRITING_TEAM));
        assert_eq!(context.terminal_team(), Some(WRITING_TEAM));
        assert_eq!(model.call_count(), 0);
    }

    #[tokio::test]
    async fn research_request_goes_to_research_without_terminal_mark() {
        let model = Arc::new(ScriptedModel::new());
        let context = RequestContext::new("research tokio", None);

        let command = dispatcher(model)
            .route(&ExecutionState::seeded("research tokio"), ExecutionScope::new(&context, &NoopObserver))
            .await;

        assert_eq!(command.goto, Goto::Team(RESEARCH_TEAM.to_string()));
        assert_eq!(command.update.terminal_team, None);
        assert_eq!(context.terminal_team(), None);
    }

    #[tokio::test]
    async fn finished_research_hands_over_to_writing() {
        let context = RequestContext::new("research tokio", None);
        let state = ExecutionState::seeded("research tokio")
            .apply(StatePatch::default().mark_done(RESEARCH_TEAM));

        let command = dispatcher(Arc::new(ScriptedModel::new()))
            .route(&state, ExecutionScope::new(&context, &NoopObserver))
            .await;

        assert_eq!(command.goto, Goto::Team(WRITING_TEAM.to_string()));
        assert!(context.is_terminal_team(WRITING_TEAM));
    }

    #[tokio::test]
    async fn finished_writing_ends_the_request() {
        let context = RequestContext::new("x", None);
        let state = ExecutionState::seeded("x")
            .apply(StatePatch::default().mark_done(WRITING_TEAM));

        let command = dispatcher(Arc::new(ScriptedModel::new()))
            .route(&state, ExecutionScope::new(&context, &NoopObserver))
            .await;

        assert_eq!(command.goto, Goto::End);
        assert_eq!(command.update.next_target.as_deref(), Some("__end__"));
    }

    #[tokio::test]
    async fn consultation_can_redirect_research_routes() {
        let model = Arc::new(ScriptedModel::new().then(MockResponse::text("{\"next\": \"writing_team\"}")));
        let context = RequestContext::new("hello", None);
        let state = ExecutionState::seeded("hello")
            .apply(StatePatch::message(Message::assistant("earlier reply")));

        let command = dispatcher(model.clone())
            .route(&state, ExecutionScope::new(&context, &NoopObserver))
            .await;

        assert_eq!(command.goto, Goto::Team(WRITING_TEAM.to_string()));
        assert_eq!(context.terminal_team(), Some(WRITING_TEAM));
        assert_eq!(model.call_count(), 1);
    }

    #[tokio::test]
    async fn failed_consultation_keeps_heuristic() {
        let model = Arc::new(ScriptedModel::new().then(MockResponse::error("down")));
        let context = RequestContext::new("hello", None);
        let state = ExecutionState::seeded("hello")
            .apply(StatePatch::message(Message::assistant("earlier reply")));

        let command = dispatcher(model)
            .route(&state, ExecutionScope::new(&context, &NoopObserver))
            .await;

        assert_eq!(command.goto, Goto::Team(RESEARCH_TEAM.to_string()));
    }

    #[tokio::test]
    async fn consultation_can_be_disabled() {
        let model = Arc::new(ScriptedModel::new().then(MockResponse::text("writing_team")));
        let context = RequestContext::new("hello", None);
        let state = ExecutionState::seeded("hello")
            .apply(StatePatch::message(Message::assistant("earlier reply")));
        let dispatcher = Dispatcher::new(DispatcherConfig::default().with_consult_model(false), model.clone());

        let command = dispatcher
            .route(&state, ExecutionScope::new(&context, &NoopObserver))
            .await;

        assert_eq!(command.goto, Goto::Team(RESEARCH_TEAM.to_string()));
        assert_eq!(model.call_count(), 0);
    }
}
