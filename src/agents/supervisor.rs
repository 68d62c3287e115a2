use std::sync::Arc;

use super::context::ExecutionScope;
use super::messages::Message;
use super::prompts::{library, vars};
use super::state::{Command, ExecutionState, Goto, StatePatch};
use super::types::{CompletionPolicy, TeamDescriptor};
use crate::llm::{generate, ChatModel};

/// Node name recorded in the context frame while a supervisor decides
pub const SUPERVISOR_NODE: &str = "supervisor";

/// Coordinates the workers of one team
///
/// A team finishes as soon as any member has contributed since the last user
/// message (single-pass policy); until then the supervisor picks exactly one
/// member to run next.
pub struct TeamSupervisor {
    descriptor: TeamDescriptor,
    model: Arc<dyn ChatModel>,
}

impl TeamSupervisor {
    pub fn new(descriptor: TeamDescriptor, model: Arc<dyn ChatModel>) -> Self {
        Self { descriptor, model }
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    /// Decides the next step: a member to run, or a return to the dispatcher.
    /// Never fails; model problems fall back to the first member.
    pub async fn route(&self, state: &ExecutionState, scope: ExecutionScope<'_>) -> Command {
        let context = scope.context;
        let _node = context.enter_node(SUPERVISOR_NODE);
        let _team = if context.is_terminal_active() {
            None
        } else {
            Some(context.enter_team(&self.descriptor.name))
        };

        tracing::info!(
            request_id = %context.request_id(),
            team = %self.descriptor.name,
            "Team supervisor started"
        );

        let contributions = state.member_messages_since_last_user(&self.descriptor.members);
        if !contributions.is_empty() {
            return self.complete(state, &contributions, scope).await;
        }

        let next = self.pick_member(state, scope).await;
        tracing::info!(
            request_id = %context.request_id(),
            team = %self.descriptor.name,
            "Routing to: {}",
            next
        );
        Command::new(Goto::Worker(next.clone()), StatePatch::next(next))
    }

    fn first_member(&self) -> String {
        self.descriptor.members.first().cloned().unwrap_or_default()
    }

    async fn pick_member(&self, state: &ExecutionState, scope: ExecutionScope<'_>) -> String {
        let members = self.descriptor.members.join(", ");
        let template = library::team_routing();
        let variables = vars([
            ("team", self.descriptor.name.clone()),
            ("members", members),
        ]);

        let prompt: Vec<Message> = std::iter::once(Message::system(template.render_system(&variables)))
            .chain(state.history().iter().cloned())
            .chain(std::iter::once(Message::user(template.render(&variables))))
            .collect();

        match generate(self.model.as_ref(), scope.observer, &prompt, &[]).await {
            Ok(response) => match_member(&response.content, &self.descriptor.members)
                .unwrap_or_else(|| self.first_member()),
            Err(e) => {
                tracing::warn!(
                    request_id = %scope.context.request_id(),
                    team = %self.descriptor.name,
                    "Routing decision failed, using first member: {}",
                    e
                );
                self.first_member()
            }
        }
    }

    async fn complete(
        &self,
        state: &ExecutionState,
        contributions: &[&Message],
        scope: ExecutionScope<'_>,
    ) -> Command {
        let team = &self.descriptor.name;
        let is_final = scope.context.is_terminal_team(team);

        if self.descriptor.policy == CompletionPolicy::Silent || !is_final {
            tracing::info!(request_id = %scope.context.request_id(), team = %team, "Team completed work");
            return Command::goto(Goto::Dispatcher);
        }

        let summary: Vec<String> = contributions
            .iter()
            .map(|message| format!("{}: {}", message.author().unwrap_or("worker"), message.content()))
            .collect();

        let template = library::synthesis();
        let variables = vars([
            ("team", team.clone()),
            ("contributions", summary.join("\n")),
            ("request", state.initial_request().to_string()),
        ]);
        let prompt = vec![
            Message::system(template.render_system(&variables)),
            Message::user(template.render(&variables)),
        ];

        let synthesized = match generate(self.model.as_ref(), scope.observer, &prompt, &[]).await {
            Ok(response) => {
                tracing::info!(request_id = %scope.context.request_id(), team = %team, "Team generated final response");
                Some(response.content)
            }
            Err(e) => {
                tracing::error!(
                    request_id = %scope.context.request_id(),
                    team = %team,
                    "Failed to synthesize team response: {}",
                    e
                );
                contributions.last().map(|message| message.content().to_string())
            }
        };

        let update = synthesized
            .map(|content| StatePatch::message(Message::assistant(content).authored_by(team)))
            .unwrap_or_default();
        Command::new(Goto::Dispatcher, update)
    }
}

/// First member (in descriptor order) whose name appears in `content`,
/// compared case-insensitively
pub fn match_member(content: &str, members: &[String]) -> Option<String> {
    let content = content.to_lowercase();
    members
        .iter()
        .find(|member| content.contains(&member.to_lowercase()))
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::context::RequestContext;
    use crate::agents::events::NoopObserver;
    use crate::agents::types::{RESEARCH_TEAM, WRITING_TEAM};
    use crate::llm::{MockResponse, ScriptedModel};

    fn research() -> TeamDescriptor {
        TeamDescriptor::new(RESEARCH_TEAM, ["search", "web_scraper"], CompletionPolicy::Silent)
    }

    fn writing() -> TeamDescriptor {
        TeamDescriptor::new(WRITING_TEAM, ["doc_writer", "note_taker"], CompletionPolicy::Synthesize)
    }

    #[test]
    fn match_member_uses_descriptor_order() {
        let members = vec!["doc_writer".to_string(), "note_taker".to_string()];

        assert_eq!(
            match_member("{\"next\": \"NOTE_TAKER\"}", &members).as_deref(),
            Some("note_taker")
        );
        assert_eq!(
            match_member("note_taker then doc_writer", &members).as_deref(),
            Some("doc_writer")
        );
        assert_eq!(match_member("COMPLETE", &members), None);
    }

    #[tokio::test]
    async fn routes_to_member_named_by_model() {
        let model = Arc::new(ScriptedModel::new().then(MockResponse::text("{\"next\": \"web_scraper\"}")));
        let supervisor = TeamSupervisor::new(research(), model);
        let context = RequestContext::new("read https://tokio.rs", None);

        let command = supervisor
            .route(&ExecutionState::seeded("read https://tokio.rs"), ExecutionScope::new(&context, &NoopObserver))
            .await;

        assert_eq!(command.goto, Goto::Worker("web_scraper".to_string()));
        assert_eq!(command.update.next_target.as_deref(), Some("web_scraper"));
    }

    #[tokio::test]
    async fn routing_is_deterministic_under_stub() {
        for _ in 0..5 {
            let model = Arc::new(ScriptedModel::new().otherwise(MockResponse::text("pick Web_Scraper")));
            let supervisor = TeamSupervisor::new(research(), model);
            let context = RequestContext::new("x", None);

            let command = supervisor
                .route(&ExecutionState::seeded("x"), ExecutionScope::new(&context, &NoopObserver))
                .await;

            assert_eq!(command.goto, Goto::Worker("web_scraper".to_string()));
        }
    }

    #[tokio::test]
    async fn unmatched_or_failed_routing_defaults_to_first_member() {
        let unmatched = Arc::new(ScriptedModel::new().then(MockResponse::text("COMPLETE")));
        let failed = Arc::new(ScriptedModel::new().then(MockResponse::error("timeout")));

        for model in [unmatched as Arc<dyn ChatModel>, failed] {
            let supervisor = TeamSupervisor::new(research(), model);
            let context = RequestContext::new("x", None);
            let command = supervisor
                .route(&ExecutionState::seeded("x"), ExecutionScope::new(&context, &NoopObserver))
                .await;

            assert_eq!(command.goto, Goto::Worker("search".to_string()));
        }
    }

    #[tokio::test]
    async fn silent_team_completes_without_message() {
        let model = Arc::new(ScriptedModel::new());
        let supervisor = TeamSupervisor::new(research(), model.clone());
        let context = RequestContext::new("x", None);
        let state = ExecutionState::seeded("x")
            .apply(StatePatch::message(Message::assistant("facts").authored_by("search")));

        let command = supervisor
            .route(&state, ExecutionScope::new(&context, &NoopObserver))
            .await;

        assert_eq!(command.goto, Goto::Dispatcher);
        assert!(command.update.messages.is_empty());
        assert_eq!(model.call_count(), 0);
    }

    #[tokio::test]
    async fn non_terminal_synthesizing_team_stays_silent() {
        let model = Arc::new(ScriptedModel::new());
        let supervisor = TeamSupervisor::new(writing(), model.clone());
        let context = RequestContext::new("x", None);
        let state = ExecutionState::seeded("x")
            .apply(StatePatch::message(Message::assistant("draft").authored_by("doc_writer")));

        let command = supervisor
            .route(&state, ExecutionScope::new(&context, &NoopObserver))
            .await;

        assert_eq!(command.goto, Goto::Dispatcher);
        assert!(command.update.messages.is_empty());
        assert_eq!(model.call_count(), 0);
    }

    #[tokio::test]
    async fn terminal_team_synthesizes_member_output() {
        let model = Arc::new(ScriptedModel::new().then(MockResponse::text("Final report.")));
        let supervisor = TeamSupervisor::new(writing(), model.clone());
        let context = RequestContext::new("Summarize this", None);
        context.mark_terminal(WRITING_TEAM);
        let _team = context.enter_team(WRITING_TEAM);
        let state = ExecutionState::seeded("Summarize this")
            .apply(StatePatch::message(Message::assistant("draft").authored_by("doc_writer")));

        let command = supervisor
            .route(&state, ExecutionScope::new(&context, &NoopObserver))
            .await;

        assert_eq!(command.goto, Goto::Dispatcher);
        let message = &command.update.messages[0];
        assert_eq!(message.content(), "Final report.");
        assert_eq!(message.author(), Some(WRITING_TEAM));
        assert!(model.calls()[0][0].content().contains("doc_writer: draft"));
    }

    #[tokio::test]
    async fn failed_synthesis_falls_back_to_last_member_message() {
        let model = Arc::new(ScriptedModel::new().then(MockResponse::error("overloaded")));
        let supervisor = TeamSupervisor::new(writing(), model);
        let context = RequestContext::new("x", None);
        context.mark_terminal(WRITING_TEAM);
        let state = ExecutionState::seeded("x")
            .apply(StatePatch::message(Message::assistant("outline").authored_by("note_taker")))
            .apply(StatePatch::message(Message::assistant("draft v2").authored_by("doc_writer")));

        let command = supervisor
            .route(&state, ExecutionScope::new(&context, &NoopObserver))
            .await;

        assert_eq!(command.update.messages[0].content(), "draft v2");
    }

    #[tokio::test]
    async fn terminal_team_frame_is_left_untouched() {
        let model = Arc::new(ScriptedModel::new().then(MockResponse::text("doc_writer")));
        let supervisor = TeamSupervisor::new(research(), model);
        let context = RequestContext::new("x", None);
        context.mark_terminal(WRITING_TEAM);
        let _team = context.enter_team(WRITING_TEAM);

        supervisor
            .route(&ExecutionState::seeded("x"), ExecutionScope::new(&context, &NoopObserver))
            .await;

        assert_eq!(context.frame().active_team, WRITING_TEAM);
        assert_eq!(context.frame().active_node, "");
    }
}
