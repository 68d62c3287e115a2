// Team graph
//
// An explicit interpreter over the dispatcher, team supervisors and workers.
// The dispatcher picks a team, the team loops supervisor -> worker ->
// supervisor until the supervisor hands control back, and the dispatcher
// decides again until it reaches the end state.

use std::collections::HashMap;
use std::sync::Arc;

use super::context::ExecutionScope;
use super::dispatcher::{Dispatcher, DispatcherConfig};
use super::errors::{AgentError, AgentResult};
use super::messages::Message;
use super::state::{ExecutionState, Goto, StatePatch};
use super::supervisor::TeamSupervisor;
use super::types::Roster;
use super::worker::WorkerNode;
use crate::config::AppConfig;
use crate::llm::ChatModel;
use crate::tools::{ToolError, ToolRegistry};

/// Knobs applied to every node of the graph
#[derive(Debug, Clone, Copy)]
pub struct GraphSettings {
    pub max_iterations: usize,
    pub tools_enabled: bool,
    pub consult_model: bool,
}

impl Default for GraphSettings {
    fn default() -> Self {
        Self {
            max_iterations: 6,
            tools_enabled: true,
            consult_model: true,
        }
    }
}

impl From<&AppConfig> for GraphSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            max_iterations: config.worker_max_iterations,
            tools_enabled: config.tools_enabled,
            consult_model: config.consult_model_for_dispatch,
        }
    }
}

struct TeamUnit {
    supervisor: TeamSupervisor,
    workers: HashMap<String, WorkerNode>,
}

/// Executable graph for one roster
pub struct TeamGraph {
    dispatcher: Dispatcher,
    teams: HashMap<String, TeamUnit>,
}

impl TeamGraph {
    /// Validates `roster` and wires its teams and workers
    pub fn build(
        model: Arc<dyn ChatModel>,
        registry: &ToolRegistry,
        roster: &Roster,
        settings: GraphSettings,
    ) -> AgentResult<Self> {
        if settings.max_iterations == 0 {
            return Err(AgentError::ConfigError(
                "worker iteration cap must be at least 1".to_string(),
            ));
        }

        let dispatch = DispatcherConfig::default().with_consult_model(settings.consult_model);
        for team in [&dispatch.research_team, &dispatch.authoring_team] {
            if roster.team(team).is_none() {
                return Err(AgentError::TeamNotFound(team.clone()));
            }
        }

        let mut teams = HashMap::new();
        for descriptor in &roster.teams {
            if descriptor.members.is_empty() {
                return Err(AgentError::ConfigError(format!(
                    "team {} has no members",
                    descriptor.name
                )));
            }

            let mut workers = HashMap::new();
            for member in &descriptor.members {
                let spec = roster
                    .worker(member)
                    .ok_or_else(|| AgentError::AgentNotFound(member.clone()))?;
                let tools = spec
                    .tools
                    .iter()
                    .map(|name| {
                        registry
                            .get(name)
                            .ok_or_else(|| ToolError::NotFound(name.clone()))
                    })
                    .collect::<Result<Vec<_>, _>>()?;

                let worker = WorkerNode::new(member.clone(), model.clone(), settings.max_iterations)
                    .with_instruction(spec.instruction.clone())
                    .with_tools(tools)
                    .with_tools_enabled(settings.tools_enabled);
                workers.insert(member.clone(), worker);
            }

            let unit = TeamUnit {
                supervisor: TeamSupervisor::new(descriptor.clone(), model.clone()),
                workers,
            };
            teams.insert(descriptor.name.clone(), unit);
        }

        tracing::debug!("Team graph built with {} teams", teams.len());

        Ok(Self {
            dispatcher: Dispatcher::new(dispatch, model),
            teams,
        })
    }

    /// Runs the request held by the scope's context to the end state
    ///
    /// Team failures are recorded as one diagnostic message and the team is
    /// marked done, so only a broken graph wiring can make this fail.
    pub async fn run(&self, scope: ExecutionScope<'_>) -> AgentResult<ExecutionState> {
        let context = scope.context;
        let mut state = ExecutionState::seeded(context.metadata().user_message);

        loop {
            let command = self.dispatcher.route(&state, scope).await;
            state = state.apply(command.update);

            let team = match command.goto {
                Goto::End => break,
                Goto::Team(team) => team,
                other => {
                    return Err(AgentError::InvalidStateTransition {
                        from: "dispatcher".to_string(),
                        to: other.to_string(),
                    })
                }
            };

            let _team = context.enter_team(&team);
            state = match self.run_team(&team, state.clone(), scope).await {
                Ok(next) => {
                    tracing::info!(request_id = %context.request_id(), team = %team, "Team finished");
                    next.apply(StatePatch::default().mark_done(&team))
                }
                Err(e) => {
                    tracing::error!(request_id = %context.request_id(), team = %team, "Team failed: {}", e);
                    let diagnostic = Message::assistant(format!("{} failed: {}", team, e)).authored_by(&team);
                    state.apply(StatePatch::message(diagnostic).mark_done(&team))
                }
            };
        }

        tracing::info!(request_id = %context.request_id(), "Graph reached end state");
        Ok(state)
    }

    async fn run_team(
        &self,
        name: &str,
        mut state: ExecutionState,
        scope: ExecutionScope<'_>,
    ) -> AgentResult<ExecutionState> {
        let unit = self
            .teams
            .get(name)
            .ok_or_else(|| AgentError::TeamNotFound(name.to_string()))?;

        loop {
            let command = unit.supervisor.route(&state, scope).await;
            state = state.apply(command.update);

            match command.goto {
                Goto::Dispatcher => return Ok(state),
                Goto::Worker(member) => {
                    let worker = unit
                        .workers
                        .get(&member)
                        .ok_or_else(|| AgentError::AgentNotFound(member.clone()))?;
                    let command = worker.run(&state, scope).await?;
                    if command.goto != Goto::Supervisor {
                        return Err(AgentError::InvalidStateTransition {
                            from: member,
                            to: command.goto.to_string(),
                        });
                    }
                    state = state.apply(command.update);
                }
                other => {
                    return Err(AgentError::InvalidStateTransition {
                        from: name.to_string(),
                        to: other.to_string(),
                    })
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::context::RequestContext;
    use crate::agents::events::NoopObserver;
    use crate::agents::types::{CompletionPolicy, TeamDescriptor, WorkerSpec, RESEARCH_TEAM, WRITING_TEAM};
    use crate::llm::{MockResponse, ScriptedModel};
    use crate::tools::research::SearchWebTool;

    fn registry() -> ToolRegistry {
        ToolRegistry::standard(&AppConfig::default())
    }

    fn graph(model: Arc<ScriptedModel>) -> TeamGraph {
        TeamGraph::build(model, &registry(), &Roster::standard(), GraphSettings::default()).unwrap()
    }

    #[test]
    fn build_rejects_invalid_rosters() {
        let model: Arc<dyn ChatModel> = Arc::new(ScriptedModel::new());
        let registry = registry();

        let mut missing_worker = Roster::standard();
        missing_worker.workers.retain(|worker| worker.name != "note_taker");
        let mut missing_tool = Roster::standard();
        missing_tool.workers.push(WorkerSpec::new("coder", ["python_repl"]));
        missing_tool.teams.push(TeamDescriptor::new("code_team", ["coder"], CompletionPolicy::Silent));
        let mut empty_team = Roster::standard();
        empty_team.teams[0].members.clear();
        let mut missing_team = Roster::standard();
        missing_team.teams.retain(|team| team.name != WRITING_TEAM);

        let result = |roster: &Roster, settings| TeamGraph::build(model.clone(), &registry, roster, settings);

        assert!(matches!(result(&missing_worker, GraphSettings::default()), Err(AgentError::AgentNotFound(name)) if name == "note_taker"));
        assert!(matches!(result(&missing_tool, GraphSettings::default()), Err(AgentError::Tool(ToolError::NotFound(_)))));
        assert!(matches!(result(&empty_team, GraphSettings::default()), Err(AgentError::ConfigError(_))));
        assert!(matches!(result(&missing_team, GraphSettings::default()), Err(AgentError::TeamNotFound(_))));

        let no_iterations = GraphSettings {
            max_iterations: 0,
            ..GraphSettings::default()
        };
        assert!(matches!(result(&Roster::standard(), no_iterations), Err(AgentError::ConfigError(_))));
    }

    #[tokio::test]
    async fn summarize_request_runs_only_the_writing_team() {
        let model = Arc::new(
            ScriptedModel::new()
                .when("acting as a supervisor of the writing_team", MockResponse::text("{\"next\": \"doc_writer\"}"))
                .when("lead editor", MockResponse::text("Here is the short report."))
                .otherwise(MockResponse::text("Draft of the report.")),
        );
        let context = RequestContext::new("Summarize this in a short report", None);

        let state = graph(model.clone())
            .run(ExecutionScope::new(&context, &NoopObserver))
            .await
            .unwrap();

        assert!(state.is_done(WRITING_TEAM));
        assert!(!state.is_done(RESEARCH_TEAM));
        assert_eq!(state.terminal_team(), Some(WRITING_TEAM));
        let last = state.history().last().unwrap();
        assert_eq!(last.author(), Some(WRITING_TEAM));
        assert_eq!(last.content(), "Here is the short report.");
        // routing, doc_writer, synthesis
        assert_eq!(model.call_count(), 3);
    }

    #[tokio::test]
    async fn research_request_visits_both_teams_in_order() {
        let model = Arc::new(
            ScriptedModel::new()
                .when("supervisor of the research_team", MockResponse::text("search"))
                .when("supervisor of the writing_team", MockResponse::text("note_taker"))
                .when("lead editor", MockResponse::text("Final answer."))
                .otherwise(MockResponse::text("worker output")),
        );
        let context = RequestContext::new("Research the latest tokio release", None);

        let state = graph(model)
            .run(ExecutionScope::new(&context, &NoopObserver))
            .await
            .unwrap();

        let authors: Vec<Option<&str>> = state.history().iter().map(Message::author).collect();
        assert_eq!(
            authors,
            vec![None, Some("search"), Some("note_taker"), Some(WRITING_TEAM)]
        );
        assert!(state.is_done(RESEARCH_TEAM));
        assert!(state.is_done(WRITING_TEAM));
    }

    #[tokio::test]
    async fn failing_teams_still_reach_the_end_state() {
        let model = Arc::new(ScriptedModel::new().otherwise(MockResponse::error("backend down")));
        let context = RequestContext::new("research anything", None);

        let state = graph(model)
            .run(ExecutionScope::new(&context, &NoopObserver))
            .await
            .unwrap();

        assert!(state.is_done(RESEARCH_TEAM));
        assert!(state.is_done(WRITING_TEAM));
        let diagnostics: Vec<&Message> = state
            .history()
            .iter()
            .filter(|message| message.content().contains("failed"))
            .collect();
        assert_eq!(diagnostics.len(), 2);
        assert_eq!(diagnostics[0].author(), Some(RESEARCH_TEAM));
    }

    #[tokio::test]
    async fn tools_are_wired_from_the_registry() {
        let model = Arc::new(
            ScriptedModel::new()
                .when("supervisor of the research_team", MockResponse::text("search"))
                .then(MockResponse::tool_call("search_web", serde_json::json!({"query": "tokio"})))
                .otherwise(MockResponse::text("done")),
        );
        let registry = ToolRegistry::new().with(SearchWebTool);
        let roster = Roster {
            teams: vec![
                TeamDescriptor::new(RESEARCH_TEAM, ["search"], CompletionPolicy::Silent),
                TeamDescriptor::new(WRITING_TEAM, ["search"], CompletionPolicy::Synthesize),
            ],
            workers: vec![WorkerSpec::new("search", ["search_web"])],
        };
        let graph = TeamGraph::build(model.clone(), &registry, &roster, GraphSettings::default()).unwrap();
        let context = RequestContext::new("research tokio", None);

        graph.run(ExecutionScope::new(&context, &NoopObserver)).await.unwrap();

        let saw_tool_result = model
            .calls()
            .iter()
            .flatten()
            .any(|message| message.content().contains("Search is not enabled"));
        assert!(saw_tool_result);
    }

    #[tokio::test]
    async fn frame_is_empty_after_run() {
        let model = Arc::new(ScriptedModel::new());
        let context = RequestContext::new("write a note", None);

        graph(model).run(ExecutionScope::new(&context, &NoopObserver)).await.unwrap();

        assert_eq!(context.frame().active_team, "");
        assert_eq!(context.frame().active_node, "");
    }
}
