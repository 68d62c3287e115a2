// Execution state threaded through the team graph
//
// Each hop takes the previous state by value and returns a new one built from
// it plus a `StatePatch`; no two steps ever mutate the same instance.

use std::collections::BTreeMap;

use serde::Serialize;

use super::messages::{Message, Role};

/// Where control goes after a step
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Goto {
    /// Run the named member of the current team
    Worker(String),
    /// Return to the team supervisor
    Supervisor,
    /// Return to the top-level dispatcher
    Dispatcher,
    /// Run the named team
    Team(String),
    /// Finish the request
    End,
}

impl std::fmt::Display for Goto {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Goto::Worker(name) | Goto::Team(name) => write!(f, "{}", name),
            Goto::Supervisor => write!(f, "supervisor"),
            Goto::Dispatcher => write!(f, "dispatcher"),
            Goto::End => write!(f, "__end__"),
        }
    }
}

/// Changes produced by one step
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StatePatch {
    pub messages: Vec<Message>,
    pub done: Vec<String>,
    pub next_target: Option<String>,
    pub terminal_team: Option<String>,
}

impl StatePatch {
    pub fn message(message: Message) -> Self {
        Self {
            messages: vec![message],
            ..Self::default()
        }
    }

    pub fn next(target: impl Into<String>) -> Self {
        Self {
            next_target: Some(target.into()),
            ..Self::default()
        }
    }

    pub fn mark_done(mut self, team: impl Into<String>) -> Self {
        self.done.push(team.into());
        self
    }

    pub fn mark_terminal(mut self, team: impl Into<String>) -> Self {
        self.terminal_team = Some(team.into());
        self
    }
}

/// Routing decision of a graph node plus the state changes it makes
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Command {
    pub goto: Goto,
    pub update: StatePatch,
}

impl Command {
    pub fn new(goto: Goto, update: StatePatch) -> Self {
        Self { goto, update }
    }

    pub fn goto(goto: Goto) -> Self {
        Self::new(goto, StatePatch::default())
    }
}

/// State of one request's run through the graph
#[derive(Debug, Clone, Default, Serialize)]
pub struct ExecutionState {
    history: Vec<Message>,
    team_done: BTreeMap<String, bool>,
    next_target: Option<String>,
    terminal_team: Option<String>,
}

impl ExecutionState {
    /// Initial state seeded with the user's request
    pub fn seeded(user_message: impl Into<String>) -> Self {
        Self {
            history: vec![Message::user(user_message)],
            ..Self::default()
        }
    }

    /// Builds the successor state. The terminal team, once set, is kept.
    pub fn apply(mut self, patch: StatePatch) -> Self {
        self.history.extend(patch.messages);
        for team in patch.done {
            self.team_done.insert(team, true);
        }
        if patch.next_target.is_some() {
            self.next_target = patch.next_target;
        }
        if self.terminal_team.is_none() {
            self.terminal_team = patch.terminal_team;
        }
        self
    }

    pub fn history(&self) -> &[Message] {
        &self.history
    }

    pub fn is_done(&self, team: &str) -> bool {
        self.team_done.get(team).copied().unwrap_or(false)
    }

    pub fn next_target(&self) -> Option<&str> {
        self.next_target.as_deref()
    }

    pub fn terminal_team(&self) -> Option<&str> {
        self.terminal_team.as_deref()
    }

    /// Content of the first user message
    pub fn initial_request(&self) -> &str {
        self.history
            .iter()
            .find(|message| message.role() == Role::User)
            .map(Message::content)
            .unwrap_or("")
    }

    /// Messages authored by `members` after the most recent user message
    pub fn member_messages_since_last_user(&self, members: &[String]) -> Vec<&Message> {
        let start = self
            .history
            .iter()
            .rposition(|message| message.role() == Role::User)
            .map_or(0, |index| index + 1);

        self.history[start..]
            .iter()
            .filter(|message| message.is_authored_by_any(members))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn members() -> Vec<String> {
        vec!["search".to_string(), "web_scraper".to_string()]
    }

    #[test]
    fn seeded_state_holds_user_message() {
        let state = ExecutionState::seeded("Research Rust runtimes");

        assert_eq!(state.history().len(), 1);
        assert_eq!(state.initial_request(), "Research Rust runtimes");
        assert!(!state.is_done("research_team"));
    }

    #[test]
    fn apply_appends_and_marks_done() {
        let state = ExecutionState::seeded("hi").apply(
            StatePatch::message(Message::assistant("found").authored_by("search"))
                .mark_done("research_team"),
        );

        assert_eq!(state.history().len(), 2);
        assert!(state.is_done("research_team"));
        assert!(!state.is_done("writing_team"));
    }

    #[test]
    fn terminal_team_is_kept_once_set() {
        let state = ExecutionState::seeded("hi")
            .apply(StatePatch::next("writing_team").mark_terminal("writing_team"))
            .apply(StatePatch::next("research_team").mark_terminal("research_team"));

        assert_eq!(state.terminal_team(), Some("writing_team"));
        assert_eq!(state.next_target(), Some("research_team"));
    }

    #[test]
    fn member_messages_ignore_earlier_turns_and_other_authors() {
        let state = ExecutionState::seeded("first")
            .apply(StatePatch::message(Message::assistant("old").authored_by("search")))
            .apply(StatePatch::message(Message::user("second")))
            .apply(StatePatch::message(Message::assistant("draft").authored_by("doc_writer")))
            .apply(StatePatch::message(Message::assistant("page").authored_by("web_scraper")));

        let contributions = state.member_messages_since_last_user(&members());

        assert_eq!(contributions.len(), 1);
        assert_eq!(contributions[0].content(), "page");
    }
}
