use serde::{Deserialize, Serialize};

/// Name of the team that gathers information before authoring
pub const RESEARCH_TEAM: &str = "research_team";

/// Name of the authoring team; its synthesis is what the user sees
pub const WRITING_TEAM: &str = "writing_team";

/// What a team supervisor does once its members have contributed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompletionPolicy {
    /// Consolidate member outputs into one message when the team is the
    /// terminal stage
    Synthesize,
    /// Complete without adding a message
    Silent,
}

/// Static configuration of one team
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamDescriptor {
    pub name: String,
    /// Member worker names, in routing priority order
    pub members: Vec<String>,
    pub policy: CompletionPolicy,
}

impl TeamDescriptor {
    pub fn new(
        name: impl Into<String>,
        members: impl IntoIterator<Item = impl Into<String>>,
        policy: CompletionPolicy,
    ) -> Self {
        Self {
            name: name.into(),
            members: members.into_iter().map(Into::into).collect(),
            policy,
        }
    }
}

/// Specification for a worker agent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerSpec {
    pub name: String,
    /// Fixed instruction placed in front of the history, if any
    pub instruction: Option<String>,
    /// Names of the tools this worker may call
    pub tools: Vec<String>,
}

impl WorkerSpec {
    pub fn new(name: impl Into<String>, tools: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            name: name.into(),
            instruction: None,
            tools: tools.into_iter().map(Into::into).collect(),
        }
    }

    pub fn with_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.instruction = Some(instruction.into());
        self
    }
}

/// Every team and worker known to the service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Roster {
    pub teams: Vec<TeamDescriptor>,
    pub workers: Vec<WorkerSpec>,
}

impl Roster {
    /// Research and writing teams with their workers
    pub fn standard() -> Self {
        Self {
            teams: vec![
                TeamDescriptor::new(
                    RESEARCH_TEAM,
                    ["search", "web_scraper"],
                    CompletionPolicy::Silent,
                ),
                TeamDescriptor::new(
                    WRITING_TEAM,
                    ["doc_writer", "note_taker"],
                    CompletionPolicy::Synthesize,
                ),
            ],
            workers: vec![
                WorkerSpec::new("search", ["search_web"]),
                WorkerSpec::new("web_scraper", ["scrape_webpages"]),
                WorkerSpec::new(
                    "doc_writer",
                    ["write_document", "edit_document", "read_document"],
                )
                .with_instruction(
                    "You can read, write and edit documents based on note-taker's outlines. \
                     Don't ask follow-up questions.",
                ),
                WorkerSpec::new("note_taker", ["create_outline", "read_document"]).with_instruction(
                    "You can read documents and create outlines for the document writer. \
                     Don't ask follow-up questions.",
                ),
            ],
        }
    }

    pub fn team(&self, name: &str) -> Option<&TeamDescriptor> {
        self.teams.iter().find(|team| team.name == name)
    }

    pub fn worker(&self, name: &str) -> Option<&WorkerSpec> {
        self.workers.iter().find(|worker| worker.name == name)
    }

    /// Team names, worker names and control words; short outputs equal to one
    /// of these are routing chatter rather than user content
    pub fn control_keywords(&self) -> Vec<String> {
        self.teams
            .iter()
            .map(|team| team.name.clone())
            .chain(self.workers.iter().map(|worker| worker.name.clone()))
            .chain(["COMPLETE", "END", "FINISH"].map(String::from))
            .collect()
    }
}

/// Lifecycle status of one request
///
/// # Status Transitions
/// ```text
/// Active -> Processing -> Completed
///   |            +------> Failed
///   +-------------------> Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    /// Request accepted, execution not started
    Active,
    /// Team graph is running
    Processing,
    /// Graph reached its end state
    Completed,
    /// Initialization failed or the client went away
    Failed,
}

impl RequestStatus {
    /// Checks if a transition from current status to next status is valid
    ///
    /// # Example
    /// ```
    /// use agent_teams_api::agents::types::RequestStatus;
    ///
    /// assert!(RequestStatus::Active.can_transition_to(RequestStatus::Processing));
    /// assert!(!RequestStatus::Completed.can_transition_to(RequestStatus::Processing));
    /// ```
    pub fn can_transition_to(&self, next: RequestStatus) -> bool {
        use RequestStatus::*;
        matches!(
            (self, next),
            (Active, Processing) | (Active, Failed) | (Processing, Completed) | (Processing, Failed)
        )
    }
}

impl std::fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RequestStatus::Active => write!(f, "active"),
            RequestStatus::Processing => write!(f, "processing"),
            RequestStatus::Completed => write!(f, "completed"),
            RequestStatus::Failed => write!(f, "failed"),
        }
    }
}
