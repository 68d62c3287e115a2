use thiserror::Error;

use crate::llm::ModelError;
use crate::tools::ToolError;

/// Errors that can occur in the agent system
///
/// Only graph wiring problems and configuration errors reach the caller of a
/// request; model and tool failures are recovered inside the graph.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("LLM API error: {0}")]
    Llm(#[from] ModelError),

    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    /// A team names a member without a worker spec
    #[error("Agent not found: {0}")]
    AgentNotFound(String),

    #[error("Team not found: {0}")]
    TeamNotFound(String),

    /// A node returned a `Goto` its caller cannot follow
    #[error("Invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    /// The client went away before the response finished
    #[error("Message delivery failed: {0}")]
    MessageDeliveryFailed(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

pub type AgentResult<T> = Result<T, AgentError>;
