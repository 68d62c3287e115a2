// Model generation lifecycle events
//
// Every model call made by the agent system is reported to a
// `GenerationObserver` as start, zero or more chunks, and end or error. The
// streaming layer implements the observer to decide what reaches the client.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::messages::Message;

/// Identifies one model generation
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(String);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&str> for RunId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Receives generation lifecycle events
pub trait GenerationObserver: Send + Sync {
    /// A generation is starting with the given prompt
    fn on_start(&self, run_id: &RunId, prompt: &[Message]);

    /// A piece of generated text arrived
    fn on_chunk(&self, run_id: &RunId, text: &str);

    /// The generation finished
    fn on_end(&self, run_id: &RunId);

    /// The generation failed
    fn on_error(&self, run_id: &RunId, message: &str);
}

/// Observer that ignores everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl GenerationObserver for NoopObserver {
    fn on_start(&self, _run_id: &RunId, _prompt: &[Message]) {}

    fn on_chunk(&self, _run_id: &RunId, _text: &str) {}

    fn on_end(&self, _run_id: &RunId) {}

    fn on_error(&self, _run_id: &RunId, _message: &str) {}
}
