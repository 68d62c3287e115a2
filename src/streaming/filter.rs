// Token filter
//
// Observes every model generation of one request and republishes only the
// text produced while the terminal team is active. Routing prompts and
// outputs that look like routing chatter are suppressed. Detection works on
// the text seen so far, so chunks emitted before a run is recognised as
// chatter are not retracted. Chunks that could still turn out to be a bare
// control keyword are held back until the run grows past it or ends.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use regex::Regex;
use tokio::sync::mpsc::UnboundedSender;

use super::events::{OutboundEvent, SessionFrame};
use crate::agents::context::RequestContext;
use crate::agents::events::{GenerationObserver, RunId};
use crate::agents::messages::Message;
use crate::agents::types::Roster;

/// Lowercased fragments that identify supervisor and routing prompts
const PROMPT_SIGNATURES: &[&str] = &[
    "as a supervisor",
    "acting as a supervisor",
    "next worker",
    "respond in json format",
    "respond with a json object",
];

/// Longer outputs are never treated as a bare control keyword
const MAX_KEYWORD_OUTPUT_LEN: usize = 32;

static ROUTING_KEY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""(next|decision|route|goto)"\s*:"#).unwrap());

/// Decides which generations are internal coordination
pub trait SuppressionClassifier: Send + Sync {
    /// True when the prompt belongs to a routing or supervisor call
    fn is_control_prompt(&self, prompt: &[Message]) -> bool;

    /// True when the text generated so far is routing output
    fn is_control_output(&self, buffered: &str) -> bool;

    /// True while the text generated so far may still complete into routing
    /// output; the filter holds such chunks back instead of publishing them
    fn is_partial_control_output(&self, _buffered: &str) -> bool {
        false
    }
}

/// Prompt signatures, JSON routing payloads and bare roster keywords
#[derive(Debug, Clone)]
pub struct DefaultClassifier {
    keywords: HashSet<String>,
}

impl DefaultClassifier {
    pub fn new(keywords: impl IntoIterator<Item = impl AsRef<str>>) -> Self {
        Self {
            keywords: keywords
                .into_iter()
                .map(|keyword| normalize(keyword.as_ref()))
                .filter(|keyword| !keyword.is_empty())
                .collect(),
        }
    }

    pub fn from_roster(roster: &Roster) -> Self {
        Self::new(roster.control_keywords())
    }
}

fn normalize(text: &str) -> String {
    text.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

fn is_routing_json(text: &str) -> bool {
    text.starts_with('{') && text.ends_with('}') && ROUTING_KEY.is_match(text)
}

impl SuppressionClassifier for DefaultClassifier {
    fn is_control_prompt(&self, prompt: &[Message]) -> bool {
        prompt.iter().any(|message| {
            let content = message.content().to_lowercase();
            PROMPT_SIGNATURES
                .iter()
                .any(|signature| content.contains(signature))
        })
    }

    fn is_control_output(&self, buffered: &str) -> bool {
        let trimmed = buffered.trim();
        if is_routing_json(trimmed) {
            return true;
        }

        let normalized = normalize(trimmed);
        !normalized.is_empty()
            && normalized.len() <= MAX_KEYWORD_OUTPUT_LEN
            && self.keywords.contains(&normalized)
    }

    fn is_partial_control_output(&self, buffered: &str) -> bool {
        let normalized = normalize(buffered);
        !normalized.is_empty()
            && normalized.len() <= MAX_KEYWORD_OUTPUT_LEN
            && self
                .keywords
                .iter()
                .any(|keyword| keyword.starts_with(&normalized))
    }
}

#[derive(Debug, Default)]
struct StreamRun {
    suppressed: bool,
    buffer: String,
    /// Visible chunks not yet published
    held: Vec<String>,
}

/// Per-request observer that publishes visible tokens onto the session
/// channel
pub struct TokenFilter {
    context: Arc<RequestContext>,
    classifier: Arc<dyn SuppressionClassifier>,
    sender: UnboundedSender<SessionFrame>,
    runs: Mutex<HashMap<RunId, StreamRun>>,
}

impl TokenFilter {
    pub fn new(
        context: Arc<RequestContext>,
        classifier: Arc<dyn SuppressionClassifier>,
        sender: UnboundedSender<SessionFrame>,
    ) -> Self {
        Self {
            context,
            classifier,
            sender,
            runs: Mutex::new(HashMap::new()),
        }
    }

    fn publish(&self, event: OutboundEvent) {
        if self.sender.send(SessionFrame::Event(event)).is_err() {
            tracing::debug!(request_id = %self.context.request_id(), "Dropping event, session closed");
        }
    }

    /// Publishes `chunks` as tokens tagged with the current frame
    fn publish_tokens(&self, chunks: Vec<String>) {
        if chunks.is_empty() {
            return;
        }
        let frame = self.context.frame();
        let team = non_empty(frame.active_team);
        let node = non_empty(frame.active_node);
        for content in chunks {
            self.publish(OutboundEvent::Token {
                content,
                team: team.clone(),
                node: node.clone(),
            });
        }
    }
}

fn non_empty(value: String) -> Option<String> {
    (!value.is_empty()).then_some(value)
}

impl GenerationObserver for TokenFilter {
    fn on_start(&self, run_id: &RunId, prompt: &[Message]) {
        let outside_terminal = !self.context.is_terminal_active();
        let suppressed = outside_terminal || self.classifier.is_control_prompt(prompt);

        tracing::debug!(
            request_id = %self.context.request_id(),
            run_id = %run_id,
            suppressed,
            "Generation started"
        );

        self.runs.lock().insert(
            run_id.clone(),
            StreamRun {
                suppressed,
                ..StreamRun::default()
            },
        );
    }

    fn on_chunk(&self, run_id: &RunId, text: &str) {
        if text.is_empty() {
            return;
        }

        let mut runs = self.runs.lock();
        let Some(run) = runs.get_mut(run_id) else {
            return;
        };
        if run.suppressed {
            return;
        }

        run.buffer.push_str(text);
        if self.classifier.is_partial_control_output(&run.buffer) {
            run.held.push(text.to_string());
            return;
        }
        if self.classifier.is_control_output(&run.buffer) {
            run.suppressed = true;
            run.held.clear();
            tracing::debug!(
                request_id = %self.context.request_id(),
                run_id = %run_id,
                "Suppressing routing output"
            );
            return;
        }

        let mut chunks = std::mem::take(&mut run.held);
        chunks.push(text.to_string());
        drop(runs);

        self.publish_tokens(chunks);
    }

    fn on_end(&self, run_id: &RunId) {
        let Some(run) = self.runs.lock().remove(run_id) else {
            return;
        };
        if run.suppressed {
            return;
        }
        if self.classifier.is_control_output(&run.buffer) {
            tracing::debug!(
                request_id = %self.context.request_id(),
                run_id = %run_id,
                "Suppressing routing output"
            );
            return;
        }

        if self.context.is_terminal_active() {
            self.publish_tokens(run.held);
            self.publish(OutboundEvent::End);
        }
    }

    fn on_error(&self, run_id: &RunId, message: &str) {
        self.runs.lock().remove(run_id);
        tracing::warn!(
            request_id = %self.context.request_id(),
            run_id = %run_id,
            "Generation failed: {}",
            message
        );
        self.publish(OutboundEvent::error(message));
    }
}
