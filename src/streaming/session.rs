// Request sessions
//
// One inbound chat request becomes one producer task running the team graph
// and one consumer stream draining the session channel into SSE events. The
// producer always finishes by enqueueing `SessionFrame::Done`, and the
// consumer always finishes with the `[DONE]` event.

use std::sync::Arc;

use axum::response::sse::Event;
use futures::stream::{self, BoxStream, Stream, StreamExt};
use serde_json::json;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use super::events::{OutboundEvent, SessionFrame, DONE_MARKER};
use super::filter::{DefaultClassifier, SuppressionClassifier, TokenFilter};
use crate::agents::context::{ExecutionScope, RequestContext};
use crate::agents::errors::AgentError;
use crate::agents::graph::{GraphSettings, TeamGraph};
use crate::agents::types::{RequestStatus, Roster};
use crate::config::AppConfig;
use crate::llm::{ChatModel, OpenAiCompatModel};
use crate::tools::ToolRegistry;

/// Entry point for chat requests
#[derive(Clone)]
pub struct ChatService {
    model: Arc<dyn ChatModel>,
    registry: ToolRegistry,
    roster: Arc<Roster>,
    settings: GraphSettings,
    classifier: Arc<dyn SuppressionClassifier>,
}

impl ChatService {
    pub fn new(
        model: Arc<dyn ChatModel>,
        registry: ToolRegistry,
        roster: Roster,
        settings: GraphSettings,
    ) -> Self {
        let classifier = Arc::new(DefaultClassifier::from_roster(&roster));
        Self {
            model,
            registry,
            roster: Arc::new(roster),
            settings,
            classifier,
        }
    }

    /// Standard roster and tools talking to the configured model backend
    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            Arc::new(OpenAiCompatModel::new(config.llm.clone())),
            ToolRegistry::standard(config),
            Roster::standard(),
            GraphSettings::from(config),
        )
    }

    pub fn with_classifier(mut self, classifier: Arc<dyn SuppressionClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    /// Starts a request and returns its SSE event stream
    ///
    /// If the graph cannot be built the stream carries a single error event
    /// and `[DONE]`; nothing is executed. Must be called inside a tokio
    /// runtime.
    pub fn handle(
        &self,
        message: impl Into<String>,
        conversation_id: Option<String>,
    ) -> BoxStream<'static, Event> {
        let context = Arc::new(RequestContext::new(message, conversation_id));
        let (tx, rx) = mpsc::unbounded_channel();

        match TeamGraph::build(self.model.clone(), &self.registry, &self.roster, self.settings) {
            Ok(graph) => {
                tokio::spawn(produce(graph, context, self.classifier.clone(), tx));
            }
            Err(e) => {
                tracing::error!(
                    request_id = %context.request_id(),
                    "Failed to build team graph: {}",
                    e
                );
                context.set_status(RequestStatus::Failed);
                let _ = tx.send(SessionFrame::Event(OutboundEvent::error(e.to_string())));
                let _ = tx.send(SessionFrame::Done);
            }
        }

        encode_frames(rx, SessionFrame::to_event).boxed()
    }
}

/// Enqueues the closing sentinel however the producer exits
struct DoneGuard(UnboundedSender<SessionFrame>);

impl Drop for DoneGuard {
    fn drop(&mut self) {
        let _ = self.0.send(SessionFrame::Done);
    }
}

async fn produce(
    graph: TeamGraph,
    context: Arc<RequestContext>,
    classifier: Arc<dyn SuppressionClassifier>,
    tx: UnboundedSender<SessionFrame>,
) {
    let _done = DoneGuard(tx.clone());
    let filter = TokenFilter::new(context.clone(), classifier, tx.clone());
    let scope = ExecutionScope::new(&context, &filter);

    context.set_status(RequestStatus::Processing);
    tracing::info!(request_id = %context.request_id(), "Request processing started");

    let outcome = tokio::select! {
        result = graph.run(scope) => result.map(|_| ()),
        _ = tx.closed() => Err(AgentError::MessageDeliveryFailed("client disconnected".to_string())),
    };

    match outcome {
        Ok(()) => {
            context.set_status(RequestStatus::Completed);
            tracing::info!(request_id = %context.request_id(), "Request completed");
        }
        Err(AgentError::MessageDeliveryFailed(reason)) => {
            context.set_status(RequestStatus::Failed);
            tracing::warn!(request_id = %context.request_id(), "Request abandoned: {}", reason);
        }
        Err(e) => {
            context.set_status(RequestStatus::Failed);
            tracing::error!(request_id = %context.request_id(), "Request failed: {}", e);
            let _ = tx.send(SessionFrame::Event(OutboundEvent::error(e.to_string())));
        }
    }
}

enum Drain {
    Open(UnboundedReceiver<SessionFrame>),
    Closing,
    Finished,
}

fn stream_error_event(error: &serde_json::Error) -> Event {
    let event = json!({"type": "error", "message": format!("stream_error: {}", error)});
    Event::default().data(event.to_string())
}

fn done_event() -> Event {
    Event::default().data(DONE_MARKER)
}

/// Turns the session channel into SSE events, ending with `[DONE]` when the
/// sentinel arrives, the channel closes, or a frame fails to encode
pub(crate) fn encode_frames<E>(
    rx: UnboundedReceiver<SessionFrame>,
    encode: E,
) -> impl Stream<Item = Event> + Send + 'static
where
    E: Fn(&SessionFrame) -> Result<Event, serde_json::Error> + Send + 'static,
{
    stream::unfold((Drain::Open(rx), encode), |(drain, encode)| async move {
        match drain {
            Drain::Open(mut rx) => match rx.recv().await {
                Some(SessionFrame::Done) | None => Some((done_event(), (Drain::Finished, encode))),
                Some(frame) => match encode(&frame) {
                    Ok(event) => Some((event, (Drain::Open(rx), encode))),
                    Err(e) => {
                        tracing::warn!("Failed to encode stream frame: {}", e);
                        Some((stream_error_event(&e), (Drain::Closing, encode)))
                    }
                },
            },
            Drain::Closing => Some((done_event(), (Drain::Finished, encode))),
            Drain::Finished => None,
        }
    })
}
