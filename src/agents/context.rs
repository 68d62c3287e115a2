// Per-request execution context
//
// Every request owns one `RequestContext`, passed by reference through the
// dispatcher, supervisors and workers and shared with that request's token
// filter. Frame fields are pushed with guards that restore the previous value
// when dropped, so early returns and panics unwind the stack correctly.

use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use uuid::Uuid;

use super::events::GenerationObserver;
use super::types::RequestStatus;

/// Snapshot of who is currently executing
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ContextFrame {
    pub active_team: String,
    pub active_node: String,
    pub request_id: String,
}

/// Correlation data for one request
#[derive(Debug, Clone, Serialize)]
pub struct RequestMetadata {
    pub request_id: String,
    pub conversation_id: Option<String>,
    pub user_message: String,
    pub start_time: DateTime<Utc>,
    pub status: RequestStatus,
    pub updated_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy)]
enum Slot {
    Team,
    Node,
}

/// Restores a frame field to its previous value on drop
#[must_use = "the frame is restored as soon as the guard is dropped"]
pub struct FrameGuard<'a> {
    context: &'a RequestContext,
    slot: Slot,
    previous: String,
}

impl Drop for FrameGuard<'_> {
    fn drop(&mut self) {
        let previous = std::mem::take(&mut self.previous);
        let mut frame = self.context.frame.lock();
        match self.slot {
            Slot::Team => frame.active_team = previous,
            Slot::Node => frame.active_node = previous,
        }
    }
}

/// Execution state visible to every layer of one request
#[derive(Debug)]
pub struct RequestContext {
    frame: Mutex<ContextFrame>,
    terminal_team: OnceLock<String>,
    metadata: Mutex<RequestMetadata>,
}

impl RequestContext {
    /// Creates the context for a new request with status `active`
    pub fn new(user_message: impl Into<String>, conversation_id: Option<String>) -> Self {
        let request_id = Uuid::new_v4().simple().to_string()[..8].to_string();

        let metadata = RequestMetadata {
            request_id: request_id.clone(),
            conversation_id,
            user_message: user_message.into(),
            start_time: Utc::now(),
            status: RequestStatus::Active,
            updated_time: None,
        };

        tracing::info!(request_id = %request_id, "Initialized request context");

        Self {
            frame: Mutex::new(ContextFrame {
                request_id,
                ..ContextFrame::default()
            }),
            terminal_team: OnceLock::new(),
            metadata: Mutex::new(metadata),
        }
    }

    pub fn request_id(&self) -> String {
        self.frame.lock().request_id.clone()
    }

    /// Current frame snapshot
    pub fn frame(&self) -> ContextFrame {
        self.frame.lock().clone()
    }

    /// Sets the active team until the returned guard is dropped
    pub fn enter_team(&self, team: &str) -> FrameGuard<'_> {
        self.enter(Slot::Team, team)
    }

    /// Sets the active node until the returned guard is dropped
    pub fn enter_node(&self, node: &str) -> FrameGuard<'_> {
        self.enter(Slot::Node, node)
    }

    fn enter(&self, slot: Slot, value: &str) -> FrameGuard<'_> {
        let mut frame = self.frame.lock();
        let field = match slot {
            Slot::Team => &mut frame.active_team,
            Slot::Node => &mut frame.active_node,
        };
        let previous = std::mem::replace(field, value.to_string());

        FrameGuard {
            context: self,
            slot,
            previous,
        }
    }

    /// Marks `team` as the user-facing stage. Only the first call has any
    /// effect; returns whether this call set the marker.
    pub fn mark_terminal(&self, team: &str) -> bool {
        let marked = self.terminal_team.set(team.to_string()).is_ok();
        if marked {
            tracing::info!(request_id = %self.request_id(), team, "Marked terminal stage");
        }
        marked
    }

    pub fn terminal_team(&self) -> Option<&str> {
        self.terminal_team.get().map(String::as_str)
    }

    pub fn is_terminal_team(&self, team: &str) -> bool {
        self.terminal_team() == Some(team)
    }

    /// True when the currently active team is the terminal stage
    pub fn is_terminal_active(&self) -> bool {
        let frame = self.frame.lock();
        self.is_terminal_team(&frame.active_team)
    }

    /// Moves the request to `status`; invalid transitions are ignored
    pub fn set_status(&self, status: RequestStatus) {
        let mut metadata = self.metadata.lock();
        if !metadata.status.can_transition_to(status) {
            tracing::warn!(
                request_id = %metadata.request_id,
                "Ignoring request status change {} -> {}",
                metadata.status,
                status
            );
            return;
        }
        metadata.status = status;
        metadata.updated_time = Some(Utc::now());
    }

    pub fn metadata(&self) -> RequestMetadata {
        self.metadata.lock().clone()
    }
}

/// What every step of the graph receives: the request context and the
/// observer its model calls report to
#[derive(Clone, Copy)]
pub struct ExecutionScope<'a> {
    pub context: &'a RequestContext,
    pub observer: &'a dyn GenerationObserver,
}

impl<'a> ExecutionScope<'a> {
    pub fn new(context: &'a RequestContext, observer: &'a dyn GenerationObserver) -> Self {
        Self { context, observer }
    }
}
