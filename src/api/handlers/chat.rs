use std::convert::Infallible;

use axum::{
    extract::{rejection::QueryRejection, Query, State},
    response::{
        sse::{KeepAlive, Sse},
        IntoResponse, Response,
    },
};
use futures::StreamExt;
use serde::Deserialize;

use crate::api::errors::ApiError;
use crate::api::AppState;

/// Query string of the chat stream; GET keeps it usable from `EventSource`
#[derive(Debug, Deserialize)]
pub struct ChatStreamQuery {
    #[serde(default)]
    pub message: String,
    pub conversation_id: Option<String>,
}

/// Stream the agent teams' answer to a message as server-sent events
///
/// GET /api/chat/stream?message=...&conversation_id=...
pub async fn chat_stream(
    State(state): State<AppState>,
    query: Result<Query<ChatStreamQuery>, QueryRejection>,
) -> Result<Response, ApiError> {
    let Query(query) = query?;
    if query.message.trim().is_empty() {
        return Err(ApiError::bad_request("message must not be empty"));
    }

    tracing::info!(
        conversation_id = ?query.conversation_id,
        "Chat stream requested"
    );

    let events = state
        .chat
        .handle(query.message, query.conversation_id)
        .map(Ok::<_, Infallible>);

    Ok(Sse::new(events)
        .keep_alive(KeepAlive::default())
        .into_response())
}
