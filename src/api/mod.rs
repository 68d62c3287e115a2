// API layer module (HTTP adapter over the chat service)

pub mod errors;
pub mod handlers;

use axum::{routing::get, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::streaming::ChatService;

/// Shared state for all handlers
#[derive(Clone)]
pub struct AppState {
    pub chat: ChatService,
}

impl AppState {
    pub fn new(chat: ChatService) -> Self {
        Self { chat }
    }
}

/// Build the application router
pub fn router(state: AppState) -> Router {
    // Any origin may open the stream
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/health", get(handlers::health::health_check))
        .route("/api/chat/stream", get(handlers::chat::chat_stream))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
