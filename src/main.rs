use std::net::SocketAddr;

use agent_teams_api::api::{self, AppState};
use agent_teams_api::config::AppConfig;
use agent_teams_api::streaming::ChatService;

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    // Load environment variables
    dotenv::dotenv().ok();

    let config = AppConfig::from_env().expect("Invalid configuration");
    if config.llm.api_key.is_none() {
        tracing::warn!("LLM_API_KEY not set, model calls will be unauthenticated");
    }
    tracing::info!(
        model = %config.llm.model,
        tools_enabled = config.tools_enabled,
        "Using model backend at {}",
        config.llm.base_url
    );

    // Build router
    let chat = ChatService::from_config(&config);
    let app = api::router(AppState::new(chat));

    // Start server
    let addr: SocketAddr = config.bind_addr.parse().expect("Invalid BIND_ADDR");
    tracing::info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind address");

    axum::serve(listener, app)
        .await
        .expect("Server failed");
}
