//! Chat agent service
//!
//! Drives a language model through bounded tool-use turns and keeps every
//! session's history in SQLite.

mod api;
mod config;
mod db;
mod llm;
mod runtime;
mod state_machine;
mod system_prompt;
mod title_generator;
mod tools;

use api::{create_router, AppState};
use config::AppConfig;
use db::Database;
use llm::ModelRegistry;
use runtime::{AgentConfig, AgentRuntime, DatabaseStorage, RegistryLlmClient};
use std::net::SocketAddr;
use std::sync::Arc;
use tools::ToolRegistry;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "chat_agent=info,tower_http=debug".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false),
        )
        .init();

    let config = AppConfig::from_env()?;

    // Ensure database directory exists
    if let Some(parent) = config.db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::create_dir_all(&config.artifact_dir)?;

    tracing::info!(path = %config.db_path.display(), "Opening database");
    let db = Database::open(&config.db_path)?;

    // Sessions interrupted mid-batch get error results for their dangling calls
    let repaired = db.repair_orphaned_tool_calls()?;
    if repaired > 0 {
        tracing::warn!(repaired, "Repaired orphaned tool calls");
    }

    let llm_registry = Arc::new(ModelRegistry::new(&config.llm));
    if llm_registry.has_models() {
        tracing::info!(
            models = ?llm_registry.available_models(),
            default = %llm_registry.default_model_id(),
            "LLM registry initialized"
        );
    } else {
        tracing::warn!(
            "No LLM API keys configured. Set {}.",
            ModelRegistry::missing_key_hint()
        );
    }

    let llm = Arc::new(RegistryLlmClient::new(
        llm_registry.clone(),
        llm_registry.default_model_id().to_string(),
    ));
    let tools = Arc::new(ToolRegistry::standard(&config.tool_settings()));

    let agent_config = AgentConfig::new(llm, tools)
        .with_policy(Arc::new(config.tool_policy()))
        .with_title_model(llm_registry.get_cheap_model())
        .with_limits(config.max_iterations, config.max_model_attempts)
        .with_dirs(config.working_dir.clone(), config.artifact_dir.clone());

    let runtime = Arc::new(AgentRuntime::new(
        DatabaseStorage::new(db.clone()),
        agent_config,
    ));
    let state = AppState::new(runtime, db, llm_registry);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let compression = CompressionLayer::new()
        .gzip(true)
        .br(true)
        .deflate(true)
        .zstd(true);

    let app = create_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(compression);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Chat agent listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
