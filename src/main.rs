//! Turnloom server binary.
//!
//! Wires the engine from environment configuration and serves the HTTP
//! surface until SIGINT/SIGTERM.

use std::sync::Arc;

use miette::IntoDiagnostic;
use tracing::info;

use turnloom::config::{EngineConfig, ServerConfig};
use turnloom::engine::TurnEngine;
use turnloom::model::OpenAiCompatInvoker;
use turnloom::retrieval::InMemoryRetriever;
use turnloom::server::{self, AppState};
use turnloom::telemetry;
use turnloom::tools::{BacktestTool, ToolRegistry};

#[tokio::main]
async fn main() -> miette::Result<()> {
    // Load .env before anything reads the environment. Missing file is fine.
    let _ = dotenvy::dotenv();
    telemetry::init();

    let config = ServerConfig::from_env()
        .map_err(|e| miette::miette!("MODEL_API_KEY must be set: {e}"))?;

    #[cfg(feature = "sqlite")]
    let checkpointer: Arc<dyn turnloom::checkpoint::Checkpointer> = Arc::new(
        turnloom::checkpoint::SqliteCheckpointer::connect(&config.sqlite_url)
            .await
            .into_diagnostic()?,
    );
    #[cfg(not(feature = "sqlite"))]
    let checkpointer: Arc<dyn turnloom::checkpoint::Checkpointer> =
        Arc::new(turnloom::checkpoint::InMemoryCheckpointer::new());

    let model = Arc::new(OpenAiCompatInvoker::new(
        &config.model_base_url,
        &config.model_api_key,
        &config.model_name,
    ));
    let retriever = Arc::new(InMemoryRetriever::new());

    let tools = ToolRegistry::new().register(BacktestTool::new(&config.backtest_base_url));

    let engine = TurnEngine::new(checkpointer, model, retriever.clone())
        .with_tools(tools)
        .with_config(EngineConfig::default().with_system_prompt(
            "You are a quantitative trading assistant. Use the execute_backtest \
             tool to evaluate strategies before recommending them.",
        ));

    let state = AppState {
        engine: Arc::new(engine),
        retriever,
    };

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .into_diagnostic()?;
    info!(addr = %config.bind_addr, "turnloom listening");

    axum::serve(listener, server::router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .into_diagnostic()?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
    info!("shutdown signal received");
}
