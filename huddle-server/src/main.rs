//! Huddle Server - Main entry point
//!
//! Real-time engine for a live group exercise: HTTP API for joining,
//! submitting statements and triggering summary/matching, plus an SSE
//! stream pushing graph, counts and snapshots to every client.

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use huddle_common::config::ServerConfig;
use huddle_common::db::init::init_database;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use huddle_server::{build_router, AppState};

/// Command-line arguments for huddle-server
#[derive(Parser, Debug)]
#[command(name = "huddle-server")]
#[command(about = "Real-time pairing engine for live group exercises")]
#[command(version)]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value = "5870", env = "HUDDLE_PORT")]
    port: u16,

    /// Path to the SQLite database file
    #[arg(short, long, default_value = "huddle.db", env = "HUDDLE_DB")]
    database: PathBuf,

    /// Optional TOML config file
    #[arg(short, long, env = "HUDDLE_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "huddle_server=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    info!("Starting huddle-server on port {}", args.port);

    let config = ServerConfig::load(args.config.as_deref()).context("Failed to load config")?;
    if config.llm.api_key.is_none() {
        info!("No LLM API key configured; embeddings and summaries use local fallbacks");
    }

    let db = init_database(&args.database)
        .await
        .context("Failed to initialize database")?;

    let state = AppState::new(db, config);
    let app = build_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], args.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;
    info!("HTTP server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        }
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        }
    }
}
