//! # exec-bridge
//!
//! Interactive session bridge: browse the server's filesystem, start a
//! program against a selected path and drive it from the browser.
//!
//! ## Overview
//!
//! This server provides HTTP endpoints for:
//! - Directory browsing below the configured roots
//! - Session management (start, list, kill)
//! - Live output streaming over server-sent events
//! - Sending input lines and keystrokes

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use exec_bridge::{router, AppState};
use exec_bridge_core::ServerConfig;
use exec_bridge_session::SessionRegistry;

/// Command line arguments.
#[derive(Debug, Parser)]
#[command(name = "exec-bridge", version, about)]
struct Args {
    /// YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen address, overrides `server.bind`
    #[arg(short, long)]
    bind: Option<String>,

    /// Log level, overrides `server.log_level` (RUST_LOG takes precedence)
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => ServerConfig::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => ServerConfig::default(),
    };
    if let Some(bind) = args.bind {
        config.server.bind = bind;
    }
    if let Some(level) = args.log_level {
        config.server.log_level = level;
    }
    config.validate().context("Invalid configuration")?;

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.server.log_level)),
        )
        .init();

    info!("exec-bridge v{} starting...", env!("CARGO_PKG_VERSION"));
    info!(
        "Sessions run '{}' (max {} concurrent)",
        config.command.base_spec(),
        config.sessions.max_sessions
    );

    let state = AppState::new(&config);
    let registry = state.registry.clone();
    let app = router(state);

    let addr: SocketAddr = config
        .server
        .bind
        .parse()
        .context("Invalid server address")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {addr}"))?;

    info!("HTTP server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown(registry.clone()))
        .await
        .context("HTTP server error")?;

    // Sessions started while the server was draining
    registry.shutdown().await;
    info!("exec-bridge shut down");

    Ok(())
}

/// Resolves on Ctrl-C or SIGTERM, after every session has been terminated.
///
/// Open output streams only end once their session does, so the sessions go
/// first and the server can then finish draining connections.
async fn shutdown(registry: SessionRegistry) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C signal"),
        _ = terminate => info!("Received SIGTERM signal"),
    }

    info!("Shutting down, terminating {} sessions", registry.session_count());
    registry.shutdown().await;
}
