//! HTTP routes of the session bridge.

pub mod error;
pub mod handlers;
pub mod stream;

use std::path::PathBuf;
use std::sync::Arc;

use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use exec_bridge_core::{CommandSettings, ServerConfig, SessionId};
use exec_bridge_session::{RegistryConfig, SessionRegistry};

use crate::browse::DirectoryLister;

pub use error::ApiError;
pub use stream::{Utf8Decoder, WireEvent};

/// State shared by every handler.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Live sessions
    pub registry: SessionRegistry,
    /// Filesystem access, confined to the browse roots
    pub lister: Arc<DirectoryLister>,
    /// Command every session runs
    pub command: Arc<CommandSettings>,
    /// Browser UI served for unknown paths
    pub static_dir: Option<PathBuf>,
}

impl AppState {
    /// Build the state from the server configuration.
    pub fn new(config: &ServerConfig) -> Self {
        Self {
            registry: SessionRegistry::with_config(RegistryConfig::from(&config.sessions)),
            lister: Arc::new(DirectoryLister::from_settings(&config.browse)),
            command: Arc::new(config.command.clone()),
            static_dir: config.server.static_dir.clone(),
        }
    }
}

/// Build the application router.
pub fn router(state: AppState) -> Router {
    let app = Router::new()
        .route("/api/health", get(handlers::health))
        .route("/api/browse", get(handlers::browse))
        .route(
            "/api/sessions",
            get(handlers::list_sessions).post(handlers::start_session),
        )
        .route(
            "/api/sessions/:id",
            get(handlers::get_session).delete(handlers::kill_session),
        )
        .route("/api/sessions/:id/stream", get(stream::stream_session))
        .route("/api/sessions/:id/input", post(handlers::send_input))
        .route("/api/sessions/:id/kill", post(handlers::kill_session));

    let app = match &state.static_dir {
        Some(dir) => app.fallback_service(ServeDir::new(dir).append_index_html_on_directories(true)),
        None => app.fallback(handlers::not_found),
    };

    app.with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Parse a session id from the path. A malformed id names no session.
pub(crate) fn parse_session_id(raw: &str) -> Result<SessionId, ApiError> {
    raw.parse::<SessionId>().map_err(|_| {
        ApiError::new(StatusCode::NOT_FOUND, format!("Session not found: {raw}"))
    })
}
