//! JSON endpoint handlers.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use tracing::info;

use exec_bridge_core::{Error, SessionInfo};

use crate::api::{
    ApiResponse, BrowseQuery, BrowseResponse, HealthResponse, MessageResponse, SendInputRequest,
    StartSessionRequest,
};
use crate::command::build_command;

use super::error::ApiError;
use super::{parse_session_id, AppState};

type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

/// `GET /api/health`
pub async fn health(State(state): State<AppState>) -> Json<ApiResponse<HealthResponse>> {
    Json(ApiResponse::success(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        sessions: state.registry.session_count(),
    }))
}

/// `GET /api/browse?path=`
pub async fn browse(
    State(state): State<AppState>,
    Query(query): Query<BrowseQuery>,
) -> ApiResult<BrowseResponse> {
    let path = match query.path.filter(|p| !p.is_empty()) {
        Some(path) => path,
        None => state
            .lister
            .default_path()
            .map(|p| p.to_string_lossy().into_owned())
            .ok_or_else(|| Error::PathNotAllowed("no browse roots configured".to_string()))?,
    };

    let (dir, items) = state.lister.list(&path).await?;
    Ok(Json(ApiResponse::success(BrowseResponse {
        path: dir.to_string_lossy().into_owned(),
        count: items.len(),
        items,
    })))
}

/// `POST /api/sessions`
pub async fn start_session(
    State(state): State<AppState>,
    payload: Result<Json<StartSessionRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ApiResponse<SessionInfo>>), ApiError> {
    let Json(request) = payload.map_err(|e| ApiError::bad_request(e.body_text()))?;

    let path = request
        .path
        .filter(|p| !p.is_empty())
        .ok_or_else(|| Error::InvalidArguments("missing path".to_string()))?;

    let target = state.lister.resolve(&path).await?;
    let command = build_command(&state.command, &target, &request.args)?;
    let session = state.registry.create(command)?;

    info!("Started session {} for {}", session.id(), target.display());
    Ok((StatusCode::CREATED, Json(ApiResponse::success(session.info()))))
}

/// `GET /api/sessions`
pub async fn list_sessions(State(state): State<AppState>) -> Json<ApiResponse<Vec<SessionInfo>>> {
    Json(ApiResponse::success(state.registry.list()))
}

/// `GET /api/sessions/:id`
pub async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<SessionInfo> {
    let session_id = parse_session_id(&id)?;
    let session = state.registry.get(&session_id)?;
    Ok(Json(ApiResponse::success(session.info())))
}

/// `POST /api/sessions/:id/input`
pub async fn send_input(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<SendInputRequest>, JsonRejection>,
) -> ApiResult<MessageResponse> {
    let Json(request) = payload.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let session_id = parse_session_id(&id)?;
    let session = state.registry.get(&session_id)?;

    session.write_input(&request.payload()).await?;
    if request.eof {
        session.close_input().await;
    }

    Ok(Json(ApiResponse::success(MessageResponse::new("Input sent"))))
}

/// `POST /api/sessions/:id/kill` and `DELETE /api/sessions/:id`
///
/// Always succeeds; killing an unknown or already reclaimed session is a no-op.
pub async fn kill_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Json<ApiResponse<MessageResponse>> {
    let removed = match parse_session_id(&id) {
        Ok(session_id) => state.registry.remove(&session_id).await,
        Err(_) => false,
    };

    let message = if removed {
        "Process terminated"
    } else {
        "No running session"
    };
    Json(ApiResponse::success(MessageResponse::new(message)))
}

/// Fallback for unknown routes.
pub async fn not_found() -> ApiError {
    ApiError::new(StatusCode::NOT_FOUND, "Not found")
}
