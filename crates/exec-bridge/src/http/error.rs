//! Mapping of domain errors onto HTTP responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use tracing::{error, warn};

use exec_bridge_core::Error;

use crate::api::ApiResponse;

/// An error ready to be sent to the client in the JSON envelope.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    /// Create an error with an explicit status.
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    /// 400 with `message`.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    /// HTTP status of this error.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Client-facing message.
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// HTTP status for a domain error.
pub fn status_for(err: &Error) -> StatusCode {
    match err {
        Error::NotFound(_) | Error::SessionNotFound(_) | Error::StreamClosed => {
            StatusCode::NOT_FOUND
        }
        Error::PathNotAllowed(_) | Error::PermissionDenied(_) => StatusCode::FORBIDDEN,
        Error::InvalidArguments(_)
        | Error::NotADirectory(_)
        | Error::NotRunning
        | Error::InvalidInput(_) => StatusCode::BAD_REQUEST,
        Error::SubscriberAttached => StatusCode::CONFLICT,
        Error::SessionLimitReached(_) => StatusCode::TOO_MANY_REQUESTS,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        let status = status_for(&err);
        if status.is_server_error() {
            error!("Request failed: {}", err);
        } else {
            warn!("Request rejected ({}): {}", status.as_u16(), err);
        }
        Self::new(status, err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ApiResponse::<()>::error(self.message))).into_response()
    }
}
