//! Request and response bodies of the HTTP API.

use serde::{Deserialize, Serialize};

use crate::browse::DirEntry;

/// Envelope wrapping every JSON response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    /// Whether the request succeeded
    pub success: bool,
    /// Payload on success
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    /// Message on failure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    /// Successful response carrying `data`.
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    /// Failed response carrying `message`.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

/// Health check payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Always `healthy`
    pub status: String,
    /// Server version
    pub version: String,
    /// Number of registered sessions
    pub sessions: usize,
}

/// Query of `GET /api/browse`.
#[derive(Debug, Clone, Deserialize)]
pub struct BrowseQuery {
    /// Directory to list; the first browse root when omitted
    pub path: Option<String>,
}

/// Directory listing payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowseResponse {
    /// Canonical path of the listed directory
    pub path: String,
    /// Entries, sorted by name
    pub items: Vec<DirEntry>,
    /// Number of entries
    pub count: usize,
}

/// Body of `POST /api/sessions`.
#[derive(Debug, Clone, Deserialize)]
pub struct StartSessionRequest {
    /// File or directory the command runs against
    pub path: Option<String>,
    /// Extra arguments, split with shell quoting rules
    #[serde(default)]
    pub args: String,
}

/// Body of `POST /api/sessions/:id/input`.
#[derive(Debug, Clone, Deserialize)]
pub struct SendInputRequest {
    /// Text to write; empty submits an empty line
    #[serde(default)]
    pub input: String,
    /// Append a newline (off for raw keystrokes)
    #[serde(default = "default_newline")]
    pub newline: bool,
    /// Close stdin after writing
    #[serde(default)]
    pub eof: bool,
}

fn default_newline() -> bool {
    true
}

impl SendInputRequest {
    /// Bytes to write to the process.
    pub fn payload(&self) -> Vec<u8> {
        let mut bytes = self.input.as_bytes().to_vec();
        if self.newline {
            bytes.push(b'\n');
        }
        bytes
    }
}

/// Acknowledgement with a human readable message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    /// What happened
    pub message: String,
}

impl MessageResponse {
    /// Create a new message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
