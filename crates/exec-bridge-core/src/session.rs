//! Session types for process session tracking.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for an execution session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
    /// Create a new random session ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl From<Uuid> for SessionId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for SessionId {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|_| crate::Error::InvalidInput(format!("Invalid session ID format: {s}")))
    }
}

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Session record exists, process not yet confirmed
    Starting,
    /// Child process is running
    Running,
    /// Child process exited on its own
    Exited,
    /// Child process was terminated on request
    Killed,
    /// Child process could not be spawned
    Failed,
}

impl SessionState {
    /// Whether no further transitions can happen from this state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Exited | Self::Killed | Self::Failed)
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Exited => "exited",
            Self::Killed => "killed",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Snapshot of a session, as reported to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionInfo {
    /// Session identifier
    pub id: SessionId,
    /// Current state
    pub state: SessionState,
    /// Rendered command line
    pub command: String,
    /// Exit code, set only on natural exit
    pub exit_code: Option<i32>,
    /// Creation time
    pub created_at: DateTime<Utc>,
}
