//! Error types for the exec-bridge server.

use thiserror::Error;

use crate::SessionId;

/// Main error type for exec-bridge operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The child process could not be started
    #[error("Failed to spawn '{command}': {reason}")]
    Spawn {
        /// Program that was being started
        command: String,
        /// Underlying reason reported by the OS
        reason: String,
    },

    /// Session not found
    #[error("Session not found: {0}")]
    SessionNotFound(SessionId),

    /// Input was sent to a process that has already exited
    #[error("Process is not running")]
    NotRunning,

    /// A stream subscriber is already attached to the session
    #[error("Session stream already has an active subscriber")]
    SubscriberAttached,

    /// The session stream delivered its terminal event and is closed
    #[error("Session stream is closed")]
    StreamClosed,

    /// Session limit reached
    #[error("Session limit reached (max: {0})")]
    SessionLimitReached(usize),

    /// Path lies outside every browsable root
    #[error("Path not allowed: {0}")]
    PathNotAllowed(String),

    /// Filesystem path does not exist
    #[error("Path does not exist: {0}")]
    NotFound(String),

    /// Filesystem permission problem
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Path exists but is not a directory
    #[error("Not a directory: {0}")]
    NotADirectory(String),

    /// Argument string could not be split into words
    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input or parameters (generic)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Generic error with custom message
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Build a spawn error from the program name and the OS error.
    pub fn spawn(command: impl Into<String>, source: &std::io::Error) -> Self {
        Self::Spawn {
            command: command.into(),
            reason: source.to_string(),
        }
    }

    /// Map a filesystem error for `path` onto the lister taxonomy.
    pub fn from_fs(path: &str, err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound(path.to_string()),
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied(path.to_string()),
            _ => Self::Io(err),
        }
    }
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spawn_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "No such file or directory");
        let err = Error::spawn("/nope/tool", &io_err);
        assert_eq!(
            err.to_string(),
            "Failed to spawn '/nope/tool': No such file or directory"
        );
    }

    #[test]
    fn test_session_not_found_error() {
        let session_id = SessionId::new();
        let err = Error::SessionNotFound(session_id);
        assert!(err.to_string().starts_with("Session not found:"));
    }

    #[test]
    fn test_not_running_error() {
        assert_eq!(Error::NotRunning.to_string(), "Process is not running");
    }

    #[test]
    fn test_subscriber_attached_error() {
        assert_eq!(
            Error::SubscriberAttached.to_string(),
            "Session stream already has an active subscriber"
        );
    }

    #[test]
    fn test_session_limit_reached_error() {
        let err = Error::SessionLimitReached(10);
        assert_eq!(err.to_string(), "Session limit reached (max: 10)");
    }

    #[test]
    fn test_from_fs_not_found() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err = Error::from_fs("/srv/missing", io_err);
        assert!(matches!(err, Error::NotFound(ref p) if p == "/srv/missing"));
    }

    #[test]
    fn test_from_fs_permission_denied() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "nope");
        let err = Error::from_fs("/root", io_err);
        assert!(matches!(err, Error::PermissionDenied(_)));
        assert_eq!(err.to_string(), "Permission denied: /root");
    }

    #[test]
    fn test_from_fs_other_kind_stays_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::Other, "disk on fire");
        let err = Error::from_fs("/data", io_err);
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_invalid_arguments_error() {
        let err = Error::InvalidArguments("unbalanced quote".to_string());
        assert_eq!(err.to_string(), "Invalid arguments: unbalanced quote");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
        assert!(err.to_string().contains("file not found"));
    }
}
