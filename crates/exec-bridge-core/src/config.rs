//! Configuration types for the exec-bridge server.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::{CommandSpec, Error};

/// Server configuration loaded from YAML file.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ServerConfig {
    /// HTTP server settings
    pub server: ServerSettings,
    /// Session lifecycle settings
    pub sessions: SessionSettings,
    /// The fixed command every session runs
    pub command: CommandSettings,
    /// Directory browsing settings
    pub browse: BrowseSettings,
}

impl ServerConfig {
    /// Load configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML string.
    pub fn from_yaml(yaml: &str) -> crate::Result<Self> {
        let config: ServerConfig =
            serde_yaml::from_str(yaml).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values.
    pub fn validate(&self) -> crate::Result<()> {
        self.server
            .bind
            .parse::<SocketAddr>()
            .map_err(|e| Error::Config(format!("server.bind '{}': {e}", self.server.bind)))?;

        if self.sessions.max_sessions == 0 {
            return Err(Error::Config("sessions.max_sessions must be > 0".to_string()));
        }

        if self.sessions.kill_grace_ms == 0 {
            return Err(Error::Config("sessions.kill_grace_ms must be > 0".to_string()));
        }

        if self.sessions.buffer_capacity == 0 {
            return Err(Error::Config(
                "sessions.buffer_capacity must be > 0".to_string(),
            ));
        }

        if self.command.program.trim().is_empty() {
            return Err(Error::Config("command.program cannot be empty".to_string()));
        }

        if self.browse.roots.is_empty() {
            return Err(Error::Config(
                "browse.roots must list at least one directory".to_string(),
            ));
        }

        Ok(())
    }
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Listen address
    pub bind: String,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Directory holding the browser UI, served as fallback
    pub static_dir: Option<PathBuf>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:5000".to_string(),
            log_level: "info".to_string(),
            static_dir: None,
        }
    }
}

/// Session lifecycle settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    /// Maximum number of concurrent sessions
    pub max_sessions: usize,
    /// Grace window between SIGTERM and SIGKILL, in milliseconds
    pub kill_grace_ms: u64,
    /// Bytes of output buffered per session while no subscriber keeps up
    pub buffer_capacity: usize,
    /// Seconds a finished session waits for a subscriber before being pruned
    pub reap_grace_secs: u64,
}

impl SessionSettings {
    /// Grace window as a duration.
    pub fn kill_grace(&self) -> Duration {
        Duration::from_millis(self.kill_grace_ms)
    }

    /// Reap grace as a duration.
    pub fn reap_grace(&self) -> Duration {
        Duration::from_secs(self.reap_grace_secs)
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            max_sessions: 10,
            kill_grace_ms: 2000,
            buffer_capacity: 1024 * 1024,
            reap_grace_secs: 300,
        }
    }
}

/// The executable every session starts, before the selected path and
/// the user's arguments are appended.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandSettings {
    /// Program to run
    pub program: String,
    /// Arguments placed before the selected path
    pub args: Vec<String>,
    /// Working directory of spawned processes
    pub working_dir: Option<PathBuf>,
    /// Extra environment variables
    pub env: BTreeMap<String, String>,
}

impl CommandSettings {
    /// Base command spec, ready for the path and user arguments.
    pub fn base_spec(&self) -> CommandSpec {
        let mut spec = CommandSpec::new(self.program.clone()).args(self.args.iter().cloned());
        spec.working_dir = self.working_dir.clone();
        spec.env = self
            .env
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        spec
    }
}

impl Default for CommandSettings {
    fn default() -> Self {
        let mut env = BTreeMap::new();
        env.insert("PYTHONUNBUFFERED".to_string(), "1".to_string());
        env.insert("PYTHONIOENCODING".to_string(), "utf-8".to_string());
        Self {
            program: "python3".to_string(),
            args: vec!["-u".to_string(), "upload.py".to_string()],
            working_dir: None,
            env,
        }
    }
}

/// Directory browsing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowseSettings {
    /// Directories that may be listed and used as session targets
    pub roots: Vec<PathBuf>,
    /// Whether dot-files are listed
    pub show_hidden: bool,
}

impl Default for BrowseSettings {
    fn default() -> Self {
        Self {
            roots: vec![PathBuf::from("/")],
            show_hidden: false,
        }
    }
}
