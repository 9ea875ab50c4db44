//! Session registry for coordinating concurrent sessions.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};
use std::time::Duration;

use tracing::{debug, info};

use exec_bridge_core::{CommandSpec, Error, Result, SessionId, SessionInfo, SessionSettings};

use crate::session::{Session, SessionOptions};

/// Configuration for the session registry.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Maximum number of concurrent sessions
    pub max_sessions: usize,

    /// Options applied to every new session
    pub session: SessionOptions,

    /// How long a finished session waits for a subscriber before removal
    pub reap_grace: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            max_sessions: 10,
            session: SessionOptions::default(),
            reap_grace: Duration::from_secs(300),
        }
    }
}

impl From<&SessionSettings> for RegistryConfig {
    fn from(settings: &SessionSettings) -> Self {
        Self {
            max_sessions: settings.max_sessions,
            session: SessionOptions::from(settings),
            reap_grace: settings.reap_grace(),
        }
    }
}

/// Maps session ids to live sessions.
///
/// Cloning is cheap; clones share the same sessions.
#[derive(Debug, Clone)]
pub struct SessionRegistry {
    inner: Arc<RegistryInner>,
}

#[derive(Debug)]
struct RegistryInner {
    sessions: RwLock<HashMap<SessionId, Arc<Session>>>,
    config: RegistryConfig,
}

impl SessionRegistry {
    /// Create a new registry with default configuration.
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::default())
    }

    /// Create a new registry with custom configuration.
    pub fn with_config(config: RegistryConfig) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                sessions: RwLock::new(HashMap::new()),
                config,
            }),
        }
    }

    /// Registry configuration.
    pub fn config(&self) -> &RegistryConfig {
        &self.inner.config
    }

    /// Start a new session running `command`.
    ///
    /// Nothing is registered if the process cannot be spawned.
    pub fn create(&self, command: CommandSpec) -> Result<Arc<Session>> {
        // Finished sessions waiting to be collected do not count
        let active = self.active_count();
        if active >= self.inner.config.max_sessions {
            return Err(Error::SessionLimitReached(self.inner.config.max_sessions));
        }

        let session = Arc::new(Session::start(command, &self.inner.config.session)?);
        let session_id = *session.id();

        self.inner
            .write()
            .insert(session_id, Arc::clone(&session));
        self.spawn_reaper(&session);

        info!("Session registered: id={}", session_id);
        Ok(session)
    }

    /// Get a session by ID.
    pub fn get(&self, session_id: &SessionId) -> Result<Arc<Session>> {
        self.inner
            .read()
            .get(session_id)
            .cloned()
            .ok_or(Error::SessionNotFound(*session_id))
    }

    /// List all registered sessions, oldest first.
    pub fn list(&self) -> Vec<SessionInfo> {
        let mut sessions: Vec<SessionInfo> =
            self.inner.read().values().map(|s| s.info()).collect();
        sessions.sort_by_key(|info| info.created_at);
        sessions
    }

    /// Terminate a session and drop it from the registry.
    ///
    /// Idempotent: returns false if the id was not registered.
    pub async fn remove(&self, session_id: &SessionId) -> bool {
        self.inner.remove(session_id).await
    }

    /// Terminate every session. Used on server shutdown.
    pub async fn shutdown(&self) {
        let sessions: Vec<Arc<Session>> = self.inner.write().drain().map(|(_, s)| s).collect();
        info!("Shutting down {} sessions", sessions.len());

        futures::future::join_all(sessions.iter().map(|session| session.terminate())).await;
    }

    /// Get the number of registered sessions.
    pub fn session_count(&self) -> usize {
        self.inner.read().len()
    }

    /// Number of sessions that have not reached a terminal state.
    pub fn active_count(&self) -> usize {
        self.inner
            .read()
            .values()
            .filter(|session| !session.state().is_terminal())
            .count()
    }

    /// Drop the session once its terminal event went out, or once the
    /// reap grace passes without anyone collecting it.
    fn spawn_reaper(&self, session: &Arc<Session>) {
        let registry: Weak<RegistryInner> = Arc::downgrade(&self.inner);
        let broadcaster = session.broadcaster();
        let session_id = *session.id();
        let grace = self.inner.config.reap_grace;

        tokio::spawn(async move {
            broadcaster.wait_finished().await;

            tokio::select! {
                _ = broadcaster.wait_delivered() => {
                    debug!("Session {} terminal event delivered", session_id);
                }
                _ = tokio::time::sleep(grace) => {
                    debug!("Session {} not collected within {:?}", session_id, grace);
                }
            }

            if let Some(inner) = registry.upgrade() {
                if inner.remove(&session_id).await {
                    info!("Pruned finished session: id={}", session_id);
                }
            }
        });
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl RegistryInner {
    fn read(&self) -> RwLockReadGuard<'_, HashMap<SessionId, Arc<Session>>> {
        self.sessions.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<SessionId, Arc<Session>>> {
        self.sessions.write().unwrap_or_else(PoisonError::into_inner)
    }

    async fn remove(&self, session_id: &SessionId) -> bool {
        // Whoever takes the entry out owns the termination
        let session = self.write().remove(session_id);
        match session {
            Some(session) => {
                session.terminate().await;
                info!("Session removed: id={}", session_id);
                true
            }
            None => {
                debug!("Session {} already removed", session_id);
                false
            }
        }
    }
}
