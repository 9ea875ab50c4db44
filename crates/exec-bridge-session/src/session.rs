//! Process session management.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use exec_bridge_core::{
    CommandSpec, OutputEvent, Result, SessionId, SessionInfo, SessionState, SessionSettings,
};
use exec_bridge_process::{ProcessOutput, ProcessRunner};

use crate::broadcaster::{OutputBroadcaster, Subscription};

/// Per-session tunables.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Bytes of output buffered while the subscriber lags or is absent
    pub buffer_capacity: usize,
    /// Window between the polite stop request and the forced kill
    pub kill_grace: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            buffer_capacity: 1024 * 1024,
            kill_grace: Duration::from_secs(2),
        }
    }
}

impl From<&SessionSettings> for SessionOptions {
    fn from(settings: &SessionSettings) -> Self {
        Self {
            buffer_capacity: settings.buffer_capacity,
            kill_grace: settings.kill_grace(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Status {
    state: SessionState,
    exit_code: Option<i32>,
}

type SharedStatus = Arc<Mutex<Status>>;

fn lock_status(status: &SharedStatus) -> MutexGuard<'_, Status> {
    status.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A running (or finished) program bound to a session id.
#[derive(Debug)]
pub struct Session {
    /// Session identifier
    id: SessionId,

    /// Command that was executed
    command: CommandSpec,

    /// Session creation time
    created_at: DateTime<Utc>,

    /// Current state and exit code
    status: SharedStatus,

    /// The OS process
    runner: Arc<ProcessRunner>,

    /// Output delivery to the stream subscriber
    broadcaster: Arc<OutputBroadcaster>,

    /// Task copying process output into the broadcaster
    pump: Mutex<Option<JoinHandle<()>>>,

    kill_grace: Duration,
}

impl Session {
    /// Spawn the command and start pumping its output.
    ///
    /// Must be called inside a tokio runtime.
    pub fn start(command: CommandSpec, options: &SessionOptions) -> Result<Self> {
        let id = SessionId::new();
        info!("Creating session: id={}, command='{}'", id, command);

        let (runner, output) = match ProcessRunner::spawn(&command) {
            Ok(pair) => pair,
            Err(e) => {
                warn!(
                    "Session state changed: id={}, {} → {}: {}",
                    id,
                    SessionState::Starting,
                    SessionState::Failed,
                    e
                );
                return Err(e);
            }
        };

        let status = Arc::new(Mutex::new(Status {
            state: SessionState::Running,
            exit_code: None,
        }));
        let runner = Arc::new(runner);
        let broadcaster = Arc::new(OutputBroadcaster::new(options.buffer_capacity));

        let pump = tokio::spawn(pump_output(
            id,
            Arc::clone(&runner),
            output,
            Arc::clone(&broadcaster),
            Arc::clone(&status),
        ));

        info!(
            "Session created successfully: id={}, pid={:?}",
            id,
            runner.pid()
        );

        Ok(Self {
            id,
            command,
            created_at: Utc::now(),
            status,
            runner,
            broadcaster,
            pump: Mutex::new(Some(pump)),
            kill_grace: options.kill_grace,
        })
    }

    /// Get the session ID.
    pub fn id(&self) -> &SessionId {
        &self.id
    }

    /// Get the command.
    pub fn command(&self) -> &CommandSpec {
        &self.command
    }

    /// Get the creation time.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Get the current state.
    pub fn state(&self) -> SessionState {
        lock_status(&self.status).state
    }

    /// Exit code, set only when the process exited on its own.
    pub fn exit_code(&self) -> Option<i32> {
        lock_status(&self.status).exit_code
    }

    /// OS process id.
    pub fn pid(&self) -> Option<u32> {
        self.runner.pid()
    }

    /// Check if the process is still running.
    pub fn is_alive(&self) -> bool {
        self.runner.is_running()
    }

    /// Snapshot for listings.
    pub fn info(&self) -> SessionInfo {
        let status = *lock_status(&self.status);
        SessionInfo {
            id: self.id,
            state: status.state,
            command: self.command.command_line(),
            exit_code: status.exit_code,
            created_at: self.created_at,
        }
    }

    /// The session's output broadcaster.
    pub fn broadcaster(&self) -> Arc<OutputBroadcaster> {
        Arc::clone(&self.broadcaster)
    }

    /// Bind the single output subscriber.
    pub fn attach(&self) -> Result<Subscription> {
        self.broadcaster.attach()
    }

    /// Write raw bytes to the process's stdin.
    pub async fn write_input(&self, data: &[u8]) -> Result<()> {
        self.runner.write_input(data).await
    }

    /// Close the process's stdin.
    pub async fn close_input(&self) {
        self.runner.close_input().await
    }

    /// Terminate the process and end the output sequence.
    ///
    /// Safe to call repeatedly and concurrently. A session that already
    /// exited keeps its `Exited` state.
    pub async fn terminate(&self) {
        let was_active = {
            let mut status = lock_status(&self.status);
            if status.state.is_terminal() {
                false
            } else {
                info!(
                    "Session state changed: id={}, {} → {}",
                    self.id,
                    status.state,
                    SessionState::Killed
                );
                status.state = SessionState::Killed;
                true
            }
        };

        info!("Terminating session: id={}", self.id);
        self.runner.terminate(self.kill_grace).await;

        // Let the pump flush what the process wrote before it died
        let pump = self.pump.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(mut handle) = pump {
            if tokio::time::timeout(self.kill_grace, &mut handle).await.is_err() {
                warn!(
                    "Session {} output still open after {}ms, abandoning it",
                    self.id,
                    self.kill_grace.as_millis()
                );
                handle.abort();
            }
        }

        if was_active && self.broadcaster.finish(OutputEvent::Killed) {
            debug!("Session {} finished by terminate", self.id);
        }
        info!("Session terminated successfully: id={}", self.id);
    }
}

/// Copy process output into the broadcaster, then publish the terminal event.
async fn pump_output(
    id: SessionId,
    runner: Arc<ProcessRunner>,
    mut output: ProcessOutput,
    broadcaster: Arc<OutputBroadcaster>,
    status: SharedStatus,
) {
    let guard = TerminalGuard {
        id,
        broadcaster: Arc::clone(&broadcaster),
        status,
        done: false,
    };

    let mut total = 0usize;
    while let Some(chunk) = output.next_chunk().await {
        total += chunk.len();
        broadcaster.publish(chunk);
    }
    debug!("Session {} output closed after {} bytes", id, total);

    let outcome = runner.wait().await;
    guard.complete(outcome.exit_code());
}

/// Publishes the terminal event exactly once, even if the pump is aborted.
struct TerminalGuard {
    id: SessionId,
    broadcaster: Arc<OutputBroadcaster>,
    status: SharedStatus,
    done: bool,
}

impl TerminalGuard {
    fn complete(mut self, code: i32) {
        self.done = true;
        self.emit(Some(code));
    }

    fn emit(&self, code: Option<i32>) {
        let event = {
            let mut status = lock_status(&self.status);
            let next = match (status.state, code) {
                (SessionState::Killed, _) => None,
                (_, Some(code)) => {
                    status.exit_code = Some(code);
                    Some(SessionState::Exited)
                }
                (_, None) => Some(SessionState::Failed),
            };

            if let Some(next) = next {
                info!(
                    "Session state changed: id={}, {} → {}",
                    self.id, status.state, next
                );
                status.state = next;
            }

            match status.state {
                SessionState::Killed => OutputEvent::Killed,
                _ => OutputEvent::Exit {
                    code: code.unwrap_or(-1),
                },
            }
        };

        if self.broadcaster.finish(event.clone()) {
            debug!("Session {} finished with {:?}", self.id, event);
        }
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        if !self.done {
            warn!("Output pump for session {} ended early", self.id);
            self.emit(None);
        }
    }
}
