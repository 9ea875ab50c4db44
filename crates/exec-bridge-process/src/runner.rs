//! Child process runner with piped stdio.

use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::{mpsc, watch, Mutex, Notify};
use tracing::{debug, error, info, warn};

use exec_bridge_core::{CommandSpec, Error, Result, StreamKind};

use crate::output::{spawn_reader, ProcessOutput, CHANNEL_DEPTH};

/// How a child process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitOutcome {
    code: Option<i32>,
    signal: Option<i32>,
}

impl ExitOutcome {
    /// Build from the OS exit status.
    pub fn from_status(status: std::process::ExitStatus) -> Self {
        #[cfg(unix)]
        let signal = {
            use std::os::unix::process::ExitStatusExt;
            status.signal()
        };
        #[cfg(not(unix))]
        let signal = None;

        Self {
            code: status.code(),
            signal,
        }
    }

    /// Outcome when the status could not be collected.
    pub fn unknown() -> Self {
        Self {
            code: None,
            signal: None,
        }
    }

    /// Exit code, if the process called exit.
    pub fn code(&self) -> Option<i32> {
        self.code
    }

    /// Terminating signal, if the process was killed by one.
    pub fn signal(&self) -> Option<i32> {
        self.signal
    }

    /// Whether the process exited with code 0.
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Single integer code, using the shell convention `128 + signal` for
    /// signal deaths and `-1` when nothing is known.
    pub fn exit_code(&self) -> i32 {
        match (self.code, self.signal) {
            (Some(code), _) => code,
            (None, Some(signal)) => 128 + signal,
            (None, None) => -1,
        }
    }
}

/// Handle to one spawned OS process.
///
/// A runner is bound to a single process for its whole lifetime. Output is
/// handed out once, as the [`ProcessOutput`] returned by [`spawn`](Self::spawn).
pub struct ProcessRunner {
    /// OS process id
    pid: Option<u32>,
    /// Program name, for logs
    program: String,
    /// Child stdin; `None` once closed
    stdin: Mutex<Option<ChildStdin>>,
    /// Resolves to `Some` when the exit waiter has reaped the child
    exit_rx: watch::Receiver<Option<ExitOutcome>>,
    /// Wakes the exit waiter to kill the child
    force_kill: Arc<Notify>,
    /// Set by the first terminate() caller
    terminating: AtomicBool,
}

impl std::fmt::Debug for ProcessRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessRunner")
            .field("pid", &self.pid)
            .field("program", &self.program)
            .field("exit", &*self.exit_rx.borrow())
            .finish_non_exhaustive()
    }
}

impl ProcessRunner {
    /// Spawn a new process with piped stdio.
    ///
    /// # Example
    /// ```no_run
    /// use exec_bridge_core::CommandSpec;
    /// use exec_bridge_process::ProcessRunner;
    ///
    /// # async fn example() -> exec_bridge_core::Result<()> {
    /// let (runner, mut output) = ProcessRunner::spawn(&CommandSpec::new("ls").arg("-l"))?;
    /// while let Some(chunk) = output.next_chunk().await {
    ///     print!("{}", String::from_utf8_lossy(&chunk.data));
    /// }
    /// let outcome = runner.wait().await;
    /// # Ok(())
    /// # }
    /// ```
    pub fn spawn(spec: &CommandSpec) -> Result<(Self, ProcessOutput)> {
        info!(
            "Spawning process: command='{}', cwd={:?}",
            spec.command_line(),
            spec.working_dir
        );

        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .envs(spec.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(dir) = &spec.working_dir {
            debug!("Setting working directory to: {}", dir.display());
            cmd.current_dir(dir);
        }

        // Own process group, so termination reaches grandchildren too
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd.spawn().map_err(|e| {
            error!("Failed to spawn command '{}': {}", spec.program, e);
            Error::spawn(&spec.program, &e)
        })?;

        let pid = child.id();
        let stdin = child.stdin.take();

        let (tx, rx) = mpsc::channel(CHANNEL_DEPTH);
        if let Some(stdout) = child.stdout.take() {
            spawn_reader(StreamKind::Stdout, stdout, tx.clone());
        }
        if let Some(stderr) = child.stderr.take() {
            spawn_reader(StreamKind::Stderr, stderr, tx.clone());
        }
        drop(tx);

        let (exit_tx, exit_rx) = watch::channel(None);
        let force_kill = Arc::new(Notify::new());
        spawn_exit_waiter(child, spec.program.clone(), Arc::clone(&force_kill), exit_tx);

        info!("Process spawned successfully: program='{}', pid={:?}", spec.program, pid);

        let runner = Self {
            pid,
            program: spec.program.clone(),
            stdin: Mutex::new(stdin),
            exit_rx,
            force_kill,
            terminating: AtomicBool::new(false),
        };

        Ok((runner, ProcessOutput::new(rx)))
    }

    /// OS process id.
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Program that was started.
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Check if the child process is still running.
    pub fn is_running(&self) -> bool {
        self.exit_rx.borrow().is_none()
    }

    /// Exit outcome, once the child has been reaped.
    pub fn exit_status(&self) -> Option<ExitOutcome> {
        *self.exit_rx.borrow()
    }

    /// Wait for the child process to exit.
    pub async fn wait(&self) -> ExitOutcome {
        let mut rx = self.exit_rx.clone();
        let outcome = rx.wait_for(Option::is_some).await.ok().and_then(|v| *v);
        outcome.unwrap_or_else(ExitOutcome::unknown)
    }

    /// Write raw bytes to the child's stdin.
    ///
    /// Writes are serialized, so bytes arrive in call order. Fails with
    /// [`Error::NotRunning`] once the process has exited or closed its input.
    pub async fn write_input(&self, data: &[u8]) -> Result<()> {
        if !self.is_running() {
            return Err(Error::NotRunning);
        }

        let mut stdin_lock = self.stdin.lock().await;
        let stdin = stdin_lock.as_mut().ok_or(Error::NotRunning)?;

        let result = match stdin.write_all(data).await {
            Ok(()) => stdin.flush().await,
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => {
                debug!("Wrote {} bytes to stdin of pid {:?}", data.len(), self.pid);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {
                debug!("Stdin of pid {:?} is closed", self.pid);
                *stdin_lock = None;
                Err(Error::NotRunning)
            }
            Err(e) => Err(Error::Io(e)),
        }
    }

    /// Close stdin so the child reads EOF. Idempotent.
    pub async fn close_input(&self) {
        if self.stdin.lock().await.take().is_some() {
            debug!("Closed stdin of pid {:?}", self.pid);
        }
    }

    /// Terminate the process and wait until it is gone.
    ///
    /// Sends SIGTERM to the process group, then SIGKILL if the process is
    /// still alive after `grace`. Calling it on an exited process is a no-op;
    /// concurrent callers wait for the same exit instead of signalling again.
    pub async fn terminate(&self, grace: Duration) -> ExitOutcome {
        if let Some(outcome) = self.exit_status() {
            debug!("Process {:?} already exited, nothing to terminate", self.pid);
            return outcome;
        }

        if self.terminating.swap(true, Ordering::SeqCst) {
            debug!("Termination of pid {:?} already in progress", self.pid);
            return self.wait().await;
        }

        info!("Terminating process: program='{}', pid={:?}", self.program, self.pid);

        if !self.request_stop() {
            self.kill_now();
        }

        if tokio::time::timeout(grace, self.wait()).await.is_err() {
            warn!(
                "Process pid={:?} still running after {}ms, killing",
                self.pid,
                grace.as_millis()
            );
            self.kill_now();
        }

        let outcome = self.wait().await;
        info!(
            "Process terminated: pid={:?}, code={}",
            self.pid,
            outcome.exit_code()
        );
        outcome
    }

    /// Ask the process group to stop. Returns false when no signal was sent.
    #[cfg(unix)]
    fn request_stop(&self) -> bool {
        match self.pid {
            Some(pid) if self.is_running() => {
                crate::signal::signal_group(pid, crate::signal::TERMINATE)
            }
            _ => false,
        }
    }

    #[cfg(not(unix))]
    fn request_stop(&self) -> bool {
        false
    }

    /// Kill the process group and wake the exit waiter.
    fn kill_now(&self) {
        #[cfg(unix)]
        if let Some(pid) = self.pid {
            if self.is_running() {
                crate::signal::signal_group(pid, crate::signal::KILL);
            }
        }
        self.force_kill.notify_one();
    }
}

impl Drop for ProcessRunner {
    fn drop(&mut self) {
        if self.is_running() {
            warn!("Runner for pid {:?} dropped while process running, killing", self.pid);
            self.kill_now();
        }
    }
}

/// Reap the child in the background and publish its outcome.
fn spawn_exit_waiter(
    mut child: Child,
    program: String,
    force_kill: Arc<Notify>,
    exit_tx: watch::Sender<Option<ExitOutcome>>,
) {
    tokio::spawn(async move {
        let pid = child.id();
        let status = tokio::select! {
            status = child.wait() => status,
            _ = force_kill.notified() => {
                if let Err(e) = child.start_kill() {
                    debug!("start_kill for pid {:?}: {}", pid, e);
                }
                child.wait().await
            }
        };

        let outcome = match status {
            Ok(status) => ExitOutcome::from_status(status),
            Err(e) => {
                warn!("Failed to wait for '{}' (pid {:?}): {}", program, pid, e);
                ExitOutcome::unknown()
            }
        };

        info!(
            "Process exited: program='{}', pid={:?}, code={}",
            program,
            pid,
            outcome.exit_code()
        );
        exit_tx.send_replace(Some(outcome));
    });
}
