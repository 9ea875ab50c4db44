//! Process-group signalling.

use tracing::warn;

/// Graceful termination request.
pub(crate) const TERMINATE: i32 = libc::SIGTERM;

/// Forced kill.
pub(crate) const KILL: i32 = libc::SIGKILL;

/// Signal the child's whole process group.
///
/// The runner spawns every child as the leader of its own group, so the
/// negative pid also reaches anything the child started.
pub(crate) fn signal_group(pid: u32, signal: i32) -> bool {
    if pid == 0 || pid > i32::MAX as u32 {
        warn!(pid, "PID is 0 or exceeds i32::MAX, cannot send signal");
        return false;
    }

    let result = unsafe { libc::kill(-(pid as i32), signal) };
    if result == -1 {
        let err = std::io::Error::last_os_error();
        // ESRCH: the group is already gone
        if err.raw_os_error() != Some(libc::ESRCH) {
            warn!(pid, signal, "Failed to signal process group: {}", err);
        }
        return false;
    }
    true
}
