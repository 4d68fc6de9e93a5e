//! Signal handling for bridged child processes (spec.md §4.4 "Signal
//! handling").

use std::sync::Arc;
#[cfg(all(unix, not(target_os = "linux")))]
use std::time::Duration;

use tokio::sync::Mutex as AsyncMutex;
use tracing::warn;

/// Ignore `SIGPIPE` for the whole process. Without this, writing to a
/// child's stdin pipe after it has exited terminates the orchestrator
/// rather than surfacing a recoverable I/O error. Idempotent; call once at
/// startup.
pub fn ignore_sigpipe() {
    #[cfg(unix)]
    {
        use nix::sys::signal::{self, SigHandler, Signal};
        // SAFETY: installing SIG_IGN for SIGPIPE has no aliasing or
        // reentrancy hazards; it only changes process-wide disposition.
        if let Err(e) = unsafe { signal::signal(Signal::SIGPIPE, SigHandler::SigIgn) } {
            warn!(error = %e, "failed to ignore SIGPIPE");
        }
    }
}

/// Arrange for the child to receive `PR_SET_PDEATHSIG` (Linux only) so it
/// exits if the orchestrator dies unexpectedly, without needing to poll for
/// parent liveness (spec.md §4.4: "inherit PDEATHSIG on Linux, or detect
/// parent death by periodic checks").
#[cfg(target_os = "linux")]
pub fn set_pdeathsig(command: &mut tokio::process::Command) {
    use nix::sys::signal::Signal;
    use std::os::unix::process::CommandExt;

    // SAFETY: `pre_exec` runs in the forked child before exec; prctl with
    // PR_SET_PDEATHSIG is async-signal-safe and touches no shared state.
    unsafe {
        command.pre_exec(|| {
            nix::sys::prctl::set_pdeathsig(Some(Signal::SIGTERM))
                .map_err(std::io::Error::from)?;
            Ok(())
        });
    }
}

#[cfg(not(target_os = "linux"))]
pub fn set_pdeathsig(_command: &mut tokio::process::Command) {
    // No PDEATHSIG equivalent off Linux; `spawn_liveness_guard` below is the
    // periodic-check alternative spec.md §4.4 allows per platform.
}

/// Spawn a task that polls whether this process is still a child of the
/// process that spawned it, killing `child` and exiting the loop the
/// moment it isn't (spec.md §4.4 option (b): "detect parent death by
/// periodic checks and exit"). Linux has PDEATHSIG instead, so this is a
/// no-op there; callers can spawn it unconditionally. Returns a handle the
/// caller aborts on a clean `stop()`.
#[cfg(all(unix, not(target_os = "linux")))]
pub fn spawn_liveness_guard(
    child: Arc<AsyncMutex<tokio::process::Child>>,
) -> tokio::task::JoinHandle<()> {
    let original_parent = nix::unistd::getppid();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(2));
        loop {
            ticker.tick().await;
            if nix::unistd::getppid() != original_parent {
                warn!("parent process changed; killing child to honor the PDEATHSIG-equivalent contract");
                let mut guard = child.lock().await;
                let _ = guard.start_kill();
                break;
            }
        }
    })
}

#[cfg(not(all(unix, not(target_os = "linux"))))]
pub fn spawn_liveness_guard(
    _child: Arc<AsyncMutex<tokio::process::Child>>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async {})
}
