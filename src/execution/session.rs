//! Ownership of one child process.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStderr, ChildStdout, ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use super::ExecutionStatus;
use crate::error::ShellRunnerError;
use crate::Result;

/// Interval between exit polls.
pub(crate) const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Default wait between a termination request and a forced kill.
pub const DEFAULT_KILL_GRACE: Duration = Duration::from_secs(5);

/// State shared between a session and its cancel handles.
#[derive(Debug)]
struct Shared {
    cancelled: Arc<AtomicBool>,
    child: Mutex<Option<Child>>,
    status: Mutex<ExecutionStatus>,
    kill_grace: Duration,
}

impl Shared {
    fn status(&self) -> ExecutionStatus {
        *self.status.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn cancel(&self) {
        let status = self.status();
        if status != ExecutionStatus::Running {
            debug!(%status, "cancel ignored, session not running");
            return;
        }

        self.cancelled.store(true, Ordering::Release);

        let pid = {
            let mut guard = self.child.lock().unwrap_or_else(PoisonError::into_inner);
            let Some(child) = guard.as_mut() else {
                return;
            };
            match child.try_wait() {
                Ok(None) => {}
                Ok(Some(_)) => return,
                Err(e) => {
                    debug!(error = %e, "cancel could not poll child");
                    return;
                }
            }

            let pid = child.id();
            info!(pid, "requesting child termination");
            if let Err(e) = request_termination(child) {
                debug!(pid, error = %e, "termination request failed");
            }
            pid
        };

        let deadline = Instant::now() + self.kill_grace;
        loop {
            if !self.child_alive() {
                debug!(pid, "child exited after termination request");
                return;
            }
            if Instant::now() >= deadline {
                break;
            }
            thread::sleep(POLL_INTERVAL);
        }

        let mut guard = self.child.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(child) = guard.as_mut() {
            if kill_if_alive(child) {
                warn!(pid, grace_ms = self.kill_grace.as_millis() as u64, "child ignored termination, killed");
            }
        }
    }

    fn child_alive(&self) -> bool {
        let mut guard = self.child.lock().unwrap_or_else(PoisonError::into_inner);
        match guard.as_mut() {
            Some(child) => matches!(child.try_wait(), Ok(None)),
            None => false,
        }
    }
}

/// Cloneable handle that cancels one session from any thread.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    shared: Arc<Shared>,
}

impl CancelHandle {
    /// Cancel the session.
    ///
    /// Idempotent and infallible. Sets the cancellation flag, asks the child
    /// to terminate, waits up to the kill grace period, then kills it. Does
    /// nothing unless the session is running.
    pub fn cancel(&self) {
        self.shared.cancel();
    }

    /// Whether cancellation has been observed for this session.
    pub fn is_cancelled(&self) -> bool {
        self.shared.cancelled.load(Ordering::Acquire)
    }

    /// Current state of the session.
    pub fn status(&self) -> ExecutionStatus {
        self.shared.status()
    }

    /// Whether both handles refer to the same session.
    pub fn same_session(&self, other: &CancelHandle) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }
}

/// One external process and its lifecycle.
///
/// Created per invocation. The child handle is owned exclusively by the
/// session and released once a terminal state is reached.
#[derive(Debug)]
pub struct ProcessSession {
    shared: Arc<Shared>,
    working_dir: Option<PathBuf>,
}

impl ProcessSession {
    /// Create a pending session.
    pub fn new(working_dir: Option<PathBuf>) -> Self {
        Self::with_kill_grace(working_dir, DEFAULT_KILL_GRACE)
    }

    /// Create a pending session with a custom kill grace period.
    pub fn with_kill_grace(working_dir: Option<PathBuf>, kill_grace: Duration) -> Self {
        Self {
            shared: Arc::new(Shared {
                cancelled: Arc::new(AtomicBool::new(false)),
                child: Mutex::new(None),
                status: Mutex::new(ExecutionStatus::Pending),
                kill_grace,
            }),
            working_dir,
        }
    }

    /// Working directory the child is spawned in.
    pub fn working_dir(&self) -> Option<&Path> {
        self.working_dir.as_deref()
    }

    /// Current state of the session.
    pub fn status(&self) -> ExecutionStatus {
        self.shared.status()
    }

    /// Handle for cancelling this session from another thread.
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Cancel this session. See [`CancelHandle::cancel`].
    pub fn cancel(&self) {
        self.shared.cancel();
    }

    /// Whether cancellation has been observed.
    pub fn is_cancelled(&self) -> bool {
        self.shared.cancelled.load(Ordering::Acquire)
    }

    /// The flag readers poll between reads.
    pub(crate) fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shared.cancelled)
    }

    /// Spawn `command_line` through the platform shell.
    ///
    /// Moves the session from `Pending` to `Running` and hands back the
    /// child's output pipes.
    pub fn spawn(
        &self,
        command_line: &str,
        env: &HashMap<String, String>,
    ) -> Result<(ChildStdout, ChildStderr)> {
        let mut cmd = shell_command(command_line);
        cmd.envs(env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }

        let mut guard = self
            .shared
            .child
            .lock()
            .map_err(|_| ShellRunnerError::LockPoisoned)?;

        let mut child = cmd.spawn().map_err(|source| ShellRunnerError::Spawn {
            command: command_line.to_string(),
            source,
        })?;

        let pipes = match (child.stdout.take(), child.stderr.take()) {
            (Some(stdout), Some(stderr)) => (stdout, stderr),
            (stdout, _) => {
                let _ = child.kill();
                let _ = child.wait();
                let missing = if stdout.is_none() { "stdout" } else { "stderr" };
                return Err(ShellRunnerError::MissingPipe(missing));
            }
        };

        debug!(pid = child.id(), command = %command_line, "child spawned");
        *guard = Some(child);
        self.transition(ExecutionStatus::Running)?;

        Ok(pipes)
    }

    /// Wait for the child to exit, giving up at `deadline`.
    ///
    /// Returns `Ok(None)` when the deadline passed first.
    pub fn wait_for_exit(&self, deadline: Option<Instant>) -> Result<Option<ExitStatus>> {
        loop {
            {
                let mut guard = self
                    .shared
                    .child
                    .lock()
                    .map_err(|_| ShellRunnerError::LockPoisoned)?;
                let child = guard.as_mut().ok_or_else(|| {
                    io::Error::new(io::ErrorKind::Other, "child handle already released")
                })?;
                if let Some(status) = child.try_wait()? {
                    return Ok(Some(status));
                }
            }

            if deadline.is_some_and(|d| Instant::now() >= d) {
                return Ok(None);
            }
            thread::sleep(POLL_INTERVAL);
        }
    }

    /// Enter a terminal state and release the child handle.
    pub fn finish(&self, status: ExecutionStatus) -> Result<()> {
        self.transition(status)?;
        let mut guard = self
            .shared
            .child
            .lock()
            .map_err(|_| ShellRunnerError::LockPoisoned)?;
        *guard = None;
        Ok(())
    }

    fn transition(&self, target: ExecutionStatus) -> Result<()> {
        self.shared
            .status
            .lock()
            .map_err(|_| ShellRunnerError::LockPoisoned)?
            .transition_to(target)
    }
}

/// Exit code of a finished child.
///
/// On Unix a child killed by signal N reports `-N`.
pub fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return -signal;
        }
    }

    super::result::NO_EXIT_CODE
}

#[cfg(unix)]
fn shell_command(command_line: &str) -> std::process::Command {
    use std::os::unix::process::CommandExt;

    let mut cmd = std::process::Command::new("sh");
    cmd.arg("-c").arg(command_line);
    // Own process group, so termination reaches the shell's children too.
    cmd.process_group(0);
    cmd
}

#[cfg(windows)]
fn shell_command(command_line: &str) -> std::process::Command {
    use std::os::windows::process::CommandExt;

    let mut cmd = std::process::Command::new("cmd");
    cmd.arg("/C").raw_arg(command_line);
    cmd
}

/// Force-kill `child` unless it has already been reaped.
///
/// The caller holds the child lock, so nothing can reap the child between
/// the poll and the signal and the process group id is still ours.
fn kill_if_alive(child: &mut Child) -> bool {
    match child.try_wait() {
        Ok(None) => {}
        Ok(Some(_)) => return false,
        Err(e) => {
            debug!(pid = child.id(), error = %e, "could not poll child before kill");
            return false;
        }
    }
    if let Err(e) = force_kill(child) {
        debug!(pid = child.id(), error = %e, "forced kill failed");
    }
    true
}

#[cfg(unix)]
fn request_termination(child: &mut Child) -> io::Result<()> {
    signal_group(child, libc::SIGTERM)
}

#[cfg(not(unix))]
fn request_termination(child: &mut Child) -> io::Result<()> {
    child.kill()
}

#[cfg(unix)]
fn force_kill(child: &mut Child) -> io::Result<()> {
    signal_group(child, libc::SIGKILL).or_else(|_| child.kill())
}

#[cfg(not(unix))]
fn force_kill(child: &mut Child) -> io::Result<()> {
    child.kill()
}

#[cfg(unix)]
fn signal_group(child: &Child, signal: libc::c_int) -> io::Result<()> {
    let pgid = child.id() as libc::pid_t;
    // SAFETY: plain kill(2) on the process group our unreaped child leads.
    if unsafe { libc::kill(-pgid, signal) } == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}
