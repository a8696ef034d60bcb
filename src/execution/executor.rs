//! Command execution engine.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use super::command::Command;
use super::reader::{LineCallback, ReadMode, StreamKind, StreamReader};
use super::result::ExecutionResult;
use super::session::{exit_code, CancelHandle, ProcessSession, DEFAULT_KILL_GRACE};
use super::ExecutionStatus;
use crate::encoding::{resolve_encoding, StreamDecoder};
use crate::Result;

/// Default time readers get to drain their pipes once the child is gone.
pub const DEFAULT_READER_GRACE: Duration = Duration::from_secs(3);

/// Executor settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutorConfig {
    /// Working directory for spawned commands.
    pub working_dir: Option<PathBuf>,
    /// Timeout applied when a call does not pass one.
    pub default_timeout: Option<Duration>,
    /// Wait between a termination request and a forced kill.
    pub kill_grace: Duration,
    /// Bounded wait for reader threads after exit or timeout.
    pub reader_grace: Duration,
    /// Keep output captured before a timeout instead of discarding it.
    pub keep_partial_output: bool,
    /// Decode encoding; resolved from the environment when unset.
    pub encoding: Option<String>,
}

impl ExecutorConfig {
    /// Create a config with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the working directory.
    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Set the fallback timeout.
    pub fn default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = Some(timeout);
        self
    }

    /// Set the kill grace period.
    pub fn kill_grace(mut self, grace: Duration) -> Self {
        self.kill_grace = grace;
        self
    }

    /// Set the reader grace period.
    pub fn reader_grace(mut self, grace: Duration) -> Self {
        self.reader_grace = grace;
        self
    }

    /// Keep partial output on timeout.
    pub fn keep_partial_output(mut self, keep: bool) -> Self {
        self.keep_partial_output = keep;
        self
    }

    /// Decode child output with a fixed encoding.
    pub fn encoding(mut self, label: impl Into<String>) -> Self {
        self.encoding = Some(label.into());
        self
    }
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            working_dir: None,
            default_timeout: None,
            kill_grace: DEFAULT_KILL_GRACE,
            reader_grace: DEFAULT_READER_GRACE,
            keep_partial_output: false,
            encoding: None,
        }
    }
}

/// Runs shell commands to completion, one [`ProcessSession`] per call.
///
/// Expected failures never surface as errors: timeouts, non-zero exits,
/// cancellation and internal faults are all encoded in the returned
/// [`ExecutionResult`]. [`cancel`](Self::cancel) may be called from another
/// thread and targets the most recently started invocation;
/// [`abort`](Self::abort) also covers invocations that have not spawned yet.
#[derive(Debug, Default)]
pub struct CommandExecutor {
    config: ExecutorConfig,
    current: Mutex<Option<CancelHandle>>,
    aborted: AtomicBool,
}

impl CommandExecutor {
    /// Create an executor with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an executor with the given settings.
    pub fn with_config(config: ExecutorConfig) -> Self {
        Self {
            config,
            current: Mutex::new(None),
            aborted: AtomicBool::new(false),
        }
    }

    /// Create an executor spawning in `working_dir`.
    pub fn in_dir(working_dir: impl Into<PathBuf>) -> Self {
        Self::with_config(ExecutorConfig::new().working_dir(working_dir))
    }

    /// The executor's settings.
    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Execute a command line and wait for it (blocking).
    ///
    /// With `on_line`, both streams are read line by line and every line is
    /// forwarded as soon as it is read. Without it, output is collected in
    /// full. `timeout` falls back to the configured default.
    pub fn execute(
        &self,
        command: &str,
        timeout: Option<Duration>,
        on_line: Option<LineCallback>,
    ) -> ExecutionResult {
        self.execute_in(
            command,
            self.config.working_dir.as_deref(),
            &HashMap::new(),
            timeout.or(self.config.default_timeout),
            on_line,
        )
    }

    /// Execute a [`Command`] and wait for it (blocking).
    ///
    /// The command's own working directory and timeout take precedence over
    /// the executor's settings.
    pub fn run(&self, command: &Command, on_line: Option<LineCallback>) -> ExecutionResult {
        self.execute_in(
            &command.command_line,
            command.working_dir_or(self.config.working_dir.as_deref()),
            &command.env,
            command.timeout_or(self.config.default_timeout),
            on_line,
        )
    }

    /// Cancel the running invocation, if any.
    ///
    /// Idempotent; never fails. Blocks up to the kill grace period while the
    /// child shuts down.
    pub fn cancel(&self) {
        match self.cancel_handle() {
            Some(handle) => handle.cancel(),
            None => debug!("cancel requested with no active session"),
        }
    }

    /// Cancel the running invocation and every later one.
    ///
    /// Unlike [`cancel`](Self::cancel), this is sticky: an invocation still
    /// spawning when it lands is cancelled as soon as its child exists, and
    /// later calls to `execute`/`run` return `Cancelled` without spawning.
    pub fn abort(&self) {
        self.aborted.store(true, Ordering::SeqCst);
        self.cancel();
    }

    /// Whether [`abort`](Self::abort) has been called.
    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::SeqCst)
    }

    /// Handle to the running invocation's session.
    pub fn cancel_handle(&self) -> Option<CancelHandle> {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn execute_in(
        &self,
        command: &str,
        working_dir: Option<&Path>,
        env: &HashMap<String, String>,
        timeout: Option<Duration>,
        on_line: Option<LineCallback>,
    ) -> ExecutionResult {
        let start = Instant::now();
        if self.is_aborted() {
            debug!(command = %command, "executor aborted, not spawning");
            return ExecutionResult::cancelled(command, start.elapsed());
        }

        let session = ProcessSession::with_kill_grace(
            working_dir.map(Path::to_path_buf),
            self.config.kill_grace,
        );
        let handle = session.cancel_handle();
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle.clone());

        info!(command = %command, timeout_ms = ?timeout.map(|t| t.as_millis()), "executing command");

        let result = match self.drive(&session, command, env, timeout, on_line, start) {
            Ok(result) => result,
            Err(e) => {
                error!(command = %command, error = %e, "command execution fault");
                session.cancel();
                if let Err(e) = session.finish(ExecutionStatus::Failed) {
                    debug!(error = %e, "session already terminal");
                }
                ExecutionResult::fault(command, e, start.elapsed())
            }
        };

        {
            let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
            if current.as_ref().is_some_and(|h| h.same_session(&handle)) {
                *current = None;
            }
        }

        info!(
            command = %command,
            status = %result.status,
            return_code = result.return_code,
            elapsed_ms = result.execution_time.as_millis() as u64,
            "command finished"
        );
        result
    }

    fn drive(
        &self,
        session: &ProcessSession,
        command: &str,
        env: &HashMap<String, String>,
        timeout: Option<Duration>,
        on_line: Option<LineCallback>,
        start: Instant,
    ) -> Result<ExecutionResult> {
        let encoding = self
            .config
            .encoding
            .clone()
            .unwrap_or_else(resolve_encoding);
        let decoder = StreamDecoder::for_label(&encoding);
        debug!(encoding = %encoding, decoder = decoder.name(), "decoding child output");

        let (stdout, stderr) = session.spawn(command, env)?;
        // `current` was published before spawning, so an abort that missed
        // this check has already seen the session running.
        if self.is_aborted() {
            debug!(command = %command, "abort landed during spawn, cancelling");
            session.cancel();
        }

        let mode = match on_line {
            Some(callback) => ReadMode::Lines(callback),
            None => ReadMode::Collect,
        };
        let flag = session.cancel_flag();
        let mut out_reader =
            StreamReader::spawn(StreamKind::Stdout, stdout, mode.clone(), decoder, flag.clone())?;
        let mut err_reader = StreamReader::spawn(StreamKind::Stderr, stderr, mode, decoder, flag)?;

        let deadline = timeout.map(|t| start + t);
        let exit = session.wait_for_exit(deadline)?;

        let Some(status) = exit else {
            let timeout = timeout.unwrap_or_default();
            warn!(command = %command, timeout_ms = timeout.as_millis() as u64, "command timed out");
            session.cancel();

            let grace = Instant::now() + self.config.reader_grace;
            out_reader.join_until(grace);
            err_reader.join_until(grace);
            session.finish(ExecutionStatus::Failed)?;

            let result = ExecutionResult::timed_out(command, timeout, start.elapsed());
            if self.config.keep_partial_output {
                return Ok(result.with_output(out_reader.snapshot(), err_reader.snapshot()));
            }
            return Ok(result);
        };

        let grace = Instant::now() + self.config.reader_grace;
        out_reader.join_until(grace);
        err_reader.join_until(grace);

        let result = ExecutionResult::completed_from(
            command,
            exit_code(status),
            session.is_cancelled(),
            out_reader.snapshot(),
            err_reader.snapshot(),
            start.elapsed(),
        );
        session.finish(result.status)?;
        Ok(result)
    }
}

/// Simple one-shot command execution.
pub fn execute_simple(command_line: &str) -> ExecutionResult {
    CommandExecutor::new().execute(command_line, None, None)
}

/// Execute a command with timeout.
pub fn execute_with_timeout(command_line: &str, timeout: Duration) -> ExecutionResult {
    CommandExecutor::new().execute(command_line, Some(timeout), None)
}
