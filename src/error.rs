//! Error types for shell-runner.

use thiserror::Error;

use crate::execution::ExecutionStatus;
use crate::registry::TaskId;

/// Main error type for shell-runner operations.
///
/// Expected execution outcomes (timeouts, non-zero exits, cancellation) are
/// never reported through this type; they are encoded in
/// [`ExecutionResult`](crate::ExecutionResult). These variants cover usage
/// errors and internal faults.
#[derive(Error, Debug)]
pub enum ShellRunnerError {
    /// A task with the given ID is already running in the registry.
    #[error("task already running: {0}")]
    DuplicateTask(TaskId),

    /// A task identifier was empty.
    #[error("invalid task id: {0:?}")]
    InvalidTaskId(String),

    /// Invalid execution state transition attempted.
    #[error("invalid state transition from {from} to {to}")]
    InvalidStateTransition {
        from: ExecutionStatus,
        to: ExecutionStatus,
    },

    /// The child process could not be started.
    #[error("failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// A piped stream of the child was not available.
    #[error("child {0} pipe was not captured")]
    MissingPipe(&'static str),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal lock was poisoned.
    #[error("internal lock poisoned")]
    LockPoisoned,

    /// No tokio runtime is available to schedule async tasks on.
    #[error("no tokio runtime available: {0}")]
    NoRuntime(String),
}

/// Convenience Result type for shell-runner operations.
pub type Result<T> = std::result::Result<T, ShellRunnerError>;
