//! Execution state machine.

use std::fmt;

use serde::Serialize;

/// Lifecycle state of one command invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    /// Created but the child has not been spawned yet.
    #[default]
    Pending,
    /// The child process is alive.
    Running,
    /// The child exited with code 0 and was not cancelled.
    Completed,
    /// Non-zero exit, timeout, or internal fault.
    Failed,
    /// Cancellation was observed before or during completion.
    Cancelled,
}

impl ExecutionStatus {
    /// Check if transition to target state is valid.
    ///
    /// Valid transitions:
    /// - Pending -> Running
    /// - Pending -> Failed (spawn failure)
    /// - Running -> Completed | Failed | Cancelled
    pub fn can_transition_to(&self, target: ExecutionStatus) -> bool {
        use ExecutionStatus::*;
        matches!(
            (*self, target),
            (Pending, Running)
                | (Pending, Failed)
                | (Running, Completed)
                | (Running, Failed)
                | (Running, Cancelled)
        )
    }

    /// Attempt to transition to a new state.
    ///
    /// Returns `Ok(())` if the transition is valid, or an error otherwise.
    pub fn transition_to(&mut self, target: ExecutionStatus) -> crate::Result<()> {
        if self.can_transition_to(target) {
            *self = target;
            Ok(())
        } else {
            Err(crate::error::ShellRunnerError::InvalidStateTransition {
                from: *self,
                to: target,
            })
        }
    }

    /// Check if this is a terminal state (no further transitions possible).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExecutionStatus::Completed | ExecutionStatus::Failed | ExecutionStatus::Cancelled
        )
    }

    /// Lowercase name of the state.
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Pending => "pending",
            ExecutionStatus::Running => "running",
            ExecutionStatus::Completed => "completed",
            ExecutionStatus::Failed => "failed",
            ExecutionStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
