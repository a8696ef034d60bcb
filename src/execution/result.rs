//! Execution result types.

use std::time::Duration;

use serde::{Serialize, Serializer};

use super::ExecutionStatus;

/// Return code reported when no real exit code exists (timeout, fault).
pub const NO_EXIT_CODE: i32 = -1;

/// Result of one command invocation.
///
/// Produced exactly once per invocation and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutionResult {
    /// Final state of the invocation.
    pub status: ExecutionStatus,
    /// Process exit code, or [`NO_EXIT_CODE`].
    pub return_code: i32,
    /// Accumulated standard output.
    pub stdout: String,
    /// Accumulated standard error.
    pub stderr: String,
    /// Wall-clock time from invocation start to result production.
    #[serde(serialize_with = "serialize_secs")]
    pub execution_time: Duration,
    /// The exact command string executed.
    pub command: String,
    /// Set only on timeout or internal fault.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl ExecutionResult {
    /// Build the result of a child that ran to exit.
    ///
    /// `cancelled` wins over the exit code, then 0 means completed.
    pub fn completed_from(
        command: impl Into<String>,
        return_code: i32,
        cancelled: bool,
        stdout: String,
        stderr: String,
        execution_time: Duration,
    ) -> Self {
        let status = if cancelled {
            ExecutionStatus::Cancelled
        } else if return_code == 0 {
            ExecutionStatus::Completed
        } else {
            ExecutionStatus::Failed
        };

        Self {
            status,
            return_code,
            stdout,
            stderr,
            execution_time,
            command: command.into(),
            error_message: None,
        }
    }

    /// Create a result indicating timeout.
    pub fn timed_out(command: impl Into<String>, timeout: Duration, execution_time: Duration) -> Self {
        Self {
            status: ExecutionStatus::Failed,
            return_code: NO_EXIT_CODE,
            stdout: String::new(),
            stderr: String::new(),
            execution_time,
            command: command.into(),
            error_message: Some(timeout_message(timeout)),
        }
    }

    /// Create a result for an internal fault.
    pub fn fault(
        command: impl Into<String>,
        error: impl std::fmt::Display,
        execution_time: Duration,
    ) -> Self {
        Self {
            status: ExecutionStatus::Failed,
            return_code: NO_EXIT_CODE,
            stdout: String::new(),
            stderr: String::new(),
            execution_time,
            command: command.into(),
            error_message: Some(format!("execution error: {}", error)),
        }
    }

    /// Create a result for a task cancelled before its child was spawned.
    pub fn cancelled(command: impl Into<String>, execution_time: Duration) -> Self {
        Self {
            status: ExecutionStatus::Cancelled,
            return_code: NO_EXIT_CODE,
            stdout: String::new(),
            stderr: String::new(),
            execution_time,
            command: command.into(),
            error_message: None,
        }
    }

    /// Attach output captured before a timeout.
    pub fn with_output(mut self, stdout: String, stderr: String) -> Self {
        self.stdout = stdout;
        self.stderr = stderr;
        self
    }

    /// Check if command completed with exit code 0.
    pub fn success(&self) -> bool {
        self.status == ExecutionStatus::Completed
    }

    /// Check if command failed (non-zero exit, timeout or fault).
    pub fn failed(&self) -> bool {
        self.status == ExecutionStatus::Failed
    }

    /// Check if this result was produced by a timeout.
    pub fn is_timeout(&self) -> bool {
        self.failed()
            && self.return_code == NO_EXIT_CODE
            && self
                .error_message
                .as_deref()
                .is_some_and(|msg| msg.starts_with(TIMEOUT_PREFIX))
    }

    /// Get stdout lines.
    pub fn stdout_lines(&self) -> impl Iterator<Item = &str> {
        self.stdout.lines()
    }

    /// Get stderr lines.
    pub fn stderr_lines(&self) -> impl Iterator<Item = &str> {
        self.stderr.lines()
    }
}

const TIMEOUT_PREFIX: &str = "command timed out";

fn timeout_message(timeout: Duration) -> String {
    format!("{} after {:.3}s", TIMEOUT_PREFIX, timeout.as_secs_f64())
}

fn serialize_secs<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(duration.as_secs_f64())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn completed(code: i32, cancelled: bool) -> ExecutionResult {
        ExecutionResult::completed_from(
            "echo hi",
            code,
            cancelled,
            "hi\n".into(),
            String::new(),
            Duration::from_millis(100),
        )
    }

    #[test]
    fn test_completed_zero_exit() {
        let result = completed(0, false);
        assert_eq!(result.status, ExecutionStatus::Completed);
        assert_eq!(result.return_code, 0);
        assert!(result.success());
        assert!(!result.failed());
        assert!(result.error_message.is_none());
    }

    #[test]
    fn test_non_zero_exit_is_failed_without_message() {
        let result = completed(2, false);
        assert_eq!(result.status, ExecutionStatus::Failed);
        assert_eq!(result.return_code, 2);
        assert!(result.error_message.is_none());
        assert!(!result.is_timeout());
    }

    #[test]
    fn test_cancelled_wins_over_exit_code() {
        assert_eq!(completed(0, true).status, ExecutionStatus::Cancelled);
        assert_eq!(completed(143, true).status, ExecutionStatus::Cancelled);
    }

    #[test]
    fn test_timed_out() {
        let result =
            ExecutionResult::timed_out("sleep 10", Duration::from_secs(1), Duration::from_secs(1));
        assert_eq!(result.status, ExecutionStatus::Failed);
        assert_eq!(result.return_code, NO_EXIT_CODE);
        assert!(result.stdout.is_empty());
        assert!(result.stderr.is_empty());
        assert!(result.is_timeout());
        assert!(result.error_message.unwrap().contains("1.000s"));
    }

    #[test]
    fn test_fault() {
        let err = std::io::Error::new(std::io::ErrorKind::NotFound, "no shell");
        let result = ExecutionResult::fault("x", err, Duration::ZERO);
        assert_eq!(result.status, ExecutionStatus::Failed);
        assert_eq!(result.return_code, NO_EXIT_CODE);
        assert!(!result.is_timeout());
        assert!(result.error_message.unwrap().contains("no shell"));
    }

    #[test]
    fn test_cancelled_before_start() {
        let result = ExecutionResult::cancelled("make", Duration::ZERO);
        assert_eq!(result.status, ExecutionStatus::Cancelled);
        assert_eq!(result.return_code, NO_EXIT_CODE);
        assert!(result.error_message.is_none());
        assert!(!result.failed());
    }

    #[test]
    fn test_output_lines() {
        let result = ExecutionResult::completed_from(
            "x",
            0,
            false,
            "line1\nline2\r\nline3".into(),
            "warn\n".into(),
            Duration::ZERO,
        );
        let lines: Vec<_> = result.stdout_lines().collect();
        assert_eq!(lines, vec!["line1", "line2", "line3"]);
        assert_eq!(result.stderr_lines().count(), 1);
    }

    #[test]
    fn test_serialize_json() {
        let result = completed(0, false);
        let json: serde_json::Value = serde_json::to_value(&result).unwrap();
        assert_eq!(json["status"], "completed");
        assert_eq!(json["return_code"], 0);
        assert_eq!(json["execution_time"], 0.1);
        assert!(json.get("error_message").is_none());
    }
}
