//! Executor integration tests.
//!
//! These run real commands through `sh`, so they are Unix only.

#![cfg(unix)]

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use shell_runner::execution::NO_EXIT_CODE;
use shell_runner::{
    line_callback, Command, CommandExecutor, ExecutionStatus, ExecutorConfig, LineCallback,
};

fn collecting_callback() -> (LineCallback, Arc<Mutex<Vec<String>>>) {
    let lines = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&lines);
    let callback = line_callback(move |line| sink.lock().unwrap().push(line.to_string()));
    (callback, lines)
}

// ============================================================================
// Outcome Tests
// ============================================================================

#[test]
fn test_two_lines_complete() {
    let result = CommandExecutor::new().execute("printf 'A\\nB\\n'", None, None);

    assert_eq!(result.status, ExecutionStatus::Completed);
    assert_eq!(result.return_code, 0);
    assert_eq!(result.stdout, "A\nB\n");
    assert_eq!(result.stderr, "");
    assert!(result.error_message.is_none());
    assert!(result.success());
}

#[test]
fn test_timeout_discards_output() {
    let started = Instant::now();
    let result = CommandExecutor::new().execute(
        "echo partial; sleep 10",
        Some(Duration::from_secs(1)),
        None,
    );

    assert_eq!(result.status, ExecutionStatus::Failed);
    assert_eq!(result.return_code, NO_EXIT_CODE);
    assert_eq!(result.stdout, "");
    assert_eq!(result.stderr, "");
    assert_eq!(
        result.error_message.as_deref(),
        Some("command timed out after 1.000s")
    );
    assert!(result.is_timeout());
    assert!(result.execution_time >= Duration::from_secs(1));
    assert!(started.elapsed() < Duration::from_secs(8));
}

#[test]
fn test_timeout_keeps_partial_output_when_configured() {
    let executor = CommandExecutor::with_config(ExecutorConfig::new().keep_partial_output(true));
    let result = executor.execute(
        "echo partial; sleep 10",
        Some(Duration::from_millis(700)),
        None,
    );

    assert!(result.is_timeout());
    assert_eq!(result.return_code, NO_EXIT_CODE);
    assert_eq!(result.stdout, "partial\n");
}

#[test]
fn test_nonzero_exit_fails_without_message() {
    let result = CommandExecutor::new().execute("exit 2", None, None);

    assert_eq!(result.status, ExecutionStatus::Failed);
    assert_eq!(result.return_code, 2);
    assert!(result.error_message.is_none());
    assert!(!result.is_timeout());
}

#[test]
fn test_stderr_captured_separately() {
    let result = CommandExecutor::new().execute("echo out; echo err >&2", None, None);

    assert!(result.success());
    assert_eq!(result.stdout, "out\n");
    assert_eq!(result.stderr, "err\n");
}

#[test]
fn test_missing_working_dir_is_fault() {
    let executor = CommandExecutor::in_dir("/nonexistent/shell-runner-test-dir");
    let result = executor.execute("true", None, None);

    assert_eq!(result.status, ExecutionStatus::Failed);
    assert_eq!(result.return_code, NO_EXIT_CODE);
    assert!(result
        .error_message
        .as_deref()
        .is_some_and(|m| m.starts_with("execution error:")));
}

#[test]
fn test_working_dir_and_env() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("marker.txt"), "here").unwrap();

    let command = Command::new("cat marker.txt; printf ' %s' \"$RUNNER_TEST_VALUE\"")
        .working_dir(dir.path())
        .env("RUNNER_TEST_VALUE", "42");
    let result = CommandExecutor::new().run(&command, None);

    assert!(result.success(), "{:?}", result);
    assert_eq!(result.stdout, "here 42");
}

#[test]
fn test_command_timeout_overrides_default() {
    let executor =
        CommandExecutor::with_config(ExecutorConfig::new().default_timeout(Duration::from_secs(60)));
    let command = Command::new("sleep 10").timeout(Duration::from_millis(300));

    let result = executor.run(&command, None);
    assert!(result.is_timeout());
    assert_eq!(
        result.error_message.as_deref(),
        Some("command timed out after 0.300s")
    );
}

// ============================================================================
// Streaming Tests
// ============================================================================

#[test]
fn test_callback_sees_every_line_in_order() {
    let (callback, lines) = collecting_callback();
    let result = CommandExecutor::new().execute(
        "for i in 1 2 3 4 5; do echo line$i; done",
        None,
        Some(callback),
    );

    assert!(result.success());
    assert_eq!(
        *lines.lock().unwrap(),
        vec!["line1", "line2", "line3", "line4", "line5"]
    );
    assert_eq!(result.stdout, "line1\nline2\nline3\nline4\nline5\n");
}

#[test]
fn test_callback_receives_both_streams() {
    let (callback, lines) = collecting_callback();
    let result = CommandExecutor::new().execute(
        "echo to-out; echo to-err >&2",
        None,
        Some(callback),
    );

    assert!(result.success());
    let mut seen = lines.lock().unwrap().clone();
    seen.sort();
    assert_eq!(seen, vec!["to-err", "to-out"]);
    assert_eq!(result.stderr, "to-err\n");
}

#[test]
fn test_lines_arrive_before_exit() {
    let (callback, lines) = collecting_callback();
    let executor = Arc::new(CommandExecutor::new());

    let runner = {
        let executor = Arc::clone(&executor);
        thread::spawn(move || executor.execute("echo early; sleep 2; echo late", None, Some(callback)))
    };

    thread::sleep(Duration::from_millis(800));
    assert_eq!(*lines.lock().unwrap(), vec!["early"]);

    let result = runner.join().unwrap();
    assert!(result.success());
    assert_eq!(*lines.lock().unwrap(), vec!["early", "late"]);
}

#[test]
fn test_final_line_without_newline() {
    let (callback, lines) = collecting_callback();
    let result = CommandExecutor::new().execute("printf 'a\\nb'", None, Some(callback));

    assert_eq!(result.stdout, "a\nb");
    assert_eq!(*lines.lock().unwrap(), vec!["a", "b"]);
}

#[test]
fn test_invalid_bytes_replaced() {
    let executor = CommandExecutor::with_config(ExecutorConfig::new().encoding("utf-8"));
    let result = executor.execute("printf 'ok\\377\\n'", None, None);

    assert!(result.success());
    assert_eq!(result.stdout, "ok\u{FFFD}\n");
}

// ============================================================================
// Cancellation Tests
// ============================================================================

#[test]
fn test_cancel_from_another_thread() {
    let executor = Arc::new(CommandExecutor::new());

    let runner = {
        let executor = Arc::clone(&executor);
        thread::spawn(move || executor.execute("sleep 30", None, None))
    };

    thread::sleep(Duration::from_millis(300));
    let started = Instant::now();
    executor.cancel();
    executor.cancel();

    let result = runner.join().unwrap();
    assert_eq!(result.status, ExecutionStatus::Cancelled);
    assert!(started.elapsed() < Duration::from_secs(8));
    assert!(executor.cancel_handle().is_none());
}

#[test]
fn test_cancel_escalates_to_kill() {
    let config = ExecutorConfig::new().kill_grace(Duration::from_millis(300));
    let executor = Arc::new(CommandExecutor::with_config(config));

    let runner = {
        let executor = Arc::clone(&executor);
        thread::spawn(move || executor.execute("trap '' TERM; sleep 30", None, None))
    };

    thread::sleep(Duration::from_millis(300));
    executor.cancel();

    let result = runner.join().unwrap();
    assert_eq!(result.status, ExecutionStatus::Cancelled);
    assert_eq!(result.return_code, -9);
}

#[test]
fn test_cancel_without_running_command() {
    let executor = CommandExecutor::new();
    executor.cancel();

    let result = executor.execute("echo fine", None, None);
    assert!(result.success());
}
