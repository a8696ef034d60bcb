//! CLI integration tests.
//!
//! These tests verify the CLI argument parsing and configuration loading.

use std::ffi::OsString;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use tempfile::NamedTempFile;

use shell_runner::cli::{parse_args_from, Args};
use shell_runner::config::{Config, ConfigError};

fn args(args: &[&str]) -> Vec<OsString> {
    std::iter::once("shell-runner")
        .chain(args.iter().copied())
        .map(OsString::from)
        .collect()
}

fn config_file(json: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(json.as_bytes()).unwrap();
    file
}

// ============================================================================
// CLI Argument Tests
// ============================================================================

#[test]
fn test_cli_defaults() {
    let result = parse_args_from(args(&[])).unwrap();

    assert!(result.command.is_none());
    assert!(result.timeout.is_none());
    assert!(result.cwd.is_none());
    assert!(result.config.is_none());
    assert!(!result.json);
    assert!(!result.quiet);
    assert!(!result.keep_partial);
}

#[test]
fn test_cli_full_options() {
    let result = parse_args_from(args(&[
        "-t",
        "12.5",
        "-C",
        "/srv/app",
        "-l",
        "debug",
        "--keep-partial",
        "--json",
        "-q",
        "make",
        "-j4",
        "all",
    ]))
    .unwrap();

    assert_eq!(result.timeout, Some(12.5));
    assert_eq!(result.cwd, Some(PathBuf::from("/srv/app")));
    assert_eq!(result.log_level, Some("debug".to_string()));
    assert!(result.keep_partial);
    assert!(result.json);
    assert!(result.quiet);
    assert_eq!(result.command.as_deref(), Some("make -j4 all"));
}

#[test]
fn test_cli_options_after_command_belong_to_command() {
    let result = parse_args_from(args(&["grep", "-q", "--json", "x"])).unwrap();

    assert_eq!(result.command.as_deref(), Some("grep -q --json x"));
    assert!(!result.quiet);
    assert!(!result.json);
}

#[test]
fn test_cli_config_file() {
    let result = parse_args_from(args(&["-c", "/etc/shell-runner.json", "true"])).unwrap();
    assert_eq!(result.config, Some(PathBuf::from("/etc/shell-runner.json")));
}

#[test]
fn test_cli_invalid_timeout() {
    assert!(parse_args_from(args(&["-t", "not-a-number", "true"])).is_err());
    assert!(parse_args_from(args(&["-t", "NaN", "true"])).is_err());
}

#[test]
fn test_cli_missing_option_value() {
    assert!(parse_args_from(args(&["--timeout"])).is_err());
}

// ============================================================================
// Configuration Loading Tests
// ============================================================================

#[test]
fn test_config_from_json_file() {
    let file = config_file(
        r#"{
        "executor": {
            "working_dir": "/tmp",
            "timeout_secs": 45,
            "kill_grace_secs": 0.5,
            "reader_grace_secs": 1,
            "keep_partial_output": true,
            "encoding": "utf-8"
        },
        "logging": {
            "level": "debug"
        }
    }"#,
    );

    let config = Config::from_file(file.path()).unwrap();

    assert_eq!(config.executor.working_dir, Some(PathBuf::from("/tmp")));
    assert_eq!(config.executor.timeout_secs, Some(45.0));
    assert_eq!(config.executor.kill_grace_secs, 0.5);
    assert_eq!(config.executor.reader_grace_secs, 1.0);
    assert!(config.executor.keep_partial_output);
    assert_eq!(config.executor.encoding.as_deref(), Some("utf-8"));
    assert_eq!(config.logging.level, "debug");
}

#[test]
fn test_config_priority_cli_over_file() {
    let file = config_file(
        r#"{
        "executor": {
            "timeout_secs": 100
        },
        "logging": {
            "level": "warn"
        }
    }"#,
    );

    let args = Args {
        timeout: Some(2.0),
        log_level: Some("trace".to_string()),
        config: Some(file.path().to_path_buf()),
        ..Args::default()
    };

    let config = Config::load(&args).unwrap();

    assert_eq!(config.executor.timeout_secs, Some(2.0));
    assert_eq!(config.logging.level, "trace");
}

#[test]
fn test_config_missing_file_is_error() {
    let args = Args {
        config: Some(PathBuf::from("/nonexistent/shell-runner.json")),
        ..Args::default()
    };

    assert!(matches!(Config::load(&args), Err(ConfigError::Io(_))));
}

#[test]
fn test_config_to_executor_config() {
    let dir = tempfile::tempdir().unwrap();
    let args = Args {
        timeout: Some(1.5),
        cwd: Some(dir.path().to_path_buf()),
        keep_partial: true,
        ..Args::default()
    };

    let config = Config::load(&args).unwrap();
    let executor = config.to_executor_config().unwrap();

    assert_eq!(executor.default_timeout, Some(Duration::from_millis(1500)));
    assert_eq!(executor.working_dir.as_deref(), Some(dir.path()));
    assert!(executor.keep_partial_output);
}

#[test]
fn test_config_invalid_grace_rejected() {
    let file = config_file(r#"{"executor": {"kill_grace_secs": -3}}"#);
    let config = Config::from_file(file.path()).unwrap();

    let err = config.to_executor_config().unwrap_err();
    assert!(err.to_string().contains("kill_grace_secs"));
}

// ============================================================================
// Configuration Serialization Tests
// ============================================================================

#[test]
fn test_config_roundtrip() {
    let original = Config::default();
    let json = serde_json::to_string(&original).unwrap();
    let loaded: Config = serde_json::from_str(&json).unwrap();

    assert_eq!(original, loaded);
}

#[test]
fn test_config_partial_deserialization() {
    let json = r#"{"executor": {"keep_partial_output": true}}"#;
    let config: Config = serde_json::from_str(json).unwrap();

    assert!(config.executor.keep_partial_output);
    assert_eq!(config.executor.kill_grace_secs, 5.0); // Default
    assert_eq!(config.logging.level, "info"); // Default
}
