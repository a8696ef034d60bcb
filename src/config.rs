//! Configuration management for shell-runner.
//!
//! Configuration is loaded with the following priority (highest to lowest):
//! 1. Command-line arguments
//! 2. Environment variables
//! 3. Configuration file (JSON)
//! 4. Default values

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::cli::Args;
use crate::execution::{ExecutorConfig, DEFAULT_KILL_GRACE, DEFAULT_READER_GRACE};

/// Environment variable overriding the default timeout, in seconds.
pub const TIMEOUT_VAR: &str = "SHELL_RUNNER_TIMEOUT";
/// Environment variable overriding the working directory.
pub const WORKING_DIR_VAR: &str = "SHELL_RUNNER_WORKING_DIR";
/// Environment variable overriding the log level.
pub const LOG_LEVEL_VAR: &str = "SHELL_RUNNER_LOG_LEVEL";

/// Application configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Executor configuration.
    pub executor: ExecutorSection,
    /// Logging configuration.
    pub logging: LoggingSection,
}

/// Executor configuration section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorSection {
    /// Working directory for commands.
    pub working_dir: Option<PathBuf>,
    /// Timeout in seconds; none waits indefinitely.
    pub timeout_secs: Option<f64>,
    /// Seconds between the termination request and the forced kill.
    pub kill_grace_secs: f64,
    /// Seconds readers get to drain their pipes after exit.
    pub reader_grace_secs: f64,
    /// Keep output captured before a timeout.
    pub keep_partial_output: bool,
    /// Output encoding label; resolved from the environment when unset.
    pub encoding: Option<String>,
}

impl Default for ExecutorSection {
    fn default() -> Self {
        Self {
            working_dir: None,
            timeout_secs: None,
            kill_grace_secs: DEFAULT_KILL_GRACE.as_secs_f64(),
            reader_grace_secs: DEFAULT_READER_GRACE.as_secs_f64(),
            keep_partial_output: false,
            encoding: None,
        }
    }
}

/// Logging configuration section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Log level (error, warn, info, debug, trace) or a full filter directive.
    pub level: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        serde_json::from_str(&content).map_err(ConfigError::Json)
    }

    /// Apply environment variable overrides.
    pub fn apply_env(&mut self) {
        self.apply_env_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary variable lookup (for testing).
    pub fn apply_env_from<F>(&mut self, var: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(timeout) = var(TIMEOUT_VAR) {
            match timeout.trim().parse() {
                Ok(secs) => self.executor.timeout_secs = Some(secs),
                Err(_) => warn!(var = TIMEOUT_VAR, value = %timeout, "ignoring invalid timeout"),
            }
        }

        if let Some(dir) = var(WORKING_DIR_VAR).filter(|d| !d.is_empty()) {
            self.executor.working_dir = Some(PathBuf::from(dir));
        }

        if let Some(level) = var(LOG_LEVEL_VAR).or_else(|| var("RUST_LOG")) {
            self.logging.level = level;
        }
    }

    /// Apply CLI argument overrides.
    pub fn apply_args(&mut self, args: &Args) {
        if let Some(timeout) = args.timeout {
            self.executor.timeout_secs = Some(timeout);
        }

        if let Some(ref dir) = args.cwd {
            self.executor.working_dir = Some(dir.clone());
        }

        if let Some(ref encoding) = args.encoding {
            self.executor.encoding = Some(encoding.clone());
        }

        if args.keep_partial {
            self.executor.keep_partial_output = true;
        }

        if let Some(ref level) = args.log_level {
            self.logging.level = level.clone();
        }
    }

    /// Load configuration with full priority chain.
    ///
    /// Priority: CLI args > env vars > config file > defaults
    pub fn load(args: &Args) -> Result<Self, ConfigError> {
        let mut config = match args.config {
            Some(ref path) => Config::from_file(path)?,
            None => Config::default(),
        };

        config.apply_env();
        config.apply_args(args);

        Ok(config)
    }

    /// Convert to the executor's settings.
    pub fn to_executor_config(&self) -> Result<ExecutorConfig, ConfigError> {
        let section = &self.executor;
        let mut config = ExecutorConfig::new()
            .kill_grace(seconds("kill_grace_secs", section.kill_grace_secs)?)
            .reader_grace(seconds("reader_grace_secs", section.reader_grace_secs)?)
            .keep_partial_output(section.keep_partial_output);

        if let Some(secs) = section.timeout_secs {
            config = config.default_timeout(seconds("timeout_secs", secs)?);
        }

        if let Some(ref dir) = section.working_dir {
            if !dir.is_dir() {
                return Err(ConfigError::InvalidWorkingDir(dir.clone()));
            }
            config = config.working_dir(dir);
        }

        if let Some(ref encoding) = section.encoding {
            config = config.encoding(encoding.as_str());
        }

        Ok(config)
    }

    /// Get the log level filter string.
    pub fn log_filter(&self) -> &str {
        &self.logging.level
    }
}

fn seconds(name: &'static str, value: f64) -> Result<Duration, ConfigError> {
    Duration::try_from_secs_f64(value).map_err(|_| ConfigError::InvalidDuration(name, value))
}

/// Configuration errors.
#[derive(Debug)]
pub enum ConfigError {
    /// IO error reading config file.
    Io(std::io::Error),
    /// JSON parsing error.
    Json(serde_json::Error),
    /// Negative or non-finite duration.
    InvalidDuration(&'static str, f64),
    /// Working directory does not exist.
    InvalidWorkingDir(PathBuf),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "failed to read config file: {}", e),
            Self::Json(e) => write!(f, "failed to parse config file: {}", e),
            Self::InvalidDuration(name, value) => {
                write!(f, "invalid duration for {}: {}", name, value)
            }
            Self::InvalidWorkingDir(dir) => {
                write!(f, "working directory does not exist: {}", dir.display())
            }
        }
    }
}

impl std::error::Error for ConfigError {}
