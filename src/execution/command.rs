//! Per-invocation execution request.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// One shell command line plus the overrides it runs with.
///
/// The line goes to `sh -c` (or `cmd /C`) untouched, so pipes, redirects and
/// quoting follow the shell's rules. Unset fields fall back to the
/// executor's [`ExecutorConfig`](super::ExecutorConfig).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Command {
    /// Shell command line.
    pub command_line: String,
    /// Directory the shell starts in.
    pub working_dir: Option<PathBuf>,
    /// Variables added to the inherited environment.
    pub env: HashMap<String, String>,
    /// Deadline for the child, measured from spawn.
    pub timeout: Option<Duration>,
}

impl Command {
    pub fn new(command_line: impl Into<String>) -> Self {
        Self {
            command_line: command_line.into(),
            ..Default::default()
        }
    }

    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Set one variable for the child; later calls win.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn envs<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.env
            .extend(vars.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    pub fn timeout(mut self, duration: Duration) -> Self {
        self.timeout = Some(duration);
        self
    }

    /// This command's directory, else `fallback`.
    pub fn working_dir_or<'a>(&'a self, fallback: Option<&'a Path>) -> Option<&'a Path> {
        self.working_dir.as_deref().or(fallback)
    }

    /// This command's timeout, else `fallback`.
    pub fn timeout_or(&self, fallback: Option<Duration>) -> Option<Duration> {
        self.timeout.or(fallback)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.command_line)
    }
}

impl From<&str> for Command {
    fn from(command_line: &str) -> Self {
        Self::new(command_line)
    }
}

impl From<String> for Command {
    fn from(command_line: String) -> Self {
        Self::new(command_line)
    }
}
