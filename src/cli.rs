//! Command-line interface for shell-runner.
//!
//! Uses lexopt for minimal binary size overhead (~34KB).

use std::ffi::OsString;
use std::path::PathBuf;

/// Command-line arguments.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Args {
    /// Command line to run; words after the first positional are joined.
    pub command: Option<String>,
    /// Timeout in seconds.
    pub timeout: Option<f64>,
    /// Working directory for the command.
    pub cwd: Option<PathBuf>,
    /// Path to configuration file.
    pub config: Option<PathBuf>,
    /// Output encoding label.
    pub encoding: Option<String>,
    /// Log level (error, warn, info, debug, trace).
    pub log_level: Option<String>,
    /// Keep output captured before a timeout.
    pub keep_partial: bool,
    /// Print the result as JSON.
    pub json: bool,
    /// Do not stream lines while the command runs.
    pub quiet: bool,
    /// Show version and exit.
    pub version: bool,
    /// Show help and exit.
    pub help: bool,
}

/// Parse command-line arguments.
pub fn parse_args() -> Result<Args, ArgsError> {
    parse_args_from(std::env::args_os())
}

/// Parse arguments from an iterator (for testing).
pub fn parse_args_from<I>(args: I) -> Result<Args, ArgsError>
where
    I: IntoIterator<Item = OsString>,
{
    use lexopt::prelude::*;

    let mut result = Args::default();
    let mut parser = lexopt::Parser::from_iter(args);

    while let Some(arg) = parser.next()? {
        match arg {
            Short('h') | Long("help") => {
                result.help = true;
            }
            Short('V') | Long("version") => {
                result.version = true;
            }
            Short('t') | Long("timeout") => {
                let value: String = parser.value()?.parse()?;
                let secs: f64 = value
                    .parse()
                    .map_err(|_| ArgsError::InvalidValue("timeout", value.clone()))?;
                if !secs.is_finite() || secs < 0.0 {
                    return Err(ArgsError::InvalidValue("timeout", value));
                }
                result.timeout = Some(secs);
            }
            Short('C') | Long("cwd") => {
                result.cwd = Some(parser.value()?.parse()?);
            }
            Short('c') | Long("config") => {
                result.config = Some(parser.value()?.parse()?);
            }
            Short('e') | Long("encoding") => {
                result.encoding = Some(parser.value()?.parse()?);
            }
            Short('l') | Long("log-level") => {
                result.log_level = Some(parser.value()?.parse()?);
            }
            Long("keep-partial") => {
                result.keep_partial = true;
            }
            Long("json") => {
                result.json = true;
            }
            Short('q') | Long("quiet") => {
                result.quiet = true;
            }
            Value(val) => {
                // Everything from the first word on belongs to the command.
                let mut words = vec![val.string()?];
                for word in parser.raw_args()? {
                    words.push(word.string()?);
                }
                result.command = Some(words.join(" "));
            }
            _ => return Err(arg.unexpected().into()),
        }
    }

    Ok(result)
}

/// Print help message.
pub fn print_help() {
    let version = env!("CARGO_PKG_VERSION");
    println!(
        r#"shell-runner {version}
Run a shell command with live output, a timeout and clean cancellation

USAGE:
    shell-runner [OPTIONS] <COMMAND>...

OPTIONS:
    -t, --timeout <SECS>    Fail the command after SECS seconds
    -C, --cwd <DIR>         Working directory for the command
    -c, --config <FILE>     Path to configuration file (JSON)
    -e, --encoding <LABEL>  Output encoding (e.g. utf-8, cp936, shift_jis)
    -l, --log-level <LVL>   Log level (error, warn, info, debug, trace)
        --keep-partial      Keep output captured before a timeout
        --json              Print the result as JSON
    -q, --quiet             Collect output instead of streaming it
    -h, --help              Print help
    -V, --version           Print version

ENVIRONMENT VARIABLES:
    SHELL_RUNNER_TIMEOUT       Timeout in seconds (overrides config)
    SHELL_RUNNER_WORKING_DIR   Working directory (overrides config)
    SHELL_RUNNER_ENCODING      Output encoding (overrides detection)
    SHELL_RUNNER_LOG_LEVEL     Log level (overrides config)
    RUST_LOG                   Alternative log level setting

EXAMPLES:
    # Stream a build, giving up after ten minutes
    shell-runner -t 600 make all

    # Run in another directory and print the result as JSON
    shell-runner -C /srv/app --json "git status --short"

    # Options after the first command word are passed to the command
    shell-runner ls -la
"#
    );
}

/// Print version.
pub fn print_version() {
    println!("shell-runner {}", env!("CARGO_PKG_VERSION"));
}

/// Argument parsing errors.
#[derive(Debug)]
pub enum ArgsError {
    /// Lexopt parsing error.
    Lexopt(lexopt::Error),
    /// Invalid argument value.
    InvalidValue(&'static str, String),
}

impl std::fmt::Display for ArgsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Lexopt(e) => write!(f, "{}", e),
            Self::InvalidValue(name, value) => {
                write!(f, "invalid value for --{}: '{}'", name, value)
            }
        }
    }
}

impl std::error::Error for ArgsError {}

impl From<lexopt::Error> for ArgsError {
    fn from(e: lexopt::Error) -> Self {
        Self::Lexopt(e)
    }
}
