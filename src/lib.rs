//! # shell-runner
//!
//! Shell command execution with live output, timeouts and cancellation.
//!
//! Commands run through the platform shell in their own process, with
//! stdout and stderr read concurrently. Output is decoded with the console
//! encoding and can be streamed line by line while the command runs.
//! Timeouts, non-zero exits and cancellation are reported as data in an
//! [`ExecutionResult`], never as errors.
//!
//! ## Features
//!
//! - **Synchronous execution**: [`CommandExecutor`] runs one command to completion
//! - **Background tasks**: [`TaskRegistry`] runs commands keyed by [`TaskId`]
//! - **Clean cancellation**: graceful termination, then a forced kill
//! - **Encoding detection**: environment override, locale or console code page
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::time::Duration;
//! use shell_runner::{line_callback, CommandExecutor, TaskRegistry};
//!
//! #[tokio::main]
//! async fn main() -> shell_runner::Result<()> {
//!     shell_runner::logging::try_init().ok();
//!
//!     // Blocking, with live lines
//!     let executor = CommandExecutor::new();
//!     let result = executor.execute(
//!         "cargo build",
//!         Some(Duration::from_secs(600)),
//!         Some(line_callback(|line| println!("> {}", line))),
//!     );
//!     println!("{} ({})", result.status, result.return_code);
//!
//!     // In the background
//!     let registry = TaskRegistry::current()?;
//!     registry.execute_async("t1", "sleep 1; echo done", None, None, None, None)?;
//!     let result = registry.wait("t1").await;
//!     println!("{:?}", result.map(|r| r.stdout));
//!
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod config;
pub mod encoding;
pub mod error;
pub mod execution;
pub mod logging;
pub mod registry;

// Re-export commonly used types
pub use encoding::{resolve_encoding, EncodingResolver};
pub use error::{Result, ShellRunnerError};
pub use execution::{
    execute_simple, execute_with_timeout, line_callback, CancelHandle, Command, CommandExecutor,
    ExecutionResult, ExecutionStatus, ExecutorConfig, LineCallback,
};
pub use registry::{CompletionCallback, TaskId, TaskRegistry};
