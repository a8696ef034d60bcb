//! Command execution engine.
//!
//! This module provides command execution capabilities:
//! - Blocking execution with live line streaming
//! - Timeout handling and cooperative cancellation
//! - Termination escalation (graceful request, then forced kill)
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use shell_runner::execution::{line_callback, CommandExecutor};
//!
//! let executor = CommandExecutor::new();
//! let result = executor.execute(
//!     "cargo build",
//!     Some(Duration::from_secs(600)),
//!     Some(line_callback(|line| println!("{}", line))),
//! );
//! println!("{}: exit {}", result.status, result.return_code);
//! ```

mod command;
mod executor;
mod reader;
mod result;
mod session;
mod status;

pub use command::Command;
pub use executor::{
    execute_simple, execute_with_timeout, CommandExecutor, ExecutorConfig, DEFAULT_READER_GRACE,
};
pub use reader::{line_callback, LineCallback, StreamKind};
pub use result::{ExecutionResult, NO_EXIT_CODE};
pub use session::{exit_code, CancelHandle, ProcessSession, DEFAULT_KILL_GRACE};
pub use status::ExecutionStatus;
