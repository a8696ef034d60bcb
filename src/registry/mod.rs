//! Asynchronous execution keyed by task ID.
//!
//! [`TaskRegistry`] runs commands on independent threads, rejects duplicate
//! IDs while a task is live, and keeps the last result of every ID.

mod id;
mod store;

pub use id::TaskId;
pub use store::{CompletionCallback, TaskRegistry};
