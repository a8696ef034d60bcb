//! Task registry for asynchronous execution.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tokio::runtime::Handle;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::TaskId;
use crate::error::ShellRunnerError;
use crate::execution::{
    Command, CommandExecutor, ExecutionResult, ExecutionStatus, ExecutorConfig, LineCallback,
};
use crate::Result;

/// Callback fired once with the task's result, on the task's own thread.
pub type CompletionCallback = Box<dyn FnOnce(&TaskId, &ExecutionResult) + Send + 'static>;

/// A live registry entry.
struct AsyncTask {
    /// Distinguishes runs that reuse the same task ID.
    generation: u64,
    executor: Arc<CommandExecutor>,
    _handle: JoinHandle<()>,
}

/// Last result stored for an ID, tagged with the run that produced it.
struct StoredResult {
    generation: u64,
    result: ExecutionResult,
}

#[derive(Default)]
struct RegistryState {
    running: HashMap<TaskId, AsyncTask>,
    results: HashMap<TaskId, StoredResult>,
    next_generation: u64,
}

impl RegistryState {
    fn result(&self, task_id: &str) -> Option<ExecutionResult> {
        self.results.get(task_id).map(|stored| stored.result.clone())
    }
}

struct Inner {
    state: Mutex<RegistryState>,
    completed: Notify,
    runtime: Handle,
    config: ExecutorConfig,
}

impl Inner {
    fn state(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_current(&self, task_id: &TaskId, generation: u64) -> bool {
        self.state()
            .running
            .get(task_id)
            .is_some_and(|task| task.generation == generation)
    }

    fn run_task(
        &self,
        task_id: TaskId,
        generation: u64,
        executor: &CommandExecutor,
        command: Command,
        on_line: Option<LineCallback>,
        on_complete: Option<CompletionCallback>,
    ) {
        let mut result = if self.is_current(&task_id, generation) {
            executor.run(&command, on_line)
        } else {
            debug!(task = %task_id, "task cancelled before start");
            ExecutionResult::cancelled(command.command_line, Duration::ZERO)
        };

        let superseded = {
            let mut state = self.state();
            // Only cancel_task removes a live entry.
            let deregistered = !state
                .running
                .get(&task_id)
                .is_some_and(|task| task.generation == generation);
            if !deregistered {
                state.running.remove(&task_id);
            }
            if deregistered && result.status != ExecutionStatus::Cancelled {
                debug!(task = %task_id, status = %result.status, "task cancelled as it finished");
                result.status = ExecutionStatus::Cancelled;
            }

            let superseded = state
                .results
                .get(&task_id)
                .is_some_and(|stored| stored.generation > generation);
            if !superseded {
                state.results.insert(
                    task_id.clone(),
                    StoredResult {
                        generation,
                        result: result.clone(),
                    },
                );
            }
            superseded
        };

        if superseded {
            debug!(task = %task_id, generation, "newer run already stored a result, dropping this one");
        } else {
            self.completed.notify_waiters();
            info!(task = %task_id, status = %result.status, "task finished");
        }

        if let Some(callback) = on_complete {
            callback(&task_id, &result);
        }
    }
}

/// Registry of commands running in the background, keyed by task ID.
///
/// Each task runs a [`CommandExecutor`] on the tokio blocking pool. The
/// registry is an ordinary value: create one and share it by cloning.
#[derive(Clone)]
pub struct TaskRegistry {
    inner: Arc<Inner>,
}

impl TaskRegistry {
    /// Create a registry scheduling tasks on `runtime`.
    pub fn new(runtime: Handle) -> Self {
        Self::with_config(runtime, ExecutorConfig::default())
    }

    /// Create a registry whose tasks use the given executor settings.
    pub fn with_config(runtime: Handle, config: ExecutorConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(RegistryState::default()),
                completed: Notify::new(),
                runtime,
                config,
            }),
        }
    }

    /// Create a registry on the runtime the caller is running in.
    pub fn current() -> Result<Self> {
        Handle::try_current()
            .map(Self::new)
            .map_err(|e| ShellRunnerError::NoRuntime(e.to_string()))
    }

    /// Start `command` in the background under `task_id`.
    ///
    /// Fails with [`ShellRunnerError::DuplicateTask`] if a task with the same
    /// ID is still running; the running task is left untouched.
    pub fn execute_async(
        &self,
        task_id: impl Into<TaskId>,
        command: impl Into<String>,
        working_dir: Option<PathBuf>,
        timeout: Option<Duration>,
        on_line: Option<LineCallback>,
        on_complete: Option<CompletionCallback>,
    ) -> Result<()> {
        let command = Command {
            command_line: command.into(),
            working_dir,
            env: HashMap::new(),
            timeout,
        };
        self.submit(task_id, command, on_line, on_complete)
    }

    /// Start a [`Command`] in the background under `task_id`.
    pub fn submit(
        &self,
        task_id: impl Into<TaskId>,
        command: Command,
        on_line: Option<LineCallback>,
        on_complete: Option<CompletionCallback>,
    ) -> Result<()> {
        let task_id = task_id.into();
        let mut state = self.inner.state();

        if state.running.contains_key(&task_id) {
            warn!(task = %task_id, "rejecting duplicate task");
            return Err(ShellRunnerError::DuplicateTask(task_id));
        }

        let generation = state.next_generation;
        state.next_generation += 1;

        let executor = Arc::new(CommandExecutor::with_config(self.inner.config.clone()));
        let task_executor = Arc::clone(&executor);
        let inner = Arc::clone(&self.inner);
        let id = task_id.clone();

        info!(task = %task_id, command = %command.command_line, "starting task");

        // Registered under the lock, so the entry exists before the task can finish.
        let handle = self.inner.runtime.spawn_blocking(move || {
            inner.run_task(id, generation, &task_executor, command, on_line, on_complete);
        });

        state.running.insert(
            task_id,
            AsyncTask {
                generation,
                executor,
                _handle: handle,
            },
        );
        Ok(())
    }

    /// Whether `task_id` is currently registered as running.
    ///
    /// A snapshot; a concurrent completion may change it immediately.
    pub fn is_running(&self, task_id: &str) -> bool {
        self.inner.state().running.contains_key(task_id)
    }

    /// The last stored result for `task_id`.
    pub fn get_result(&self, task_id: &str) -> Option<ExecutionResult> {
        self.inner.state().result(task_id)
    }

    /// Deregister a running task and cancel its process.
    ///
    /// Returns whether the task was running. When it was, the task's stored
    /// result is `Cancelled` even if the child is still spawning or about to
    /// exit. The child's termination escalation runs on the blocking pool, so
    /// this does not wait for it.
    pub fn cancel_task(&self, task_id: &str) -> bool {
        let Some(task) = self.inner.state().running.remove(task_id) else {
            return false;
        };

        info!(task = %task_id, "cancelling task");
        let executor = task.executor;
        self.inner.runtime.spawn_blocking(move || executor.abort());
        true
    }

    /// Snapshot of the running task IDs, in no particular order.
    pub fn get_running_tasks(&self) -> Vec<TaskId> {
        self.inner.state().running.keys().cloned().collect()
    }

    /// Number of running tasks.
    pub fn running_count(&self) -> usize {
        self.inner.state().running.len()
    }

    /// Wait until `task_id` is no longer running and return its result.
    ///
    /// Returns immediately for IDs that are not running. The result may be
    /// absent for a task that was cancelled and has not stored one yet.
    pub async fn wait(&self, task_id: &str) -> Option<ExecutionResult> {
        loop {
            let notified = self.inner.completed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let state = self.inner.state();
                if !state.running.contains_key(task_id) {
                    return state.result(task_id);
                }
            }

            notified.await;
        }
    }

    /// Wait for `task_id`, giving up after `timeout`.
    pub async fn wait_timeout(&self, task_id: &str, timeout: Duration) -> Option<ExecutionResult> {
        let started = Instant::now();
        let result = tokio::time::timeout(timeout, self.wait(task_id)).await.ok()?;
        debug!(task = %task_id, waited_ms = started.elapsed().as_millis() as u64, "wait finished");
        result
    }
}

impl std::fmt::Debug for TaskRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskRegistry")
            .field("running", &self.get_running_tasks())
            .finish_non_exhaustive()
    }
}
