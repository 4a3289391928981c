//! Batching executor
//!
//! Coalesces batchable tasks submitted from inside a running batch so they run
//! on the same thread, after the current task, without another round trip
//! through the backend. A task that is about to block calls [`blocking`],
//! which hands the rest of its batch back to the backend first.

mod batch;

pub use batch::blocking;

use crate::backend::Backend;
use crate::error::TaskFailure;
use crate::task::Task;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

/// State shared by an executor's handles and its in-flight batch runners
pub(crate) struct Shared {
    backend: Arc<dyn Backend>,
}

/// Executor decorator that runs nested batchable submissions inline
///
/// Cloning yields another handle to the same executor: batchable tasks
/// submitted through any handle join the calling thread's batch.
#[derive(Clone)]
pub struct BatchingExecutor {
    shared: Arc<Shared>,
}

impl BatchingExecutor {
    /// Decorate `backend`
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self {
            shared: Arc::new(Shared { backend }),
        }
    }

    /// Submit a task
    ///
    /// A batchable task submitted while this thread drains a batch of this
    /// executor is appended to that batch and runs after everything already
    /// queued in it. Any other batchable task starts a new batch on the
    /// backend. Plain tasks always go straight to the backend.
    pub fn execute(&self, task: Task) {
        if !task.is_batchable() {
            self.shared.backend.submit(task);
            return;
        }

        if let Err(task) = batch::try_append(&self.shared, task) {
            self.submit_batch(VecDeque::from([task]));
        }
    }

    /// Whether the calling thread is currently draining a batch of this executor
    pub fn is_batching(&self) -> bool {
        batch::is_draining(&self.shared)
    }

    /// The decorated backend
    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.shared.backend
    }

    fn submit_batch(&self, tasks: VecDeque<Task>) {
        let shared = self.shared.clone();
        self.shared
            .backend
            .submit(Task::new(move || batch::drain(shared, tasks)));
    }
}

impl Backend for BatchingExecutor {
    fn submit(&self, task: Task) {
        self.execute(task);
    }

    fn report_failure(&self, failure: TaskFailure) {
        self.shared.backend.report_failure(failure);
    }
}

impl fmt::Debug for BatchingExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchingExecutor").finish_non_exhaustive()
    }
}
