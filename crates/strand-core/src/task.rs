//! Task structure shared by every backend and decorator

use crate::backend::Backend;
use crate::error::TaskFailure;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};

/// Boxed task body
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// An opaque unit of work
///
/// A task is either plain or *batchable*. Batchable tasks submitted to a
/// [`BatchingExecutor`](crate::BatchingExecutor) from a thread that is
/// already draining a batch are appended to that batch instead of going
/// back through the backend. Plain tasks always reach the backend as an
/// independent unit.
pub struct Task {
    job: Job,
    batchable: bool,
}

impl Task {
    /// Create a plain task
    pub fn new<F>(f: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            job: Box::new(f),
            batchable: false,
        }
    }

    /// Create a task eligible for inline coalescing
    pub fn batchable<F>(f: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            job: Box::new(f),
            batchable: true,
        }
    }

    /// Whether this task may be merged into an in-progress batch
    pub fn is_batchable(&self) -> bool {
        self.batchable
    }

    /// Run the task body on the current thread
    ///
    /// Panics escape to the caller. Decorators use [`Task::run_guarded`].
    pub fn run(self) {
        (self.job)()
    }

    /// Run the task, catching a panic and returning it as a [`TaskFailure`]
    pub fn try_run(self) -> Result<(), TaskFailure> {
        catch_unwind(AssertUnwindSafe(self.job)).map_err(TaskFailure::from_panic)
    }

    /// Run the task and hand any failure to `backend`'s failure sink
    pub(crate) fn run_guarded(self, backend: &dyn Backend) {
        if let Err(failure) = self.try_run() {
            backend.report_failure(failure);
        }
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("batchable", &self.batchable)
            .finish_non_exhaustive()
    }
}
