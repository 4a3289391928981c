//! Backend abstraction decorated by the execution contexts
//!
//! A backend is whatever actually lends threads to tasks: a thread pool, an
//! event loop, or the calling thread. The decorators only need two things
//! from it: a way to submit a unit of work and a sink for task failures.

use crate::error::TaskFailure;
use crate::task::Task;
use parking_lot::Mutex;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};

/// A task-running facility
pub trait Backend: Send + Sync {
    /// Hand `task` to be run on some thread. Must return without waiting
    /// for the task to run, unless the backend is deliberately inline.
    fn submit(&self, task: Task);

    /// Sink for failures of tasks that were caught by a decorator
    fn report_failure(&self, failure: TaskFailure);
}

/// Backend that runs tasks on the submitting thread
///
/// A submission from outside any inline task runs right away. One made while
/// an inline task is running on this thread is queued and runs after that
/// task returns, from the same loop, so chains of resubmissions never deepen
/// the stack.
#[derive(Debug, Default, Clone, Copy)]
pub struct InlineBackend;

thread_local! {
    /// Tasks waiting for the running inline loop; `None` when none is running
    static INLINE_QUEUE: RefCell<Option<VecDeque<Task>>> = const { RefCell::new(None) };
}

impl Backend for InlineBackend {
    fn submit(&self, task: Task) {
        let queued = INLINE_QUEUE.with(|queue| match queue.borrow_mut().as_mut() {
            Some(pending) => {
                pending.push_back(task);
                Ok(())
            }
            None => Err(task),
        });
        let Err(first) = queued else {
            return;
        };

        INLINE_QUEUE.with(|queue| *queue.borrow_mut() = Some(VecDeque::new()));
        let mut next = Some(first);
        while let Some(task) = next {
            task.run_guarded(self);
            next = INLINE_QUEUE.with(|queue| {
                queue.borrow_mut().as_mut().and_then(VecDeque::pop_front)
            });
        }
        INLINE_QUEUE.with(|queue| *queue.borrow_mut() = None);
    }

    fn report_failure(&self, failure: TaskFailure) {
        tracing::error!(error = %failure, "Task failed on inline backend");
    }
}

/// Deterministic backend that only runs tasks when asked to
///
/// Submitted tasks wait in FIFO order until [`ManualBackend::step`] or
/// [`ManualBackend::run_until_stalled`] is called. Reported failures are
/// collected instead of logged.
#[derive(Default)]
pub struct ManualBackend {
    pending: Mutex<VecDeque<Task>>,
    submitted: AtomicUsize,
    failures: Mutex<Vec<TaskFailure>>,
}

impl ManualBackend {
    /// Create an empty backend
    pub fn new() -> Self {
        Self::default()
    }

    /// Run the oldest pending task. Returns false if nothing was pending.
    pub fn step(&self) -> bool {
        // Lock released before running: the task may submit more work.
        let next = self.pending.lock().pop_front();
        match next {
            Some(task) => {
                task.run_guarded(self);
                true
            }
            None => false,
        }
    }

    /// Run pending tasks, including ones they submit, until none remain.
    /// Returns how many tasks ran.
    pub fn run_until_stalled(&self) -> usize {
        let mut ran = 0;
        while self.step() {
            ran += 1;
        }
        ran
    }

    /// Number of tasks waiting to run
    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    /// Total number of submissions ever received
    pub fn submitted(&self) -> usize {
        self.submitted.load(Ordering::Acquire)
    }

    /// Failures reported so far
    pub fn failures(&self) -> Vec<TaskFailure> {
        self.failures.lock().clone()
    }
}

impl Backend for ManualBackend {
    fn submit(&self, task: Task) {
        self.submitted.fetch_add(1, Ordering::AcqRel);
        self.pending.lock().push_back(task);
    }

    fn report_failure(&self, failure: TaskFailure) {
        self.failures.lock().push(failure);
    }
}
