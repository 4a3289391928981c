//! Serialized, suspendable execution context
//!
//! All tasks submitted to a [`SerializedContext`] run one at a time in
//! submission order, no matter how many threads submit them or how many
//! threads the backend owns. Tasks are drained by *sweeps*: one backend
//! submission runs at most `throughput` tasks, then hands the thread back and
//! submits a fresh sweep if work remains.
//!
//! ```text
//!              execute / resume (work queued)
//!   Idle ──────────────────────────────────────▶ SweepActive
//!    ▲                                               │
//!    │   queue empty, or suspended after a task      │ throughput spent:
//!    └───────────────────────────────────────────────┤ new sweep submitted,
//!                                                    ▼ stays SweepActive
//! ```

mod state;

use self::state::{DispatchState, Step};
use crate::backend::Backend;
use crate::config::ContextConfig;
use crate::error::{DispatchError, TaskFailure};
use crate::task::Task;
use crossbeam::queue::SegQueue;
use std::fmt;
use std::sync::Arc;

struct Shared {
    /// Tasks not yet started, FIFO. Only the active sweep pops.
    queue: SegQueue<Task>,

    /// Queued count, suspended flag, active-sweep flag
    state: DispatchState,

    /// Tasks per sweep
    throughput: usize,

    backend: Arc<dyn Backend>,
}

impl Shared {
    fn schedule_sweep(self: &Arc<Self>) {
        tracing::trace!(queued = self.state.load().count(), "Scheduling sweep");
        let shared = self.clone();
        self.backend.submit(Task::new(move || shared.sweep()));
    }

    /// Run up to `throughput` tasks on the current thread
    fn sweep(self: &Arc<Self>) {
        let mut ran = 0;
        loop {
            match self.state.checkpoint(ran < self.throughput) {
                Step::Run => {}
                Step::Stop => {
                    tracing::trace!(ran, "Sweep finished");
                    return;
                }
                Step::Reschedule => {
                    self.schedule_sweep();
                    return;
                }
            }

            // Every counted task was pushed before its count was published,
            // so a positive count means the pop finds one.
            let Some(task) = self.queue.pop() else {
                std::hint::spin_loop();
                continue;
            };
            task.run_guarded(self.backend.as_ref());
            ran += 1;
            self.state.complete();
        }
    }
}

/// Execution context that runs its tasks strictly one after another
///
/// Cloning yields another handle to the same queue.
#[derive(Clone)]
pub struct SerializedContext {
    shared: Arc<Shared>,
}

impl SerializedContext {
    /// Decorate `backend`, running at most `throughput` tasks per sweep
    pub fn new(backend: Arc<dyn Backend>, throughput: usize) -> Result<Self, DispatchError> {
        Self::with_config(backend, &ContextConfig::with_throughput(throughput))
    }

    /// Decorate `backend` with explicit settings
    pub fn with_config(
        backend: Arc<dyn Backend>,
        config: &ContextConfig,
    ) -> Result<Self, DispatchError> {
        config.validate()?;
        Ok(Self {
            shared: Arc::new(Shared {
                queue: SegQueue::new(),
                state: DispatchState::new(),
                throughput: config.throughput,
                backend,
            }),
        })
    }

    /// Queue a task. Schedules a sweep if none is active and the context is
    /// not suspended.
    pub fn execute(&self, task: Task) {
        self.shared.queue.push(task);
        if self.shared.state.enqueue() {
            self.shared.schedule_sweep();
        }
    }

    /// Stop dispatching after the currently running task, if any.
    /// Queued tasks stay queued.
    pub fn suspend(&self) {
        if self.shared.state.suspend() {
            tracing::debug!(queued = self.size(), "Serialized context suspended");
        }
    }

    /// Continue dispatching. Schedules exactly one sweep if tasks are queued
    /// and no sweep is active.
    pub fn resume(&self) {
        let scheduled = self.shared.state.resume();
        tracing::debug!(queued = self.size(), scheduled, "Serialized context resumed");
        if scheduled {
            self.shared.schedule_sweep();
        }
    }

    /// Tasks queued or currently executing
    pub fn size(&self) -> usize {
        self.shared.state.load().count()
    }

    /// Whether every submitted task has finished
    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Whether the context is suspended
    pub fn is_suspended(&self) -> bool {
        self.shared.state.load().is_suspended()
    }

    /// Maximum tasks run per sweep
    pub fn throughput(&self) -> usize {
        self.shared.throughput
    }
}

impl Backend for SerializedContext {
    fn submit(&self, task: Task) {
        self.execute(task);
    }

    fn report_failure(&self, failure: TaskFailure) {
        self.shared.backend.report_failure(failure);
    }
}

impl fmt::Debug for SerializedContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let snapshot = self.shared.state.load();
        f.debug_struct("SerializedContext")
            .field("throughput", &self.shared.throughput)
            .field("size", &snapshot.count())
            .field("suspended", &snapshot.is_suspended())
            .field("sweep_active", &snapshot.is_active())
            .finish()
    }
}
