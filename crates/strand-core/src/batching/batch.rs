//! Thread-confined batch state and the blocking handoff
//!
//! Each thread keeps a stack of active batches: normally one, more when a
//! backend runs a batch runner synchronously from inside another batch. Only
//! the owning thread appends to or pops from them, so they need no locking.
//! Ownership moves between threads only by resubmitting the remaining tasks
//! to the backend as a fresh unit of work.

use super::Shared;
use crate::task::Task;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::sync::Arc;

/// Batch currently being drained on this thread
struct ActiveBatch {
    /// Executor the batch belongs to
    executor: Arc<Shared>,

    /// Tasks not yet started, drained FIFO
    tasks: VecDeque<Task>,
}

thread_local! {
    /// Innermost batch last
    static CURRENT: RefCell<Vec<ActiveBatch>> = const { RefCell::new(Vec::new()) };
}

/// Append `task` to this thread's innermost batch if it belongs to
/// `executor`. Hands the task back otherwise.
pub(super) fn try_append(executor: &Arc<Shared>, task: Task) -> Result<(), Task> {
    CURRENT.with(|current| match current.borrow_mut().last_mut() {
        Some(batch) if Arc::ptr_eq(&batch.executor, executor) => {
            batch.tasks.push_back(task);
            Ok(())
        }
        _ => Err(task),
    })
}

/// Whether this thread is draining a batch owned by `executor`
pub(super) fn is_draining(executor: &Arc<Shared>) -> bool {
    CURRENT.with(|current| {
        current
            .borrow()
            .last()
            .is_some_and(|batch| Arc::ptr_eq(&batch.executor, executor))
    })
}

/// Batch runner: claim the thread for `tasks` and run them until the batch
/// is empty or has been handed off.
pub(super) fn drain(executor: Arc<Shared>, tasks: VecDeque<Task>) {
    let depth = CURRENT.with(|current| {
        let mut stack = current.borrow_mut();
        stack.push(ActiveBatch {
            executor: executor.clone(),
            tasks,
        });
        stack.len() - 1
    });

    // The RefCell is never borrowed while a task runs, so tasks may append.
    while let Some(task) = next_task(&executor, depth) {
        task.run_guarded(executor.backend.as_ref());
    }

    CURRENT.with(|current| current.borrow_mut().truncate(depth));
}

/// Pop the next task of the batch at `depth`. Batches started above it have
/// all finished by the time its runner asks again.
fn next_task(executor: &Arc<Shared>, depth: usize) -> Option<Task> {
    CURRENT.with(|current| {
        let mut stack = current.borrow_mut();
        if stack.len() != depth + 1 {
            // Ownership was given up by a blocking call
            return None;
        }
        stack
            .last_mut()
            .filter(|batch| Arc::ptr_eq(&batch.executor, executor))
            .and_then(|batch| batch.tasks.pop_front())
    })
}

/// Signal that `f` is about to block the current thread, then run it.
///
/// When called from a task that is draining a batch, the tasks still queued
/// behind it are resubmitted to the backend as a new batch and this thread
/// gives up batch ownership before `f` starts, so the queued tasks never wait
/// on `f`. Anything `f` waits for may therefore depend on those tasks. If
/// batches are nested on this thread, every one of them is handed off,
/// outermost first.
/// Outside a batch this just runs `f`.
///
/// Blocking that is not wrapped in `blocking` cannot be detected.
pub fn blocking<F, R>(f: F) -> R
where
    F: FnOnce() -> R,
{
    let released = CURRENT.with(|current| std::mem::take(&mut *current.borrow_mut()));
    for ActiveBatch { executor, tasks } in released {
        if tasks.is_empty() {
            continue;
        }
        tracing::trace!(remaining = tasks.len(), "Handing off batch before blocking");
        let runner = executor.clone();
        executor
            .backend
            .submit(Task::new(move || drain(runner, tasks)));
    }
    f()
}
