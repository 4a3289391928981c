//! Worker thread that executes submitted tasks
//!
//! Workers take tasks from their own deque, the pool's injector, or steal
//! from other workers. While a worker thread runs, its deque is published in
//! a thread-local so tasks submitted from that thread land locally.

use crate::deque::WorkerDeque;
use crate::pool::Shared;
use crate::PoolError;
use std::cell::RefCell;
use std::sync::Arc;
use std::thread;
use strand_core::Task;

struct LocalQueue {
    /// Address of the owning pool's shared state
    pool: usize,
    deque: WorkerDeque,
}

thread_local! {
    static LOCAL: RefCell<Option<LocalQueue>> = const { RefCell::new(None) };
}

/// Push `task` onto the current thread's deque if this thread is a worker of
/// `pool`. Hands the task back otherwise.
pub(crate) fn push_local(pool: &Arc<Shared>, task: Task) -> Result<(), Task> {
    let pool = Arc::as_ptr(pool) as usize;
    LOCAL.with(|local| match local.borrow().as_ref() {
        Some(queue) if queue.pool == pool => {
            queue.deque.push(task);
            Ok(())
        }
        _ => Err(task),
    })
}

/// Worker thread handle
pub(crate) struct Worker {
    id: usize,

    /// Deque handed to the thread on start
    deque: Option<WorkerDeque>,

    shared: Arc<Shared>,

    handle: Option<thread::JoinHandle<()>>,
}

impl Worker {
    pub(crate) fn new(id: usize, deque: WorkerDeque, shared: Arc<Shared>) -> Self {
        Self {
            id,
            deque: Some(deque),
            shared,
            handle: None,
        }
    }

    /// Start the worker thread
    pub(crate) fn start(&mut self, name_prefix: &str) -> Result<(), PoolError> {
        let Some(deque) = self.deque.take() else {
            return Ok(());
        };
        let id = self.id;
        let shared = self.shared.clone();

        let handle = thread::Builder::new()
            .name(format!("{}-{}", name_prefix, id))
            .spawn(move || Worker::run_loop(id, deque, shared))?;

        self.handle = Some(handle);
        Ok(())
    }

    /// Wait for the worker thread to exit. The pool's shutdown flag must be
    /// set first. A worker never joins itself.
    pub(crate) fn join(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        if handle.thread().id() == thread::current().id() {
            return;
        }
        if handle.join().is_err() {
            tracing::error!(worker = self.id, "Worker thread panicked");
        }
    }

    fn run_loop(id: usize, deque: WorkerDeque, shared: Arc<Shared>) {
        let pool = Arc::as_ptr(&shared) as usize;
        LOCAL.with(|local| *local.borrow_mut() = Some(LocalQueue { pool, deque }));

        loop {
            if shared.is_shutdown() {
                break;
            }

            // Borrow released before running: the task may submit more work.
            let task = LOCAL.with(|local| {
                local
                    .borrow()
                    .as_ref()
                    .and_then(|queue| queue.deque.find_work())
            });

            match task {
                Some(task) => shared.run(task),
                None => shared.park(|| {
                    LOCAL.with(|local| {
                        local
                            .borrow()
                            .as_ref()
                            .is_some_and(|queue| queue.deque.has_visible_work())
                    })
                }),
            }
        }

        // Tasks still queued locally are dropped with the deque.
        LOCAL.with(|local| local.borrow_mut().take());
        tracing::trace!(worker = id, "Worker shutting down");
    }
}
