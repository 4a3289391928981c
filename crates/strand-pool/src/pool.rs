//! Fixed-size work-stealing thread pool

use crate::config::PoolConfig;
use crate::deque::WorkerDeque;
use crate::worker::{self, Worker};
use crate::PoolError;
use crossbeam_deque::{Injector, Steal, Stealer, Worker as CWorker};
use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use strand_core::{Backend, Task, TaskFailure};

/// Upper bound on how long an idle worker sleeps before rechecking for work
const IDLE_PARK: Duration = Duration::from_millis(10);

/// Callback receiving task failures instead of the default log line
pub type FailureHandler = Arc<dyn Fn(&TaskFailure) + Send + Sync>;

/// Pool statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Tasks accepted by `submit`
    pub submitted: u64,

    /// Tasks that ran to completion
    pub completed: u64,

    /// Tasks that panicked
    pub failed: u64,
}

impl PoolStats {
    /// Tasks accepted but not yet finished
    pub fn pending(&self) -> u64 {
        self.submitted - self.completed - self.failed
    }
}

/// State shared between the pool handle and its worker threads
pub(crate) struct Shared {
    /// Tasks submitted from outside the pool
    injector: Arc<Injector<Task>>,

    shutdown: AtomicBool,

    /// Idle workers wait here
    idle: Mutex<()>,
    wakeup: Condvar,

    submitted: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,

    failure_handler: Option<FailureHandler>,
}

impl Shared {
    pub(crate) fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    fn submit(self: &Arc<Self>, task: Task) {
        if self.is_shutdown() {
            tracing::warn!("Task submitted to a pool that has shut down; dropping it");
            return;
        }

        self.submitted.fetch_add(1, Ordering::AcqRel);
        if let Err(task) = worker::push_local(self, task) {
            self.injector.push(task);
        }

        // Taking the lock orders this wakeup after a parking worker's recheck.
        let _guard = self.idle.lock();
        self.wakeup.notify_one();
    }

    /// Run a task on the current worker thread
    pub(crate) fn run(&self, task: Task) {
        match task.try_run() {
            Ok(()) => {
                self.completed.fetch_add(1, Ordering::AcqRel);
            }
            Err(failure) => {
                self.failed.fetch_add(1, Ordering::AcqRel);
                self.report(failure);
            }
        }
    }

    /// Sleep until woken or `IDLE_PARK` elapses, unless `has_work` sees work
    pub(crate) fn park(&self, has_work: impl FnOnce() -> bool) {
        let mut guard = self.idle.lock();
        if self.is_shutdown() || has_work() {
            return;
        }
        self.wakeup.wait_for(&mut guard, IDLE_PARK);
    }

    fn report(&self, failure: TaskFailure) {
        match &self.failure_handler {
            Some(handler) => handler(&failure),
            None => tracing::error!(error = %failure, "Task failed on thread pool"),
        }
    }

    fn stats(&self) -> PoolStats {
        // Finished counters first so `pending` never underflows.
        let completed = self.completed.load(Ordering::Acquire);
        let failed = self.failed.load(Ordering::Acquire);
        let submitted = self.submitted.load(Ordering::Acquire);
        PoolStats {
            submitted,
            completed,
            failed,
        }
    }
}

/// Thread pool backend
///
/// Tasks submitted from one of the pool's own threads go to that thread's
/// local deque; idle workers steal them. Panicking tasks are caught and
/// passed to the failure handler, or logged when none is set.
pub struct ThreadPool {
    shared: Arc<Shared>,
    workers: Mutex<Vec<Worker>>,
    worker_count: usize,
}

impl ThreadPool {
    /// Start a pool from `config`
    pub fn new(config: &PoolConfig) -> Result<Self, PoolError> {
        Self::build(config, None)
    }

    /// Start a pool with `workers` threads (0 = number of CPU cores)
    pub fn with_workers(workers: usize) -> Result<Self, PoolError> {
        Self::new(&PoolConfig::with_workers(workers))
    }

    /// Start a pool that sends task failures to `handler`
    pub fn with_failure_handler<F>(config: &PoolConfig, handler: F) -> Result<Self, PoolError>
    where
        F: Fn(&TaskFailure) + Send + Sync + 'static,
    {
        Self::build(config, Some(Arc::new(handler)))
    }

    fn build(config: &PoolConfig, failure_handler: Option<FailureHandler>) -> Result<Self, PoolError> {
        let worker_count = config.resolved_workers();
        let shared = Arc::new(Shared {
            injector: Arc::new(Injector::new()),
            shutdown: AtomicBool::new(false),
            idle: Mutex::new(()),
            wakeup: Condvar::new(),
            submitted: AtomicU64::new(0),
            completed: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            failure_handler,
        });

        let deques: Vec<CWorker<Task>> = (0..worker_count).map(|_| CWorker::new_fifo()).collect();
        let stealers: Vec<Stealer<Task>> = deques.iter().map(|d| d.stealer()).collect();

        let workers = deques
            .into_iter()
            .enumerate()
            .map(|(id, deque)| {
                // Stealers from other workers (exclude self)
                let others = stealers
                    .iter()
                    .enumerate()
                    .filter(|(i, _)| *i != id)
                    .map(|(_, s)| s.clone())
                    .collect();
                let deque = WorkerDeque::new(deque, others, shared.injector.clone());
                Worker::new(id, deque, shared.clone())
            })
            .collect();

        // Dropping the pool on a failed start stops the workers already running.
        let pool = Self {
            shared,
            workers: Mutex::new(workers),
            worker_count,
        };
        let started = pool
            .workers
            .lock()
            .iter_mut()
            .try_for_each(|worker| worker.start(&config.thread_name));
        started?;

        tracing::debug!(workers = worker_count, "Thread pool started");
        Ok(pool)
    }

    /// Number of worker threads
    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    /// Current counters
    pub fn stats(&self) -> PoolStats {
        self.shared.stats()
    }

    /// Wait until every accepted task has finished. Returns false on timeout.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let start = Instant::now();
        loop {
            if self.stats().pending() == 0 {
                return true;
            }
            if start.elapsed() > timeout {
                return false;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    /// Whether the pool has been shut down
    pub fn is_shutdown(&self) -> bool {
        self.shared.is_shutdown()
    }

    /// Stop all workers. Queued tasks that have not started are dropped.
    /// Idempotent; called on drop.
    pub fn shutdown(&self) {
        if self.shared.shutdown.swap(true, Ordering::AcqRel) {
            return;
        }

        {
            let _guard = self.shared.idle.lock();
            self.shared.wakeup.notify_all();
        }

        let mut workers = std::mem::take(&mut *self.workers.lock());
        for worker in &mut workers {
            worker.join();
        }
        while !matches!(self.shared.injector.steal(), Steal::Empty) {}
        tracing::debug!("Thread pool shut down");
    }
}

impl Backend for ThreadPool {
    fn submit(&self, task: Task) {
        self.shared.submit(task);
    }

    fn report_failure(&self, failure: TaskFailure) {
        self.shared.report(failure);
    }
}

impl Default for ThreadPool {
    /// A pool with one worker per CPU core
    ///
    /// Panics if a worker thread cannot be spawned.
    fn default() -> Self {
        match Self::new(&PoolConfig::default()) {
            Ok(pool) => pool,
            Err(e) => panic!("Failed to start thread pool: {}", e),
        }
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl fmt::Debug for ThreadPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadPool")
            .field("worker_count", &self.worker_count)
            .field("stats", &self.stats())
            .finish()
    }
}
