//! Shared helpers for integration tests

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use strand_core::{Backend, Task, TaskFailure};
use strand_pool::ThreadPool;

pub const TIMEOUT: Duration = Duration::from_secs(10);

/// Backend wrapper that counts submissions before forwarding them
pub struct CountingBackend {
    inner: Arc<dyn Backend>,
    submissions: AtomicUsize,
}

impl CountingBackend {
    pub fn new(inner: Arc<dyn Backend>) -> Self {
        Self {
            inner,
            submissions: AtomicUsize::new(0),
        }
    }

    pub fn submissions(&self) -> usize {
        self.submissions.load(Ordering::SeqCst)
    }
}

impl Backend for CountingBackend {
    fn submit(&self, task: Task) {
        self.submissions.fetch_add(1, Ordering::SeqCst);
        self.inner.submit(task);
    }

    fn report_failure(&self, failure: TaskFailure) {
        self.inner.report_failure(failure);
    }
}

pub fn pool(workers: usize) -> Arc<ThreadPool> {
    Arc::new(ThreadPool::with_workers(workers).expect("Failed to start pool"))
}

/// Poll `condition` until it holds or `timeout` elapses
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    loop {
        if condition() {
            return true;
        }
        if start.elapsed() > timeout {
            return false;
        }
        thread::sleep(Duration::from_millis(1));
    }
}
