//! Integration tests for the batching executor on a real thread pool

mod common;

use common::{pool, wait_until, TIMEOUT};
use crossbeam::channel;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};
use std::time::Duration;
use strand_core::{blocking, BatchingExecutor, Task, TaskFailure};
use strand_pool::{PoolConfig, ThreadPool};

#[test]
fn test_nested_tasks_run_serially_on_root_thread() {
    const N: usize = 1000;
    let pool = pool(4);
    let executor = BatchingExecutor::new(pool.clone());

    let seen: Arc<Mutex<Vec<(usize, ThreadId)>>> = Arc::new(Mutex::new(Vec::new()));
    let in_flight = Arc::new(AtomicBool::new(false));
    let overlaps = Arc::new(AtomicUsize::new(0));
    let (done_tx, done_rx) = channel::bounded::<ThreadId>(1);

    let ran_early = Arc::new(AtomicBool::new(false));
    let root_thread: Arc<Mutex<Option<ThreadId>>> = Arc::new(Mutex::new(None));

    let exec = executor.clone();
    let (s, busy, overlap) = (seen.clone(), in_flight.clone(), overlaps.clone());
    let (early, root) = (ran_early.clone(), root_thread.clone());
    executor.execute(Task::batchable(move || {
        *root.lock() = Some(thread::current().id());
        for i in 0..N {
            let (s, busy, overlap) = (s.clone(), busy.clone(), overlap.clone());
            exec.execute(Task::batchable(move || {
                if busy.swap(true, Ordering::SeqCst) {
                    overlap.fetch_add(1, Ordering::SeqCst);
                }
                s.lock().push((i, thread::current().id()));
                busy.store(false, Ordering::SeqCst);
            }));
        }
        exec.execute(Task::batchable(move || {
            let _ = done_tx.send(thread::current().id());
        }));
        // Nothing submitted above may have run yet: this task still owns the thread.
        early.store(!s.lock().is_empty(), Ordering::SeqCst);
    }));

    let last_thread = done_rx.recv_timeout(TIMEOUT).expect("batch did not finish");
    assert!(!ran_early.load(Ordering::SeqCst));
    let root_thread = root_thread.lock().expect("root task did not run");
    assert_eq!(last_thread, root_thread);
    let seen = seen.lock();
    assert_eq!(seen.len(), N);
    assert_eq!(overlaps.load(Ordering::SeqCst), 0);
    for (expected, (i, thread)) in seen.iter().enumerate() {
        assert_eq!(*i, expected);
        assert_eq!(*thread, root_thread);
    }

    // Only the root batch reached the pool.
    assert!(pool.wait_idle(TIMEOUT));
    assert_eq!(pool.stats().submitted, 1);
}

#[test]
fn test_blocking_task_does_not_starve_its_batch() {
    const SIBLINGS: usize = 5;
    let pool = pool(2);
    let executor = BatchingExecutor::new(pool.clone());

    let (signal_tx, signal_rx) = channel::bounded::<()>(1);
    let (result_tx, result_rx) = channel::bounded::<(bool, usize)>(1);
    let sibling_runs = Arc::new(AtomicUsize::new(0));
    let blocker_thread = Arc::new(Mutex::new(None));
    let sibling_threads = Arc::new(Mutex::new(Vec::new()));

    let exec = executor.clone();
    let (runs, bt, st) = (sibling_runs.clone(), blocker_thread.clone(), sibling_threads.clone());
    executor.execute(Task::batchable(move || {
        let blocker_runs = runs.clone();
        let blocker = bt.clone();
        exec.execute(Task::batchable(move || {
            *blocker.lock() = Some(thread::current().id());
            // Unblocked by the last sibling, which is queued behind us.
            let unblocked = blocking(|| signal_rx.recv_timeout(TIMEOUT).is_ok());
            let _ = result_tx.send((unblocked, blocker_runs.load(Ordering::SeqCst)));
        }));

        for i in 0..SIBLINGS {
            let (runs, st) = (runs.clone(), st.clone());
            let signal = signal_tx.clone();
            exec.execute(Task::batchable(move || {
                st.lock().push(thread::current().id());
                runs.fetch_add(1, Ordering::SeqCst);
                if i == SIBLINGS - 1 {
                    let _ = signal.send(());
                }
            }));
        }
    }));

    let (unblocked, runs_seen) = result_rx.recv_timeout(TIMEOUT).expect("blocker never finished");
    assert!(unblocked);
    assert_eq!(runs_seen, SIBLINGS);

    let blocker = blocker_thread.lock().expect("blocker did not run");
    let siblings = sibling_threads.lock();
    assert_eq!(siblings.len(), SIBLINGS);
    assert!(siblings.iter().all(|t| *t != blocker));
    assert!(siblings.windows(2).all(|w| w[0] == w[1]));
}

#[test]
fn test_unsignalled_block_holds_up_batch() {
    let pool = pool(2);
    let executor = BatchingExecutor::new(pool.clone());

    let (signal_tx, signal_rx) = channel::bounded::<()>(1);
    let (result_tx, result_rx) = channel::bounded::<bool>(1);

    let exec = executor.clone();
    executor.execute(Task::batchable(move || {
        exec.execute(Task::batchable(move || {
            // Without `blocking` the sibling below stays queued on this thread.
            let unblocked = signal_rx.recv_timeout(Duration::from_millis(200)).is_ok();
            let _ = result_tx.send(unblocked);
        }));
        exec.execute(Task::batchable(move || {
            let _ = signal_tx.send(());
        }));
    }));

    assert_eq!(result_rx.recv_timeout(TIMEOUT), Ok(false));
    assert!(pool.wait_idle(TIMEOUT));
}

#[test]
fn test_plain_task_from_batch_reaches_pool() {
    let pool = pool(2);
    let executor = BatchingExecutor::new(pool.clone());
    let ran = Arc::new(AtomicUsize::new(0));

    let exec = executor.clone();
    let r = ran.clone();
    executor.execute(Task::batchable(move || {
        for _ in 0..10 {
            let r = r.clone();
            exec.execute(Task::new(move || {
                r.fetch_add(1, Ordering::SeqCst);
            }));
        }
    }));

    assert!(wait_until(TIMEOUT, || ran.load(Ordering::SeqCst) == 10));
    assert!(pool.wait_idle(TIMEOUT));
    assert_eq!(pool.stats().submitted, 11);
}

#[test]
fn test_failing_task_reported_to_pool() {
    let failures = Arc::new(Mutex::new(Vec::new()));
    let f = failures.clone();
    let pool = Arc::new(
        ThreadPool::with_failure_handler(&PoolConfig::with_workers(1), move |failure| {
            f.lock().push(failure.clone())
        })
        .expect("Failed to start pool"),
    );
    let executor = BatchingExecutor::new(pool.clone());
    let after = Arc::new(AtomicBool::new(false));

    let exec = executor.clone();
    let a = after.clone();
    executor.execute(Task::batchable(move || {
        exec.execute(Task::batchable(|| panic!("batched panic")));
        exec.execute(Task::batchable(move || a.store(true, Ordering::SeqCst)));
    }));

    assert!(pool.wait_idle(TIMEOUT));
    assert!(after.load(Ordering::SeqCst));
    assert_eq!(*failures.lock(), vec![TaskFailure::new("batched panic")]);
    // Caught inside the batch runner, which itself completed normally.
    assert_eq!(pool.stats().failed, 0);
}
