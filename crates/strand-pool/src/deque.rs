//! Work-stealing deque for a single pool worker

use crossbeam_deque::{Injector, Steal, Stealer, Worker};
use std::sync::Arc;
use strand_core::Task;

/// Work-stealing deque for a single worker
pub(crate) struct WorkerDeque {
    /// Local deque (FIFO, so a worker's own submissions keep their order)
    worker: Worker<Task>,

    /// Stealer handles for other workers
    stealers: Vec<Stealer<Task>>,

    /// Global injector for tasks submitted from outside the pool
    injector: Arc<Injector<Task>>,
}

impl WorkerDeque {
    pub(crate) fn new(
        worker: Worker<Task>,
        stealers: Vec<Stealer<Task>>,
        injector: Arc<Injector<Task>>,
    ) -> Self {
        Self {
            worker,
            stealers,
            injector,
        }
    }

    /// Push a task to the local deque
    pub(crate) fn push(&self, task: Task) {
        self.worker.push(task);
    }

    /// Try to get work: local pop, then the injector, then steal
    pub(crate) fn find_work(&self) -> Option<Task> {
        if let Some(task) = self.worker.pop() {
            return Some(task);
        }

        loop {
            match self.injector.steal_batch_and_pop(&self.worker) {
                Steal::Success(task) => return Some(task),
                Steal::Retry => continue,
                Steal::Empty => {}
            }

            match self.steal_from_others() {
                Steal::Success(task) => return Some(task),
                Steal::Retry => continue,
                Steal::Empty => return None,
            }
        }
    }

    /// Steal from other workers, starting at a random victim to spread contention
    fn steal_from_others(&self) -> Steal<Task> {
        use rand::Rng;

        if self.stealers.is_empty() {
            return Steal::Empty;
        }

        let start = rand::thread_rng().gen_range(0..self.stealers.len());
        let mut retry = false;
        for i in 0..self.stealers.len() {
            let stealer = &self.stealers[(start + i) % self.stealers.len()];
            match stealer.steal() {
                Steal::Success(task) => return Steal::Success(task),
                Steal::Retry => retry = true,
                Steal::Empty => {}
            }
        }

        if retry {
            Steal::Retry
        } else {
            Steal::Empty
        }
    }

    /// Whether any queue this worker can take from looks non-empty
    pub(crate) fn has_visible_work(&self) -> bool {
        !self.worker.is_empty()
            || !self.injector.is_empty()
            || self.stealers.iter().any(|s| !s.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    fn numbered(log: &Arc<Mutex<Vec<u32>>>, id: u32) -> Task {
        let log = log.clone();
        Task::new(move || log.lock().push(id))
    }

    fn make_deques(count: usize) -> (Vec<WorkerDeque>, Arc<Injector<Task>>) {
        let injector = Arc::new(Injector::new());
        let workers: Vec<Worker<Task>> = (0..count).map(|_| Worker::new_fifo()).collect();
        let stealers: Vec<Stealer<Task>> = workers.iter().map(|w| w.stealer()).collect();

        let deques = workers
            .into_iter()
            .enumerate()
            .map(|(id, worker)| {
                let others = stealers
                    .iter()
                    .enumerate()
                    .filter(|(i, _)| *i != id)
                    .map(|(_, s)| s.clone())
                    .collect();
                WorkerDeque::new(worker, others, injector.clone())
            })
            .collect();
        (deques, injector)
    }

    #[test]
    fn test_local_fifo_order() {
        let (deques, _) = make_deques(1);
        let log = Arc::new(Mutex::new(Vec::new()));
        for i in 0..3 {
            deques[0].push(numbered(&log, i));
        }
        while let Some(task) = deques[0].find_work() {
            task.run();
        }
        assert_eq!(*log.lock(), vec![0, 1, 2]);
    }

    #[test]
    fn test_takes_from_injector() {
        let (deques, injector) = make_deques(1);
        let log = Arc::new(Mutex::new(Vec::new()));
        injector.push(numbered(&log, 7));

        assert!(deques[0].has_visible_work());
        deques[0].find_work().unwrap().run();
        assert_eq!(*log.lock(), vec![7]);
        assert!(!deques[0].has_visible_work());
        assert!(deques[0].find_work().is_none());
    }

    #[test]
    fn test_steals_from_other_worker() {
        let (deques, _) = make_deques(2);
        let log = Arc::new(Mutex::new(Vec::new()));
        deques[0].push(numbered(&log, 1));

        assert!(deques[1].has_visible_work());
        deques[1].find_work().unwrap().run();
        assert_eq!(*log.lock(), vec![1]);
        assert!(deques[0].find_work().is_none());
    }
}
