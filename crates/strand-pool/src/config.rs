//! Thread pool configuration

use serde::{Deserialize, Serialize};

/// Settings for a [`ThreadPool`](crate::ThreadPool)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Number of worker threads (0 = number of CPU cores)
    pub workers: usize,

    /// Prefix for worker thread names; threads are named `<prefix>-<index>`
    pub thread_name: String,
}

impl PoolConfig {
    /// Config with an explicit worker count
    pub fn with_workers(workers: usize) -> Self {
        Self {
            workers,
            ..Self::default()
        }
    }

    /// Worker count after applying the CPU-count default
    pub fn resolved_workers(&self) -> usize {
        if self.workers == 0 {
            num_cpus::get()
        } else {
            self.workers
        }
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            workers: 0,
            thread_name: "strand-worker".to_string(),
        }
    }
}
