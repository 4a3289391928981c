//! Strand thread pool
//!
//! A fixed-size, work-stealing pool of worker threads implementing
//! [`strand_core::Backend`]. Each worker owns a FIFO deque; tasks submitted
//! from outside the pool go through a shared injector, and idle workers steal
//! from each other.

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

mod config;
mod deque;
mod pool;
mod worker;

pub use config::PoolConfig;
pub use pool::{FailureHandler, PoolStats, ThreadPool};

/// Thread pool errors
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    /// The OS refused to start a worker thread
    #[error("Failed to spawn worker thread: {0}")]
    SpawnFailed(#[from] std::io::Error),
}
