//! Strand execution contexts
//!
//! This crate provides two decorators that sit in front of any task-running
//! [`Backend`] (a thread pool, an event loop, the calling thread):
//! - [`BatchingExecutor`]: batchable tasks submitted from inside a running
//!   batch run inline on the same thread, after the current task, with a
//!   [`blocking`] handoff so queued work never waits on a blocked thread
//! - [`SerializedContext`]: a FIFO queue executed strictly one task at a time,
//!   at most `throughput` tasks per backend submission, suspendable and
//!   resumable without losing queued work
//!
//! Both decorators implement [`Backend`] themselves, so they can be stacked.

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod backend;
pub mod batching;
pub mod config;
pub mod error;
pub mod serialized;
pub mod task;

pub use backend::{Backend, InlineBackend, ManualBackend};
pub use batching::{blocking, BatchingExecutor};
pub use config::{ContextConfig, DEFAULT_THROUGHPUT};
pub use error::{DispatchError, TaskFailure};
pub use serialized::SerializedContext;
pub use task::{Job, Task};
