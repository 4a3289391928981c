//! Configuration for serialized execution contexts

use crate::error::DispatchError;
use serde::{Deserialize, Serialize};

/// Default number of tasks a sweep runs before yielding its thread
pub const DEFAULT_THROUGHPUT: usize = 5;

/// Settings for a [`SerializedContext`](crate::SerializedContext)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    /// Maximum tasks executed per backend submission
    pub throughput: usize,
}

impl ContextConfig {
    /// Config with the given throughput
    pub fn with_throughput(throughput: usize) -> Self {
        Self { throughput }
    }

    /// Reject settings that cannot make progress
    pub fn validate(&self) -> Result<(), DispatchError> {
        if self.throughput == 0 {
            return Err(DispatchError::InvalidThroughput(self.throughput));
        }
        Ok(())
    }
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            throughput: DEFAULT_THROUGHPUT,
        }
    }
}
