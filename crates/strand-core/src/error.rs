//! Error types for execution contexts and task failures

use std::any::Any;

/// Errors raised when an execution context is misconfigured
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    /// Throughput must allow at least one task per sweep
    #[error("Invalid throughput: {0} (must be at least 1)")]
    InvalidThroughput(usize),
}

/// A task body that panicked while being run by a decorator or backend
///
/// Failures are never propagated to the submitter. They are handed to the
/// backend's failure sink via [`Backend::report_failure`](crate::Backend::report_failure).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Task panicked: {message}")]
pub struct TaskFailure {
    message: String,
}

impl TaskFailure {
    /// Create a failure with an explicit message
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Build a failure from a payload returned by `catch_unwind`
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "Unknown panic".to_string()
        };
        Self { message }
    }

    /// The panic message
    pub fn message(&self) -> &str {
        &self.message
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_str_panic() {
        let payload = std::panic::catch_unwind(|| panic!("boom")).unwrap_err();
        let failure = TaskFailure::from_panic(payload);
        assert_eq!(failure.message(), "boom");
        assert_eq!(failure.to_string(), "Task panicked: boom");
    }

    #[test]
    fn test_from_formatted_panic() {
        let n = 7;
        let payload = std::panic::catch_unwind(|| panic!("task {} failed", n)).unwrap_err();
        assert_eq!(TaskFailure::from_panic(payload).message(), "task 7 failed");
    }

    #[test]
    fn test_from_opaque_panic() {
        let payload = std::panic::catch_unwind(|| std::panic::panic_any(42u32)).unwrap_err();
        assert_eq!(TaskFailure::from_panic(payload).message(), "Unknown panic");
    }

    #[test]
    fn test_invalid_throughput_display() {
        assert_eq!(
            DispatchError::InvalidThroughput(0).to_string(),
            "Invalid throughput: 0 (must be at least 1)"
        );
    }
}
