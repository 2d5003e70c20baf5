//! Error types for MigCopy
//!
//! Defines the failure taxonomy for the offload core: configuration
//! errors are rejected synchronously, resource shortfalls degrade to the
//! default copy path, and only worker-level copy faults surface as a
//! retryable batch failure.

use thiserror::Error;

/// Main error type for MigCopy operations
#[derive(Error, Debug)]
pub enum MigCopyError {
    /// Invalid control-surface or tunable input
    #[error("Configuration error: {0}")]
    Config(String),

    /// A migrator descriptor that cannot be installed (e.g. empty name)
    #[error("Invalid migrator descriptor: {0}")]
    InvalidDescriptor(String),

    /// Source and destination blocks of a unit differ in length
    #[error("Mismatched copy unit: destination is {dst_len} bytes, source is {src_len} bytes")]
    MismatchedUnit {
        dst_len: usize,
        src_len: usize,
    },

    /// One or more worker tasks hit an uncorrectable copy fault; the
    /// batch must be treated as not copied and may be retried via the
    /// default path
    #[error("Batch copy incomplete: {failed_tasks} worker task(s) failed")]
    CopyIncomplete {
        failed_tasks: usize,
    },

    /// Worker pool construction failed
    #[error("Thread pool error: {0}")]
    ThreadPool(String),
}

impl MigCopyError {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Check if the caller may re-attempt the whole batch via the
    /// default copy path
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::CopyIncomplete { .. })
    }
}

/// Result type alias for MigCopy operations
pub type Result<T> = std::result::Result<T, MigCopyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        let retryable = MigCopyError::CopyIncomplete { failed_tasks: 2 };
        assert!(retryable.is_retryable());

        let config = MigCopyError::config("worker_count must be at least 1");
        assert!(!config.is_retryable());

        let descriptor = MigCopyError::InvalidDescriptor("empty name".into());
        assert!(!descriptor.is_retryable());
    }

    #[test]
    fn test_error_display() {
        let err = MigCopyError::MismatchedUnit {
            dst_len: 4096,
            src_len: 2048,
        };
        let message = err.to_string();
        assert!(message.contains("4096"));
        assert!(message.contains("2048"));
    }
}
