//! Error types for scheduler operations.

use std::time::Duration;

use thiserror::Error;

/// Errors produced by the dispatcher and task launcher.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Task description rejected before anything was spawned.
    #[error("invalid task: {0}")]
    InvalidTask(String),
    /// Job configuration is unusable.
    #[error("invalid job config: {0}")]
    Config(String),
    /// The worker recorded a failure in its error artifact.
    #[error("{0}")]
    WorkerFailed(String),
    /// Subprocess exited unsuccessfully without an error artifact.
    #[error("{command}\nexit code: {}", code.map_or_else(|| "signal".to_string(), |c| c.to_string()))]
    NonZeroExit {
        /// Rendered command line.
        command: String,
        /// Exit code, `None` when terminated by a signal.
        code: Option<i32>,
    },
    /// Subprocess did not finish within the allotted time.
    #[error("task timed out after {0:?}")]
    Timeout(Duration),
    /// Output checker rejected the task log.
    #[error("output validation failed: {0}")]
    Validation(anyhow::Error),
    /// Admission gate dropped before the task was admitted.
    #[error("admission gate closed")]
    GateClosed,
    /// Filesystem or process I/O failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// Task artifact could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;
