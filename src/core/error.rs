//! Error types for scheduler operations.

use thiserror::Error;

use crate::util::clock::Deadline;

/// Errors produced by scheduler components.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Task window does not end after it starts.
    #[error("improper window: {start} is not before {finish}")]
    ImproperWindow {
        /// Requested earliest start.
        start: Deadline,
        /// Requested latest finish.
        finish: Deadline,
    },
    /// Background load factor outside `(0, 1]`.
    #[error("invalid load factor: {0}")]
    InvalidLoadFactor(f64),
    /// Configuration rejected by validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// The runner has been shut down.
    #[error("runner has been shut down")]
    Shutdown,
    /// Unexpected internal failure with context.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Failure attached to a task that was force-finished.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaskError {
    /// Latest finish deadline passed before the task finished.
    #[error("task did not finish before its deadline")]
    Timeout,
    /// Task used more time than estimated and is not allowed to overrun.
    #[error("task exceeded its time estimate")]
    Overrun,
    /// The task's step returned an error.
    #[error("step failed: {0}")]
    StepFailed(String),
    /// The task's step panicked.
    #[error("step panicked: {0}")]
    Panicked(String),
    /// A callback refused the task's start.
    #[error("aborted by callback")]
    Aborted,
    /// Dropped during cleanup to admit other work.
    #[error("dropped to make room for other tasks")]
    Dropped,
    /// Cancelled by the submitter.
    #[error("cancelled")]
    Cancelled,
}

/// Error returned from a task callback.
#[derive(Debug, Error)]
pub enum CallbackError {
    /// Withdraw the task. Honored on START events.
    #[error("abort requested")]
    Abort,
    /// Callback failed; logged and otherwise ignored.
    #[error("callback failed: {0}")]
    Failed(String),
}

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;
