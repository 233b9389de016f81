//! Runner errors.

use pagerun_core::{CoreError, TaskId};
use thiserror::Error;

/// Errors raised while scheduling a run or reporting it.
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("Invalid runner configuration: {0}")]
    InvalidConfig(String),

    #[error("Task selection failed: {0}")]
    Selection(#[from] CoreError),

    #[error("Outcome for task '{0}' was already recorded")]
    DuplicateOutcome(TaskId),

    #[error("Outcome for task '{0}' does not belong to this run")]
    UnknownTask(TaskId),

    #[error("Report sink failed: {0}")]
    Sink(String),
}
