//! Core domain errors.

use thiserror::Error;

/// Core domain errors for pagerun.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Two tasks in the active set share an identifier.
    #[error("Duplicate task id: {0}")]
    DuplicateTaskId(String),

    /// Task ids requested by the caller that no definition carries.
    #[error("Tasks not found: {0}")]
    TasksNotFound(String),

    /// A `{{name}}` placeholder has no matching credential.
    #[error("Missing credential '{name}' for task '{task_id}'")]
    MissingCredential { task_id: String, name: String },

    /// A task definition failed validation.
    #[error("Invalid task '{task_id}': {field} {reason}")]
    InvalidTask {
        task_id: String,
        field: &'static str,
        reason: String,
    },
}
