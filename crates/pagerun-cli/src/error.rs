//! CLI errors.

use pagerun_core::CoreError;
use pagerun_runner::RunnerError;
use pagerun_vlm::VlmError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("No task files found in {0}")]
    NoTasks(PathBuf),

    #[error("Invalid task in {path}: {source}")]
    Task {
        path: PathBuf,
        #[source]
        source: CoreError,
    },

    #[error(transparent)]
    Selection(#[from] CoreError),

    #[error(transparent)]
    Runner(#[from] RunnerError),

    #[error(transparent)]
    Model(#[from] VlmError),
}

impl CliError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn json(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        Self::Json {
            path: path.into(),
            source,
        }
    }
}
