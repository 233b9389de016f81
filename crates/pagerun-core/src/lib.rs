//! pagerun Core Domain Types
//!
//! This crate contains pure domain types with no dependencies on:
//! - A browser or automation provider
//! - The decision model
//! - Runtime specifics
//!
//! Everything here describes what a test task is, what an agent may do,
//! and what a finished attempt looks like.

pub mod action;
pub mod credentials;
pub mod error;
pub mod ids;
pub mod parse;
pub mod record;
pub mod result;
pub mod selection;
pub mod summary;
pub mod task;
pub mod verdict;

// Re-export commonly used types
pub use action::{
    normalize_url, ActionCommand, HistoryDirection, Point, ScrollDirection, SelectBy, Target,
    TerminateStatus,
};
pub use credentials::{Credentials, Secret, UnknownPlaceholder};
pub use error::CoreError;
pub use ids::{ObservationId, RunId, TaskId};
pub use parse::{parse_action, parse_response, parse_tool_call, ParseError};
pub use record::{ExecutionOutcome, ObservationRef, RoundRecord, ValidationOutcome};
pub use result::{RunRecorder, RunResult, TaskOutcome, Termination, CONSOLE_ERRORS_PER_OBSERVATION};
pub use selection::{unique_ids, TaskSelection};
pub use summary::{RunSummary, VerdictCounts};
pub use task::TaskDefinition;
pub use verdict::{TerminationReason, Verdict, VerdictSource};
