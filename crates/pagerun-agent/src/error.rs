//! Agent loop errors.

use crate::decision::DecisionError;
use crate::provider::ProviderError;
use pagerun_core::{TerminationReason, Verdict};
use std::time::Duration;
use thiserror::Error;

/// Errors raised while running one attempt.
///
/// Round-local errors (`ValidationMismatch`, a bounded number of
/// `Decision` failures, `Execution`) are absorbed by the round controller.
/// The rest end the attempt; [`AgentError::termination`] maps them to a
/// verdict.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("Observation failed: {0}")]
    Observation(#[source] ProviderError),

    #[error("Decision failed: {0}")]
    Decision(#[from] DecisionError),

    #[error("Target validation failed: {0}")]
    ValidationMismatch(String),

    #[error("Action failed: {0}")]
    Execution(String),

    #[error("Attempt exceeded its {0:?} time budget")]
    TimeoutExceeded(Duration),

    #[error("Attempt used all {0} rounds")]
    MaxRoundsExceeded(u32),

    #[error("Credential error: {0}")]
    Credential(String),

    #[error("Session error: {0}")]
    Session(#[source] ProviderError),

    #[error("Attempt cancelled")]
    Cancelled,
}

impl AgentError {
    /// Verdict and reason for an attempt ended by this error.
    pub fn termination(&self) -> (Verdict, TerminationReason) {
        match self {
            Self::TimeoutExceeded(_) => (Verdict::Timeout, TerminationReason::Timeout),
            Self::MaxRoundsExceeded(_) => (Verdict::Fail, TerminationReason::MaxRoundsExceeded),
            Self::Cancelled => (Verdict::Error, TerminationReason::Cancelled),
            Self::Observation(_)
            | Self::Decision(_)
            | Self::ValidationMismatch(_)
            | Self::Execution(_)
            | Self::Credential(_)
            | Self::Session(_) => (Verdict::Error, TerminationReason::FatalError),
        }
    }

    /// Interruptions come from outside the attempt rather than from the page.
    pub fn is_interrupt(&self) -> bool {
        matches!(self, Self::TimeoutExceeded(_) | Self::Cancelled)
    }
}
