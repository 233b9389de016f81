//! Per-round audit records.

use crate::{ActionCommand, ObservationId, TerminateStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Where a round's observation can be found.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservationRef {
    pub id: ObservationId,
    pub url: String,
    pub title: String,
    /// Set when screenshots are persisted to disk.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screenshot_path: Option<PathBuf>,
    /// Browser console errors logged since the previous observation.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub console_errors: Vec<String>,
}

/// Result of the pre-flight check for one round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ValidationOutcome {
    /// The action has no target, or no action was decided.
    NotRequired,
    /// The target probed valid, possibly after healing.
    Valid {
        healing_attempts: u32,
        healed_by_reobserve: bool,
    },
    /// Healing ran out; the round was marked failed.
    Exhausted { healing_attempts: u32, reason: String },
}

impl ValidationOutcome {
    pub fn healing_attempts(&self) -> u32 {
        match self {
            Self::NotRequired => 0,
            Self::Valid {
                healing_attempts, ..
            }
            | Self::Exhausted {
                healing_attempts, ..
            } => *healing_attempts,
        }
    }

    pub fn is_exhausted(&self) -> bool {
        matches!(self, Self::Exhausted { .. })
    }
}

/// What happened when the round's action was dispatched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ExecutionOutcome {
    Succeeded {
        detail: String,
    },
    Failed {
        error: String,
    },
    /// No action ran: the decision failed, validation was exhausted, or
    /// the attempt was cut short.
    NotExecuted {
        reason: String,
    },
    /// The model called `terminate`.
    Terminated {
        status: TerminateStatus,
        reason: String,
    },
}

impl ExecutionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded { .. } | Self::Terminated { .. })
    }
}

/// One observe/decide/validate/execute cycle.
///
/// Appended exactly once per round; self-healing sub-steps are folded into
/// `validation` instead of producing extra records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundRecord {
    /// 1-based round index.
    pub round: u32,
    pub observation: ObservationRef,
    /// Short description of what was sent to the decision service.
    pub request_summary: String,
    /// Model output, verbatim; absent when the service was unreachable.
    #[serde(default)]
    pub raw_response: Option<String>,
    /// The last decided command, after healing.
    #[serde(default)]
    pub command: Option<ActionCommand>,
    pub validation: ValidationOutcome,
    pub execution: ExecutionOutcome,
    pub timestamp: DateTime<Utc>,
}

impl RoundRecord {
    /// One-line summary used in the decision history window.
    pub fn summary_line(&self) -> String {
        let action = self
            .command
            .as_ref()
            .map(ActionCommand::describe)
            .unwrap_or_else(|| "no action".to_string());
        let outcome = match &self.execution {
            ExecutionOutcome::Succeeded { detail } => format!("ok: {}", detail),
            ExecutionOutcome::Failed { error } => format!("failed: {}", error),
            ExecutionOutcome::NotExecuted { reason } => format!("skipped: {}", reason),
            ExecutionOutcome::Terminated { reason, .. } => format!("terminated: {}", reason),
        };
        format!("Round {}: {} [{}] ({})", self.round, action, self.observation.url, outcome)
    }
}
