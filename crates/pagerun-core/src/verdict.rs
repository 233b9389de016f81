//! Verdicts and termination reasons.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Final classification of one attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    /// All pass criteria held and no fail criterion fired.
    Pass,
    /// The task was not completed, or a fail criterion fired.
    Fail,
    /// The attempt could not be carried out.
    Error,
    /// The attempt ran out of wall-clock time.
    Timeout,
    /// The task was not run.
    Skipped,
}

impl Verdict {
    /// All verdicts, in reporting order.
    pub const ALL: [Verdict; 5] = [
        Verdict::Pass,
        Verdict::Fail,
        Verdict::Error,
        Verdict::Timeout,
        Verdict::Skipped,
    ];

    /// Returns true if the verdict ends retrying.
    pub fn is_pass(&self) -> bool {
        matches!(self, Self::Pass)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pass => "PASS",
            Self::Fail => "FAIL",
            Self::Error => "ERROR",
            Self::Timeout => "TIMEOUT",
            Self::Skipped => "SKIPPED",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why an attempt reached `TERMINATED`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    /// The evaluator found enough evidence on its own.
    CriteriaMet,
    /// The model issued `terminate`.
    ModelTerminate,
    /// The round budget ran out.
    MaxRoundsExceeded,
    /// The wall-clock budget ran out.
    Timeout,
    /// Observation, credentials, session or repeated decision failures.
    FatalError,
    /// The agent kept acting on the same spot.
    LoopDetected,
    /// The run was aborted by the user.
    Cancelled,
    /// The task was never started.
    Skipped,
}

impl TerminationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CriteriaMet => "criteria_met",
            Self::ModelTerminate => "model_terminate",
            Self::MaxRoundsExceeded => "max_rounds_exceeded",
            Self::Timeout => "timeout",
            Self::FatalError => "fatal_error",
            Self::LoopDetected => "loop_detected",
            Self::Cancelled => "cancelled",
            Self::Skipped => "skipped",
        }
    }
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who decided the verdict, kept for audit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerdictSource {
    /// Derived from the pass and fail criteria.
    Criteria,
    /// Taken from a `terminate` action because the criteria were indeterminate.
    ModelAsserted,
    /// Imposed by the runtime (budgets, errors, cancellation, skip).
    #[default]
    Runtime,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verdict_wire_format() {
        assert_eq!(serde_json::to_string(&Verdict::Timeout).unwrap(), "\"TIMEOUT\"");
        let parsed: Verdict = serde_json::from_str("\"SKIPPED\"").unwrap();
        assert_eq!(parsed, Verdict::Skipped);
    }

    #[test]
    fn test_reason_display_matches_serde() {
        for reason in [
            TerminationReason::CriteriaMet,
            TerminationReason::MaxRoundsExceeded,
            TerminationReason::LoopDetected,
        ] {
            let json = serde_json::to_string(&reason).unwrap();
            assert_eq!(json, format!("\"{}\"", reason));
        }
    }
}
