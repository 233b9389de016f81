//! Decision service contract.

use crate::provider::Observation;
use async_trait::async_trait;
use pagerun_core::{parse_response, ActionCommand, TaskId};
use std::sync::Arc;
use thiserror::Error;

/// Errors from the decision service.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecisionError {
    /// The model answered, but not with a usable action.
    #[error("Malformed decision: {reason}")]
    Malformed { reason: String, raw_response: String },

    /// The service could not be reached or returned an error.
    #[error("Decision service unavailable: {0}")]
    Unavailable(String),
}

impl DecisionError {
    pub fn raw_response(&self) -> Option<&str> {
        match self {
            Self::Malformed { raw_response, .. } => Some(raw_response),
            Self::Unavailable(_) => None,
        }
    }
}

/// Everything the model sees for one decision.
///
/// Credential values never appear here, only their placeholder names.
#[derive(Debug, Clone)]
pub struct DecisionRequest {
    pub task_id: TaskId,
    pub objective: String,
    pub steps: Vec<String>,
    pub pass_criteria: Vec<String>,
    pub fail_criteria: Vec<String>,
    pub notes: Option<String>,
    /// Names usable as `{{name}}` in typed text.
    pub credential_names: Vec<String>,
    pub facts: Vec<String>,
    /// Summaries of the most recent rounds, oldest first.
    pub history: Vec<String>,
    /// Loop warnings and validation mismatches to act on.
    pub warnings: Vec<String>,
    /// 1-based index of the round being decided.
    pub round: u32,
    pub max_rounds: u32,
    pub observation: Arc<Observation>,
}

impl DecisionRequest {
    pub fn rounds_left(&self) -> u32 {
        self.max_rounds.saturating_sub(self.round)
    }

    /// Compact description stored on the round record.
    pub fn summary(&self) -> String {
        format!(
            "round {}/{}; {} step(s), {} pass / {} fail criteria, {} history, {} fact(s), {} warning(s); observation {}",
            self.round,
            self.max_rounds,
            self.steps.len(),
            self.pass_criteria.len(),
            self.fail_criteria.len(),
            self.history.len(),
            self.facts.len(),
            self.warnings.len(),
            self.observation.id
        )
    }
}

/// One decided action.
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub command: ActionCommand,
    pub raw_response: String,
    /// Model's reasoning, when it gave any.
    pub rationale: Option<String>,
}

impl Decision {
    pub fn new(command: ActionCommand, raw_response: impl Into<String>) -> Self {
        Self {
            command,
            raw_response: raw_response.into(),
            rationale: None,
        }
    }

    /// Parse a raw tool-call response. Text before the tool call is kept as
    /// the rationale.
    pub fn from_response(raw: impl Into<String>) -> Result<Self, DecisionError> {
        let raw = raw.into();
        let command = parse_response(&raw).map_err(|e| DecisionError::Malformed {
            reason: e.to_string(),
            raw_response: raw.clone(),
        })?;
        let rationale = raw
            .split("<tool_call>")
            .next()
            .map(str::trim)
            .filter(|text| !text.is_empty() && !text.starts_with('{'))
            .map(str::to_string);
        Ok(Self {
            command,
            raw_response: raw,
            rationale,
        })
    }
}

/// Turns an observation plus task context into exactly one action.
#[async_trait]
pub trait DecisionService: Send + Sync {
    async fn decide(&self, request: &DecisionRequest) -> Result<Decision, DecisionError>;
}
