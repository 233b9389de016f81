//! Test task definitions.

use crate::credentials::{placeholders, Credentials};
use crate::{CoreError, TaskId};
use serde::{Deserialize, Deserializer, Serialize};
use std::time::Duration;

/// Lowest (most urgent) priority value.
pub const PRIORITY_HIGHEST: u8 = 1;
/// Highest (least urgent) priority value.
pub const PRIORITY_LOWEST: u8 = 10;
const PRIORITY_DEFAULT: u8 = 5;

/// A natural-language end-to-end test, as supplied by the task author.
///
/// Definitions are immutable once handed to the scheduler; workers only
/// ever see them behind an `Arc`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskDefinition {
    /// Unique task identifier. Loaders fall back to the file stem when empty.
    #[serde(default)]
    pub id: TaskId,

    /// What the agent should achieve.
    #[serde(alias = "task")]
    pub objective: String,

    /// Ordered steps the agent should follow.
    #[serde(default, alias = "steps", deserialize_with = "one_or_many")]
    pub objective_steps: Vec<String>,

    /// Every one of these must hold for a PASS.
    #[serde(default, alias = "pass", deserialize_with = "one_or_many")]
    pub pass_criteria: Vec<String>,

    /// Any one of these forces a FAIL.
    #[serde(default, alias = "fail", deserialize_with = "one_or_many")]
    pub fail_criteria: Vec<String>,

    /// Page to open before the first round.
    #[serde(default)]
    pub start_url: Option<String>,

    /// Named credentials, referenced as `{{name}}`.
    #[serde(default)]
    pub credentials: Credentials,

    /// Free-form hints passed to the model.
    #[serde(default)]
    pub notes: Option<String>,

    /// Round budget; falls back to the agent default.
    #[serde(default)]
    pub max_rounds: Option<u32>,

    /// Extra attempts after the first one.
    #[serde(default)]
    pub retry_count: u32,

    /// 1 = highest, 10 = lowest.
    #[serde(default = "default_priority")]
    pub priority: u8,

    /// Wall-clock budget per attempt, in seconds.
    #[serde(default, alias = "timeout", alias = "timeout_seconds")]
    pub timeout_secs: Option<f64>,

    /// Free-form tags used for selection.
    #[serde(default, deserialize_with = "one_or_many")]
    pub tags: Vec<String>,

    /// Skip unless the run includes skipped tasks.
    #[serde(default)]
    pub skip: bool,

    #[serde(default)]
    pub skip_reason: Option<String>,

    #[serde(default)]
    pub owner: Option<String>,
}

fn default_priority() -> u8 {
    PRIORITY_DEFAULT
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

fn one_or_many<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    Ok(match Option::<OneOrMany>::deserialize(deserializer)? {
        None => Vec::new(),
        Some(OneOrMany::One(item)) => vec![item],
        Some(OneOrMany::Many(items)) => items,
    })
}

impl TaskDefinition {
    /// Create a new TaskDefinition with the required fields.
    pub fn new(id: impl Into<TaskId>, objective: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            objective: objective.into(),
            objective_steps: Vec::new(),
            pass_criteria: Vec::new(),
            fail_criteria: Vec::new(),
            start_url: None,
            credentials: Credentials::default(),
            notes: None,
            max_rounds: None,
            retry_count: 0,
            priority: PRIORITY_DEFAULT,
            timeout_secs: None,
            tags: Vec::new(),
            skip: false,
            skip_reason: None,
            owner: None,
        }
    }

    /// Builder method to append an objective step.
    pub fn with_step(mut self, step: impl Into<String>) -> Self {
        self.objective_steps.push(step.into());
        self
    }

    /// Builder method to append a pass criterion.
    pub fn with_pass_criterion(mut self, criterion: impl Into<String>) -> Self {
        self.pass_criteria.push(criterion.into());
        self
    }

    /// Builder method to append a fail criterion.
    pub fn with_fail_criterion(mut self, criterion: impl Into<String>) -> Self {
        self.fail_criteria.push(criterion.into());
        self
    }

    pub fn with_start_url(mut self, url: impl Into<String>) -> Self {
        self.start_url = Some(url.into());
        self
    }

    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn with_max_rounds(mut self, rounds: u32) -> Self {
        self.max_rounds = Some(rounds);
        self
    }

    pub fn with_retry_count(mut self, retries: u32) -> Self {
        self.retry_count = retries;
        self
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority.clamp(PRIORITY_HIGHEST, PRIORITY_LOWEST);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_secs = Some(timeout.as_secs_f64());
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// Builder method to mark the task as skipped.
    pub fn skipped(mut self, reason: impl Into<String>) -> Self {
        self.skip = true;
        self.skip_reason = Some(reason.into());
        self
    }

    /// Total attempts the retry controller may make.
    pub fn max_attempts(&self) -> u32 {
        self.retry_count.saturating_add(1)
    }

    /// Per-attempt wall-clock budget, if one is set.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs
            .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
    }

    /// Check if the task has a tag (case-insensitive).
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t.eq_ignore_ascii_case(tag))
    }

    /// Check if the task has any of the tags (case-insensitive).
    pub fn has_any_tag<'a>(&self, tags: impl IntoIterator<Item = &'a String>) -> bool {
        tags.into_iter().any(|tag| self.has_tag(tag))
    }

    /// Placeholder names referenced from the objective, steps and notes.
    pub fn referenced_credentials(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        let texts = std::iter::once(self.objective.as_str())
            .chain(self.objective_steps.iter().map(String::as_str))
            .chain(self.notes.as_deref());
        for text in texts {
            for name in placeholders(text) {
                if !names.contains(&name) {
                    names.push(name);
                }
            }
        }
        names
    }

    /// Fail if a referenced placeholder has no credential.
    pub fn check_credentials(&self) -> Result<(), CoreError> {
        match self
            .referenced_credentials()
            .into_iter()
            .find(|name| !self.credentials.contains(name))
        {
            Some(name) => Err(CoreError::MissingCredential {
                task_id: self.id.to_string(),
                name,
            }),
            None => Ok(()),
        }
    }

    /// Validate and normalize a freshly loaded definition.
    pub fn validate(mut self) -> Result<Self, CoreError> {
        let invalid = |field: &'static str, reason: &str| CoreError::InvalidTask {
            task_id: self.id.to_string(),
            field,
            reason: reason.to_string(),
        };

        if self.id.as_str().trim().is_empty() {
            return Err(invalid("id", "must not be empty"));
        }
        if self.objective.trim().is_empty() {
            return Err(invalid("objective", "must not be empty"));
        }
        if self.pass_criteria.is_empty() {
            return Err(invalid("pass_criteria", "needs at least one item"));
        }
        if self.fail_criteria.is_empty() {
            return Err(invalid("fail_criteria", "needs at least one item"));
        }
        if self.max_rounds == Some(0) {
            return Err(invalid("max_rounds", "must be at least 1"));
        }
        if let Some(secs) = self.timeout_secs {
            if !secs.is_finite() || secs <= 0.0 {
                return Err(invalid("timeout_secs", "must be a positive number"));
            }
        }

        self.priority = self.priority.clamp(PRIORITY_HIGHEST, PRIORITY_LOWEST);
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_with_aliases() {
        let json = r#"{
            "id": "signup",
            "task": "Create an account",
            "steps": "Open the signup form",
            "pass": ["'Welcome' visible"],
            "fail": "Error banner visible",
            "timeout": 90,
            "tags": ["Smoke", "auth"],
            "priority": 42
        }"#;
        let task: TaskDefinition = serde_json::from_str(json).unwrap();
        let task = task.validate().unwrap();

        assert_eq!(task.objective, "Create an account");
        assert_eq!(task.objective_steps, vec!["Open the signup form"]);
        assert_eq!(task.fail_criteria, vec!["Error banner visible"]);
        assert_eq!(task.timeout(), Some(Duration::from_secs(90)));
        assert_eq!(task.priority, PRIORITY_LOWEST);
        assert!(task.has_tag("smoke"));
        assert_eq!(task.retry_count, 0);
        assert_eq!(task.max_attempts(), 1);
    }

    #[test]
    fn test_validate_rejects_missing_criteria() {
        let task = TaskDefinition::new("t", "objective").with_fail_criterion("x");
        let err = task.validate().unwrap_err();
        assert!(matches!(
            err,
            CoreError::InvalidTask {
                field: "pass_criteria",
                ..
            }
        ));
    }

    #[test]
    fn test_validate_rejects_zero_rounds() {
        let task = TaskDefinition::new("t", "objective")
            .with_pass_criterion("a")
            .with_fail_criterion("b")
            .with_max_rounds(0);
        assert!(task.validate().is_err());
    }

    #[test]
    fn test_check_credentials() {
        let task = TaskDefinition::new("login", "Log in as {{username}}")
            .with_step("Enter {{password}}")
            .with_credentials(Credentials::new().with("username", "ada"));

        assert_eq!(task.referenced_credentials(), vec!["username", "password"]);
        let err = task.check_credentials().unwrap_err();
        assert!(matches!(err, CoreError::MissingCredential { ref name, .. } if name == "password"));
    }

    #[test]
    fn test_has_any_tag() {
        let task = TaskDefinition::new("t", "o").with_tag("Regression");
        let wanted = vec!["smoke".to_string(), "regression".to_string()];
        assert!(task.has_any_tag(&wanted));
        assert!(!task.has_any_tag(&vec!["nightly".to_string()]));
    }
}
