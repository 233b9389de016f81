//! Scheduling parameters.

use crate::error::RunnerError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Number of workers; each owns at most one browser session at a time.
    pub parallel: usize,

    /// Run tasks marked `skip` instead of reporting them as SKIPPED.
    pub include_skipped: bool,

    /// Dispatch by ascending priority (stable), else in definition order.
    pub sort_by_priority: bool,

    /// Seconds a session may take to close before it is abandoned.
    pub close_timeout_secs: u64,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            parallel: 1,
            include_skipped: false,
            sort_by_priority: false,
            close_timeout_secs: 10,
        }
    }
}

impl RunnerConfig {
    pub fn close_timeout(&self) -> Duration {
        Duration::from_secs(self.close_timeout_secs)
    }

    pub fn validate(&self) -> Result<(), RunnerError> {
        if self.parallel == 0 {
            return Err(RunnerError::InvalidConfig(
                "parallel must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config: RunnerConfig = serde_json::from_str(r#"{"parallel": 4}"#).unwrap();
        assert_eq!(config.parallel, 4);
        assert!(!config.sort_by_priority);
        assert_eq!(config.close_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_zero_workers_rejected() {
        let config = RunnerConfig {
            parallel: 0,
            ..RunnerConfig::default()
        };
        assert!(matches!(config.validate(), Err(RunnerError::InvalidConfig(_))));
    }
}
