//! Agent loop configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Process-wide settings for every attempt. Built once, shared read-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Round budget for tasks that do not set their own.
    pub max_rounds: u32,

    /// How many past rounds are summarized in each decision request.
    pub history_window: usize,

    /// Fresh decisions the validator may request per round.
    pub max_healing_attempts: u32,

    /// Consecutive malformed or failed decisions before the attempt errors.
    pub max_decision_failures: u32,

    /// Wall-clock budget for tasks that do not set their own (seconds).
    pub default_timeout_secs: Option<u64>,

    /// How long an in-flight provider call may finish after the deadline (ms).
    pub grace_period_ms: u64,

    /// Screenshots are written under this directory when set.
    pub screenshot_dir: Option<PathBuf>,

    /// Longest `wait` the model may ask for (seconds).
    pub max_wait_secs: u64,

    /// Longest `wait_for_element` timeout the model may ask for (ms).
    pub max_element_wait_ms: u64,

    pub loop_guard: LoopGuardConfig,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_rounds: 15,
            history_window: 6,
            max_healing_attempts: 2,
            max_decision_failures: 3,
            default_timeout_secs: None,
            grace_period_ms: 2_000,
            screenshot_dir: None,
            max_wait_secs: 10,
            max_element_wait_ms: 30_000,
            loop_guard: LoopGuardConfig::default(),
        }
    }
}

impl AgentConfig {
    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }

    pub fn default_timeout(&self) -> Option<Duration> {
        self.default_timeout_secs.map(Duration::from_secs)
    }

    pub fn wait_limits(&self) -> WaitLimits {
        WaitLimits {
            max_wait: Duration::from_secs(self.max_wait_secs),
            max_element_wait: Duration::from_millis(self.max_element_wait_ms),
        }
    }
}

/// Upper bounds on model-requested waits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitLimits {
    pub max_wait: Duration,
    pub max_element_wait: Duration,
}

impl Default for WaitLimits {
    fn default() -> Self {
        AgentConfig::default().wait_limits()
    }
}

/// Detection of an agent repeating itself on the same spot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoopGuardConfig {
    pub enabled: bool,

    /// Grid size, in pixels, used to group nearby coordinates.
    pub bucket_px: u32,

    /// Repeats on one spot before the model is warned.
    pub warn_after: u32,

    /// Clicks on one spot that end the attempt.
    pub max_clicks: u32,

    /// Typing actions on one spot that end the attempt.
    pub max_types: u32,
}

impl Default for LoopGuardConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bucket_px: 20,
            warn_after: 2,
            max_clicks: 4,
            max_types: 3,
        }
    }
}
