//! Aggregated view over one scheduling invocation.

use crate::{RunId, TaskId, TaskOutcome, Verdict};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Count of tasks per verdict.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerdictCounts {
    pub pass: usize,
    pub fail: usize,
    pub error: usize,
    pub timeout: usize,
    pub skipped: usize,
}

impl VerdictCounts {
    pub fn add(&mut self, verdict: Verdict) {
        *self.slot(verdict) += 1;
    }

    pub fn get(&self, verdict: Verdict) -> usize {
        match verdict {
            Verdict::Pass => self.pass,
            Verdict::Fail => self.fail,
            Verdict::Error => self.error,
            Verdict::Timeout => self.timeout,
            Verdict::Skipped => self.skipped,
        }
    }

    pub fn total(&self) -> usize {
        Verdict::ALL.iter().map(|v| self.get(*v)).sum()
    }

    /// Tasks that actually ran.
    pub fn executed(&self) -> usize {
        self.total() - self.skipped
    }

    fn slot(&mut self, verdict: Verdict) -> &mut usize {
        match verdict {
            Verdict::Pass => &mut self.pass,
            Verdict::Fail => &mut self.fail,
            Verdict::Error => &mut self.error,
            Verdict::Timeout => &mut self.timeout,
            Verdict::Skipped => &mut self.skipped,
        }
    }
}

impl FromIterator<Verdict> for VerdictCounts {
    fn from_iter<I: IntoIterator<Item = Verdict>>(iter: I) -> Self {
        let mut counts = Self::default();
        for verdict in iter {
            counts.add(verdict);
        }
        counts
    }
}

/// Summary handed to report sinks.
///
/// Outcomes are listed in dispatch order (the order tasks were selected
/// and queued), which is stable for a given selection. Completion order is
/// kept separately for display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: RunId,
    pub counts: VerdictCounts,
    /// Percentage of executed tasks that passed, rounded to two decimals.
    pub pass_rate: f64,
    /// Sum of every attempt's duration.
    pub total_duration_ms: u64,
    /// Wall-clock time of the whole invocation.
    pub wall_clock_ms: u64,
    pub outcomes: Vec<TaskOutcome>,
    pub completion_order: Vec<TaskId>,
}

impl RunSummary {
    /// Build a summary from outcomes in dispatch order.
    ///
    /// Pure: the same inputs always produce an equal summary.
    pub fn build(
        run_id: RunId,
        outcomes: Vec<TaskOutcome>,
        completion_order: Vec<TaskId>,
        wall_clock: Duration,
    ) -> Self {
        let counts: VerdictCounts = outcomes.iter().map(TaskOutcome::verdict).collect();
        let total_duration: Duration = outcomes.iter().map(TaskOutcome::total_duration).sum();
        let pass_rate = match counts.executed() {
            0 => 0.0,
            executed => ((counts.pass as f64 / executed as f64) * 10_000.0).round() / 100.0,
        };

        Self {
            run_id,
            counts,
            pass_rate,
            total_duration_ms: total_duration.as_millis() as u64,
            wall_clock_ms: wall_clock.as_millis() as u64,
            outcomes,
            completion_order,
        }
    }

    pub fn total(&self) -> usize {
        self.outcomes.len()
    }

    /// True if every executed task passed.
    pub fn all_passed(&self) -> bool {
        self.counts.executed() == self.counts.pass
    }

    pub fn outcome(&self, task_id: &TaskId) -> Option<&TaskOutcome> {
        self.outcomes.iter().find(|o| o.task_id() == task_id)
    }

    /// Outcomes re-ordered by completion.
    pub fn outcomes_by_completion(&self) -> Vec<&TaskOutcome> {
        self.completion_order
            .iter()
            .filter_map(|id| self.outcome(id))
            .collect()
    }
}
