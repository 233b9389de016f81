//! Collecting sealed task outcomes from concurrent workers.

use crate::error::RunnerError;
use pagerun_core::{RunId, RunSummary, TaskId, TaskOutcome};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;

#[derive(Debug, Default)]
struct Collected {
    outcomes: HashMap<TaskId, TaskOutcome>,
    completion_order: Vec<TaskId>,
}

/// Append-only collector shared by every worker.
///
/// Knows the dispatch order up front, so the summary lists tasks the same
/// way no matter which worker finished first.
#[derive(Debug)]
pub struct ResultAggregator {
    dispatch_order: Vec<TaskId>,
    collected: Mutex<Collected>,
}

impl ResultAggregator {
    pub fn new(dispatch_order: Vec<TaskId>) -> Self {
        Self {
            dispatch_order,
            collected: Mutex::new(Collected::default()),
        }
    }

    /// Record one task's outcome. Each dispatched task is recorded once.
    pub async fn record(&self, outcome: TaskOutcome) -> Result<(), RunnerError> {
        let task_id = outcome.task_id().clone();
        if !self.dispatch_order.contains(&task_id) {
            return Err(RunnerError::UnknownTask(task_id));
        }

        let mut collected = self.collected.lock().await;
        if collected.outcomes.contains_key(&task_id) {
            return Err(RunnerError::DuplicateOutcome(task_id));
        }
        debug!(
            task_id = %task_id,
            verdict = %outcome.verdict(),
            completed = collected.completion_order.len() + 1,
            total = self.dispatch_order.len(),
            "Outcome recorded"
        );
        collected.completion_order.push(task_id.clone());
        collected.outcomes.insert(task_id, outcome);
        Ok(())
    }

    pub fn dispatch_order(&self) -> &[TaskId] {
        &self.dispatch_order
    }

    pub async fn completion_order(&self) -> Vec<TaskId> {
        self.collected.lock().await.completion_order.clone()
    }

    pub async fn recorded(&self) -> usize {
        self.collected.lock().await.outcomes.len()
    }

    /// Dispatched tasks without an outcome, in dispatch order.
    pub async fn missing(&self) -> Vec<TaskId> {
        let collected = self.collected.lock().await;
        self.dispatch_order
            .iter()
            .filter(|id| !collected.outcomes.contains_key(*id))
            .cloned()
            .collect()
    }

    /// Summary of everything recorded so far.
    ///
    /// Does not consume the collected outcomes; calling it twice yields
    /// equal summaries.
    pub async fn summary(&self, run_id: RunId, wall_clock: Duration) -> RunSummary {
        let collected = self.collected.lock().await;
        let outcomes = self
            .dispatch_order
            .iter()
            .filter_map(|id| collected.outcomes.get(id).cloned())
            .collect();
        RunSummary::build(
            run_id,
            outcomes,
            collected.completion_order.clone(),
            wall_clock,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pagerun_core::{RunRecorder, RunResult, Termination, TerminationReason, Verdict, VerdictSource};
    use std::sync::Arc;

    fn outcome(id: &str, verdict: Verdict) -> TaskOutcome {
        TaskOutcome::new(RunRecorder::new(TaskId::new(id), 1).seal(Termination::new(
            verdict,
            TerminationReason::CriteriaMet,
            VerdictSource::Criteria,
        )))
    }

    fn ids(ids: &[&str]) -> Vec<TaskId> {
        ids.iter().map(|id| TaskId::new(*id)).collect()
    }

    #[tokio::test]
    async fn test_summary_uses_dispatch_order() {
        let aggregator = ResultAggregator::new(ids(&["a", "b", "c"]));
        aggregator.record(outcome("c", Verdict::Pass)).await.unwrap();
        aggregator.record(outcome("a", Verdict::Fail)).await.unwrap();
        aggregator
            .record(TaskOutcome::new(RunResult::skipped(TaskId::new("b"), None)))
            .await
            .unwrap();

        let summary = aggregator
            .summary(RunId::new("run-1"), Duration::from_secs(3))
            .await;
        let order: Vec<&str> = summary.outcomes.iter().map(|o| o.task_id().as_str()).collect();
        assert_eq!(order, vec!["a", "b", "c"]);
        assert_eq!(summary.completion_order, ids(&["c", "a", "b"]));
        assert_eq!(summary.counts.skipped, 1);
        assert_eq!(summary.pass_rate, 50.0);
    }

    #[tokio::test]
    async fn test_summary_is_idempotent() {
        let aggregator = ResultAggregator::new(ids(&["a", "b"]));
        aggregator.record(outcome("b", Verdict::Pass)).await.unwrap();
        aggregator.record(outcome("a", Verdict::Timeout)).await.unwrap();

        let first = aggregator.summary(RunId::new("r"), Duration::from_secs(1)).await;
        let second = aggregator.summary(RunId::new("r"), Duration::from_secs(1)).await;
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_rejects_duplicate_and_unknown_outcomes() {
        let aggregator = ResultAggregator::new(ids(&["a"]));
        aggregator.record(outcome("a", Verdict::Pass)).await.unwrap();

        assert!(matches!(
            aggregator.record(outcome("a", Verdict::Fail)).await,
            Err(RunnerError::DuplicateOutcome(_))
        ));
        assert!(matches!(
            aggregator.record(outcome("zzz", Verdict::Pass)).await,
            Err(RunnerError::UnknownTask(_))
        ));
        assert_eq!(aggregator.recorded().await, 1);
    }

    #[tokio::test]
    async fn test_concurrent_records_are_all_kept() {
        let names: Vec<String> = (0..32).map(|i| format!("t{}", i)).collect();
        let aggregator = Arc::new(ResultAggregator::new(
            names.iter().map(TaskId::new).collect(),
        ));

        let mut handles = Vec::new();
        for name in names.clone() {
            let aggregator = aggregator.clone();
            handles.push(tokio::spawn(async move {
                aggregator.record(outcome(&name, Verdict::Pass)).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert!(aggregator.missing().await.is_empty());
        assert_eq!(aggregator.completion_order().await.len(), 32);
    }
}
