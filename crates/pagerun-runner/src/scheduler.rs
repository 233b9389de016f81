//! Parallel scheduler - drains the task queue with a pool of workers.

use crate::aggregator::ResultAggregator;
use crate::config::RunnerConfig;
use crate::error::RunnerError;
use crate::retry::RetryController;
use pagerun_core::{
    unique_ids, RunId, RunRecorder, RunResult, RunSummary, TaskDefinition, TaskId, TaskOutcome, Termination,
    TerminationReason, Verdict,
};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

type Queue = Arc<Mutex<VecDeque<Arc<TaskDefinition>>>>;

/// Runs a selected task set and builds its summary.
pub struct Scheduler {
    config: RunnerConfig,
    retry: RetryController,
}

impl Scheduler {
    pub fn new(config: RunnerConfig, retry: RetryController) -> Result<Self, RunnerError> {
        config.validate()?;
        Ok(Self { config, retry })
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Order in which `tasks` are handed to workers.
    pub fn dispatch_order(&self, mut tasks: Vec<TaskDefinition>) -> Vec<TaskDefinition> {
        if self.config.sort_by_priority {
            // stable: equal priorities keep definition order
            tasks.sort_by_key(|task| task.priority);
        }
        tasks
    }

    /// Run every task and return the summary.
    ///
    /// Every task appears exactly once in the summary, whether it ran, was
    /// skipped, or was still queued when `cancel` fired. Task ids must be
    /// unique.
    pub async fn run(
        &self,
        tasks: Vec<TaskDefinition>,
        cancel: CancellationToken,
    ) -> Result<RunSummary, RunnerError> {
        unique_ids(&tasks)?;
        let started = Instant::now();
        let run_id = RunId::generate();
        let tasks = self.dispatch_order(tasks);
        let aggregator = Arc::new(ResultAggregator::new(
            tasks.iter().map(|task| task.id.clone()).collect(),
        ));

        let mut queue = VecDeque::new();
        for task in tasks {
            if task.skip && !self.config.include_skipped {
                info!(task_id = %task.id, reason = ?task.skip_reason, "Skipping task");
                aggregator
                    .record(TaskOutcome::new(RunResult::skipped(
                        task.id.clone(),
                        task.skip_reason.clone(),
                    )))
                    .await?;
            } else {
                queue.push_back(Arc::new(task));
            }
        }

        let workers = self.config.parallel.min(queue.len());
        info!(
            run_id = %run_id,
            tasks = aggregator.dispatch_order().len(),
            queued = queue.len(),
            workers,
            "Starting run"
        );

        let queue: Queue = Arc::new(Mutex::new(queue));
        let mut pool = JoinSet::new();
        for worker in 0..workers {
            pool.spawn(work(
                worker,
                queue.clone(),
                self.retry.clone(),
                aggregator.clone(),
                cancel.clone(),
            ));
        }
        while let Some(joined) = pool.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "Worker stopped unexpectedly");
            }
        }

        let leftover: Vec<Arc<TaskDefinition>> = queue.lock().await.drain(..).collect();
        if !leftover.is_empty() {
            warn!(count = leftover.len(), "Run cancelled with tasks still queued");
        }
        for task in leftover {
            aggregator
                .record(TaskOutcome::new(RunResult::cancelled(task.id.clone())))
                .await?;
        }
        for task_id in aggregator.missing().await {
            aggregator.record(TaskOutcome::new(worker_lost(task_id))).await?;
        }

        let summary = aggregator.summary(run_id, started.elapsed()).await;
        info!(
            run_id = %summary.run_id,
            passed = summary.counts.pass,
            failed = summary.counts.fail,
            errors = summary.counts.error,
            timeouts = summary.counts.timeout,
            skipped = summary.counts.skipped,
            pass_rate = summary.pass_rate,
            "Run finished"
        );
        Ok(summary)
    }
}

/// One worker: take the next task, run it, record it, repeat.
async fn work(
    worker: usize,
    queue: Queue,
    retry: RetryController,
    aggregator: Arc<ResultAggregator>,
    cancel: CancellationToken,
) {
    loop {
        if cancel.is_cancelled() {
            return;
        }
        let Some(task) = queue.lock().await.pop_front() else {
            return;
        };

        info!(worker, task_id = %task.id, priority = task.priority, "Task dequeued");
        let outcome = retry.run_task(&task, &cancel).await;
        if let Err(e) = aggregator.record(outcome).await {
            error!(worker, task_id = %task.id, error = %e, "Outcome not recorded");
        }
    }
}

fn worker_lost(task_id: TaskId) -> RunResult {
    RunRecorder::new(task_id, 0).seal(Termination::runtime(
        Verdict::Error,
        TerminationReason::FatalError,
        "worker stopped before reporting the task",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pagerun_agent::testing::{terminate_pass, FakePage, FakeSessionFactory, ScriptedDecider};
    use pagerun_agent::{AgentConfig, RoundController};
    use std::collections::BTreeMap;
    use std::time::Duration;

    fn scheduler(parallel: usize, decider: ScriptedDecider, factory: Arc<FakeSessionFactory>) -> Scheduler {
        let controller = RoundController::new(Arc::new(AgentConfig::default()), Arc::new(decider));
        let retry = RetryController::new(controller, factory, Duration::from_secs(1));
        let config = RunnerConfig {
            parallel,
            sort_by_priority: true,
            ..RunnerConfig::default()
        };
        Scheduler::new(config, retry).unwrap()
    }

    fn dashboard() -> Arc<FakeSessionFactory> {
        Arc::new(FakeSessionFactory::new(vec![
            FakePage::new("https://app.test/dashboard", "Dashboard").with_text("Welcome back")
        ]))
    }

    fn task(id: &str) -> TaskDefinition {
        TaskDefinition::new(id, "Reach the dashboard")
            .with_pass_criterion("URL contains /dashboard")
            .with_max_rounds(3)
    }

    fn ten_tasks() -> Vec<TaskDefinition> {
        (0..10)
            .map(|i| {
                let task = task(&format!("t{}", i));
                if i == 6 {
                    task.skipped("flaky upstream")
                } else {
                    task
                }
            })
            .collect()
    }

    fn verdicts(summary: &RunSummary) -> BTreeMap<String, Verdict> {
        summary
            .outcomes
            .iter()
            .map(|o| (o.task_id().to_string(), o.verdict()))
            .collect()
    }

    #[tokio::test]
    async fn test_parallel_run_reports_every_task_once() {
        let factory = dashboard();
        let scheduler = scheduler(4, ScriptedDecider::repeating(terminate_pass("on dashboard")), factory.clone());

        let summary = scheduler.run(ten_tasks(), CancellationToken::new()).await.unwrap();

        assert_eq!(summary.total(), 10);
        assert_eq!(summary.completion_order.len(), 10);
        assert_eq!(summary.counts.pass, 9);
        assert_eq!(summary.counts.skipped, 1);
        let skipped = summary.outcome(&TaskId::new("t6")).unwrap();
        assert_eq!(skipped.verdict(), Verdict::Skipped);
        assert!(skipped.result().rounds().is_empty());
        assert_eq!(skipped.result().rationale(), Some("flaky upstream"));
        assert_eq!(factory.browsers().len(), 9);
        assert!(summary.all_passed());
        assert_eq!(summary.pass_rate, 100.0);
    }

    #[tokio::test]
    async fn test_worker_count_does_not_change_verdicts() {
        let serial = scheduler(1, ScriptedDecider::repeating(terminate_pass("ok")), dashboard())
            .run(ten_tasks(), CancellationToken::new())
            .await
            .unwrap();
        let parallel = scheduler(4, ScriptedDecider::repeating(terminate_pass("ok")), dashboard())
            .run(ten_tasks(), CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(verdicts(&serial), verdicts(&parallel));
        let serial_order: Vec<&TaskId> = serial.outcomes.iter().map(TaskOutcome::task_id).collect();
        let parallel_order: Vec<&TaskId> = parallel.outcomes.iter().map(TaskOutcome::task_id).collect();
        assert_eq!(serial_order, parallel_order);
    }

    #[tokio::test]
    async fn test_include_skipped_runs_the_task() {
        let factory = dashboard();
        let controller = RoundController::new(
            Arc::new(AgentConfig::default()),
            Arc::new(ScriptedDecider::repeating(terminate_pass("ok"))),
        );
        let retry = RetryController::new(controller, factory.clone(), Duration::from_secs(1));
        let config = RunnerConfig {
            include_skipped: true,
            ..RunnerConfig::default()
        };
        let summary = Scheduler::new(config, retry)
            .unwrap()
            .run(vec![task("a").skipped("later")], CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(summary.counts.pass, 1);
        assert_eq!(factory.browsers().len(), 1);
    }

    #[tokio::test]
    async fn test_priority_sort_is_stable() {
        let scheduler = scheduler(1, ScriptedDecider::repeating(terminate_pass("ok")), dashboard());
        let tasks = vec![
            task("low").with_priority(9),
            task("first-high").with_priority(1),
            task("mid").with_priority(5),
            task("second-high").with_priority(1),
        ];

        let summary = scheduler.run(tasks, CancellationToken::new()).await.unwrap();

        let order: Vec<&str> = summary.outcomes.iter().map(|o| o.task_id().as_str()).collect();
        assert_eq!(order, vec!["first-high", "second-high", "mid", "low"]);
        let completed: Vec<&str> = summary.completion_order.iter().map(TaskId::as_str).collect();
        assert_eq!(completed, order);
    }

    #[tokio::test]
    async fn test_definition_order_without_priority_sort() {
        let controller = RoundController::new(
            Arc::new(AgentConfig::default()),
            Arc::new(ScriptedDecider::repeating(terminate_pass("ok"))),
        );
        let retry = RetryController::new(controller, dashboard(), Duration::from_secs(1));
        let config = RunnerConfig {
            sort_by_priority: false,
            ..RunnerConfig::default()
        };
        let scheduler = Scheduler::new(config, retry).unwrap();
        let tasks = vec![task("b").with_priority(9), task("a").with_priority(1)];

        let ordered: Vec<String> = scheduler
            .dispatch_order(tasks)
            .into_iter()
            .map(|t| t.id.to_string())
            .collect();
        assert_eq!(ordered, vec!["b", "a"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_reports_queued_tasks() {
        let decider = ScriptedDecider::repeating(terminate_pass("ok")).with_delay(Duration::from_secs(60));
        let scheduler = scheduler(1, decider, dashboard());
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            trigger.cancel();
        });

        let tasks = vec![task("a"), task("b"), task("c")];
        let summary = scheduler.run(tasks, cancel).await.unwrap();

        assert_eq!(summary.total(), 3);
        assert_eq!(summary.counts.error, 3);
        for outcome in &summary.outcomes {
            assert_eq!(outcome.result().reason(), TerminationReason::Cancelled);
        }
        assert_eq!(summary.outcome(&TaskId::new("a")).unwrap().attempt_count(), 1);
        assert_eq!(summary.outcome(&TaskId::new("c")).unwrap().attempt_count(), 0);
    }

    #[tokio::test]
    async fn test_summary_is_rebuilt_identically() {
        let summary = scheduler(2, ScriptedDecider::repeating(terminate_pass("ok")), dashboard())
            .run(ten_tasks(), CancellationToken::new())
            .await
            .unwrap();

        let rebuilt = RunSummary::build(
            summary.run_id.clone(),
            summary.outcomes.clone(),
            summary.completion_order.clone(),
            Duration::from_millis(summary.wall_clock_ms),
        );
        assert_eq!(rebuilt, summary);
    }

    #[tokio::test]
    async fn test_duplicate_ids_rejected_before_any_browser_opens() {
        let factory = dashboard();
        let scheduler = scheduler(3, ScriptedDecider::repeating(terminate_pass("ok")), factory.clone());

        let err = scheduler
            .run(vec![task("dup"), task("dup"), task("other")], CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            RunnerError::Selection(pagerun_core::CoreError::DuplicateTaskId(ref id)) if id == "dup"
        ));
        assert!(factory.browsers().is_empty());
    }

    #[test]
    fn test_zero_workers_rejected() {
        let controller = RoundController::new(
            Arc::new(AgentConfig::default()),
            Arc::new(ScriptedDecider::repeating(terminate_pass("ok"))),
        );
        let retry = RetryController::new(controller, dashboard(), Duration::from_secs(1));
        let config = RunnerConfig {
            parallel: 0,
            ..RunnerConfig::default()
        };
        assert!(Scheduler::new(config, retry).is_err());
    }
}
