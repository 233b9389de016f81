//! Retrying a task across fresh browser sessions.

use pagerun_agent::{BrowserSession, RoundController, SessionFactory};
use pagerun_core::{
    RunRecorder, RunResult, TaskDefinition, TaskOutcome, Termination, TerminationReason, Verdict,
};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Runs up to `retry_count + 1` attempts of a task, stopping at the first PASS.
#[derive(Clone)]
pub struct RetryController {
    controller: RoundController,
    sessions: Arc<dyn SessionFactory>,
    close_timeout: Duration,
}

impl RetryController {
    pub fn new(
        controller: RoundController,
        sessions: Arc<dyn SessionFactory>,
        close_timeout: Duration,
    ) -> Self {
        Self {
            controller,
            sessions,
            close_timeout,
        }
    }

    /// Run every attempt of `task` and keep them all.
    ///
    /// The reported result is the first PASS or, failing that, the last
    /// attempt.
    pub async fn run_task(&self, task: &TaskDefinition, cancel: &CancellationToken) -> TaskOutcome {
        if cancel.is_cancelled() {
            return TaskOutcome::new(RunResult::cancelled(task.id.clone()));
        }

        let max_attempts = task.max_attempts();
        let mut attempts: Vec<RunResult> = Vec::with_capacity(max_attempts as usize);

        for attempt in 1..=max_attempts {
            if attempt > 1 && cancel.is_cancelled() {
                info!(task_id = %task.id, attempt, "Run cancelled, not retrying");
                break;
            }

            let result = self.attempt(task, attempt, cancel).await;
            info!(
                task_id = %task.id,
                attempt,
                max_attempts,
                verdict = %result.verdict(),
                reason = %result.reason(),
                rounds = result.rounds().len(),
                "Attempt finished"
            );

            let stop = result.verdict().is_pass() || result.reason() == TerminationReason::Cancelled;
            attempts.push(result);
            if stop {
                break;
            }
            if attempt < max_attempts {
                info!(task_id = %task.id, next_attempt = attempt + 1, "Retrying task");
            }
        }

        match attempts.pop() {
            Some(last) => TaskOutcome::with_previous(last, attempts),
            None => TaskOutcome::new(RunResult::cancelled(task.id.clone())),
        }
    }

    async fn attempt(
        &self,
        task: &TaskDefinition,
        attempt: u32,
        cancel: &CancellationToken,
    ) -> RunResult {
        let opened = tokio::select! {
            _ = cancel.cancelled() => {
                return RunRecorder::new(task.id.clone(), attempt).seal(Termination::runtime(
                    Verdict::Error,
                    TerminationReason::Cancelled,
                    "run cancelled while opening a browser session",
                ));
            }
            opened = self.sessions.open() => opened,
        };

        let mut session = match opened {
            Ok(session) => session,
            Err(e) => {
                warn!(task_id = %task.id, attempt, error = %e, "Failed to open browser session");
                return RunRecorder::new(task.id.clone(), attempt).seal(Termination::runtime(
                    Verdict::Error,
                    TerminationReason::FatalError,
                    e.to_string(),
                ));
            }
        };

        let result = self
            .controller
            .run_attempt(task, attempt, session.as_mut(), cancel)
            .await;
        self.close(task, attempt, session).await;
        result
    }

    async fn close(&self, task: &TaskDefinition, attempt: u32, mut session: Box<dyn BrowserSession>) {
        match tokio::time::timeout(self.close_timeout, session.close()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!(task_id = %task.id, attempt, error = %e, "Failed to close browser session");
            }
            Err(_) => {
                warn!(
                    task_id = %task.id,
                    attempt,
                    timeout_secs = self.close_timeout.as_secs(),
                    "Browser session did not close in time, abandoning it"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pagerun_agent::testing::{
        click, terminate_fail, terminate_pass, FakePage, FakeSessionFactory, ScriptedDecider,
    };
    use pagerun_agent::AgentConfig;

    fn welcome_page() -> Vec<FakePage> {
        vec![FakePage::new("https://app.test/home", "Home").with_text("Welcome back, Ada")]
    }

    fn login_task(retries: u32) -> TaskDefinition {
        TaskDefinition::new("login", "Sign in as Ada")
            .with_pass_criterion("\"Welcome back\" is shown")
            .with_fail_criterion("error banner visible")
            .with_max_rounds(3)
            .with_retry_count(retries)
    }

    fn retry_controller(
        decider: ScriptedDecider,
        factory: FakeSessionFactory,
    ) -> (RetryController, Arc<FakeSessionFactory>) {
        let factory = Arc::new(factory);
        let controller = RoundController::new(Arc::new(AgentConfig::default()), Arc::new(decider));
        (
            RetryController::new(controller, factory.clone(), Duration::from_secs(1)),
            factory,
        )
    }

    #[tokio::test]
    async fn test_session_failures_are_retried_until_pass() {
        let (retry, factory) = retry_controller(
            ScriptedDecider::repeating(terminate_pass("welcome message visible")),
            FakeSessionFactory::new(welcome_page()).fail_first(2),
        );

        let outcome = retry.run_task(&login_task(2), &CancellationToken::new()).await;

        assert_eq!(outcome.verdict(), Verdict::Pass);
        assert_eq!(outcome.attempt_count(), 3);
        let verdicts: Vec<Verdict> = outcome.attempts().map(RunResult::verdict).collect();
        assert_eq!(verdicts, vec![Verdict::Error, Verdict::Error, Verdict::Pass]);
        let first = outcome.attempts().next().unwrap();
        assert_eq!(first.reason(), TerminationReason::FatalError);
        assert!(first.error().unwrap().contains("browser failed to start"));
        assert_eq!(outcome.result().attempt(), 3);
        assert_eq!(factory.browsers().len(), 1);
        assert!(factory.browsers()[0].is_closed());
    }

    #[tokio::test]
    async fn test_stops_at_first_pass() {
        let (retry, factory) = retry_controller(
            ScriptedDecider::repeating(terminate_pass("done")),
            FakeSessionFactory::new(welcome_page()),
        );

        let outcome = retry.run_task(&login_task(3), &CancellationToken::new()).await;

        assert_eq!(outcome.verdict(), Verdict::Pass);
        assert_eq!(outcome.attempt_count(), 1);
        assert_eq!(factory.browsers().len(), 1);
    }

    #[tokio::test]
    async fn test_all_attempts_fail_reports_last() {
        let pages = vec![FakePage::new("https://app.test/login", "Login").with_text("Sign in")];
        let (retry, factory) = retry_controller(
            ScriptedDecider::repeating(click(10.0, 10.0)),
            FakeSessionFactory::new(pages),
        );

        let outcome = retry.run_task(&login_task(1), &CancellationToken::new()).await;

        assert_eq!(outcome.verdict(), Verdict::Fail);
        assert_eq!(outcome.attempt_count(), 2);
        assert_eq!(outcome.result().attempt(), 2);
        assert_eq!(outcome.result().reason(), TerminationReason::MaxRoundsExceeded);
        assert_eq!(factory.browsers().len(), 2);
        assert!(factory.browsers().iter().all(|b| b.is_closed()));
    }

    #[tokio::test]
    async fn test_model_failure_is_retried() {
        let decider = ScriptedDecider::new(vec![Ok(terminate_fail("nothing happened"))])
            .then_repeat(terminate_pass("welcome shown"));
        let (retry, _factory) = retry_controller(decider, FakeSessionFactory::new(welcome_page()));

        let task = TaskDefinition::new("login", "Sign in")
            .with_pass_criterion("The user is signed in")
            .with_max_rounds(2)
            .with_retry_count(1);
        let outcome = retry.run_task(&task, &CancellationToken::new()).await;

        let verdicts: Vec<Verdict> = outcome.attempts().map(RunResult::verdict).collect();
        assert_eq!(verdicts, vec![Verdict::Fail, Verdict::Pass]);
    }

    #[tokio::test]
    async fn test_cancelled_task_is_not_started() {
        let (retry, factory) = retry_controller(
            ScriptedDecider::repeating(terminate_pass("done")),
            FakeSessionFactory::new(welcome_page()),
        );
        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcome = retry.run_task(&login_task(2), &cancel).await;

        assert_eq!(outcome.verdict(), Verdict::Error);
        assert_eq!(outcome.result().reason(), TerminationReason::Cancelled);
        assert_eq!(outcome.attempt_count(), 0);
        assert!(factory.browsers().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_stops_retries() {
        let decider = ScriptedDecider::repeating(click(10.0, 10.0)).with_delay(Duration::from_secs(30));
        let (retry, factory) = retry_controller(decider, FakeSessionFactory::new(welcome_page()));
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            trigger.cancel();
        });

        let task = TaskDefinition::new("slow", "Wait forever")
            .with_pass_criterion("The order is placed")
            .with_max_rounds(5)
            .with_retry_count(3);
        let outcome = retry.run_task(&task, &cancel).await;

        assert_eq!(outcome.attempt_count(), 1);
        assert_eq!(outcome.result().reason(), TerminationReason::Cancelled);
        assert_eq!(factory.browsers().len(), 1);
        assert!(factory.browsers()[0].is_closed());
    }
}
