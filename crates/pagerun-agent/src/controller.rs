//! Round controller: one attempt of a task as an explicit state machine.
//!
//! ```text
//! Init -> Observe -> Decide -> Validate -> Execute -> Evaluate -> (Observe | Terminated)
//! ```
//!
//! Observe, Decide, Validate and Execute are raced against the attempt
//! deadline and the cancellation token. Every round appends exactly one
//! [`RoundRecord`], including rounds cut short by an interruption.

use crate::config::AgentConfig;
use crate::decision::{Decision, DecisionError, DecisionRequest, DecisionService};
use crate::error::AgentError;
use crate::evaluator::{evaluate, judge_all, CriteriaJudge, CriterionKind, Evaluation, Evidence, EvidenceJudge};
use crate::executor::{self, Executed};
use crate::memory::{LoopCheck, WorkingMemory};
use crate::provider::{BrowserSession, Observation, ProviderError, TargetState};
use crate::validator::{HealingContext, PreflightValidator, Validated};
use async_trait::async_trait;
use chrono::Utc;
use pagerun_core::{
    normalize_url, ActionCommand, ExecutionOutcome, ObservationRef, RoundRecord, RunRecorder,
    RunResult, Target, TaskDefinition, TerminateStatus, Termination, TerminationReason,
    ValidationOutcome, Verdict,
};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Runs attempts. Shared read-only by every worker.
#[derive(Clone)]
pub struct RoundController {
    config: Arc<AgentConfig>,
    decider: Arc<dyn DecisionService>,
    judge: Arc<dyn CriteriaJudge>,
}

impl RoundController {
    /// Create a controller judging criteria with [`EvidenceJudge`].
    pub fn new(config: Arc<AgentConfig>, decider: Arc<dyn DecisionService>) -> Self {
        Self {
            config,
            decider,
            judge: Arc::new(EvidenceJudge),
        }
    }

    pub fn with_judge(mut self, judge: Arc<dyn CriteriaJudge>) -> Self {
        self.judge = judge;
        self
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Run one attempt of `task` on `session` and seal its result.
    ///
    /// Never fails: every error ends in a sealed result with a verdict.
    /// The caller owns the session and closes it afterwards.
    pub async fn run_attempt(
        &self,
        task: &TaskDefinition,
        attempt: u32,
        session: &mut dyn BrowserSession,
        cancel: &CancellationToken,
    ) -> RunResult {
        let mut run = Attempt::new(self, task, attempt, session, cancel);
        info!(
            task_id = %task.id,
            attempt,
            max_rounds = run.max_rounds,
            "Starting attempt"
        );

        let mut phase = Phase::Init;
        let termination = loop {
            phase = match phase {
                Phase::Terminated(termination) => break termination,
                phase => run.step(phase).await,
            };
        };
        run.seal(termination)
    }
}

/// Attempt states.
#[derive(Debug)]
enum Phase {
    Init,
    Observe,
    Decide,
    Validate(Decision),
    Execute(Decision),
    /// `asserted` carries the model's `terminate` status and reason.
    Evaluate {
        asserted: Option<(TerminateStatus, String)>,
    },
    Terminated(Termination),
}

/// Races provider and model calls against the deadline and cancellation.
struct Guard {
    cancel: CancellationToken,
    budget: Option<Duration>,
    deadline: Option<Instant>,
    grace: Duration,
}

impl Guard {
    fn new(cancel: CancellationToken, budget: Option<Duration>, grace: Duration) -> Self {
        Self {
            cancel,
            budget,
            deadline: budget.map(|budget| Instant::now() + budget),
            grace,
        }
    }

    fn timeout_error(&self) -> AgentError {
        AgentError::TimeoutExceeded(self.budget.unwrap_or_default())
    }

    fn check(&self) -> Result<(), AgentError> {
        if self.cancel.is_cancelled() {
            return Err(AgentError::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Err(self.timeout_error()),
            _ => Ok(()),
        }
    }

    /// Await `fut` unless the attempt is cancelled or out of time.
    ///
    /// A call still running at the deadline gets the grace period to
    /// settle; its result is discarded either way.
    async fn run<F: Future>(&self, fut: F) -> Result<F::Output, AgentError> {
        self.check()?;
        tokio::pin!(fut);

        let Some(deadline) = self.deadline else {
            return tokio::select! {
                biased;
                _ = self.cancel.cancelled() => Err(AgentError::Cancelled),
                out = &mut fut => Ok(out),
            };
        };

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(AgentError::Cancelled),
            out = &mut fut => return Ok(out),
            _ = tokio::time::sleep_until(deadline) => {}
        }

        if tokio::time::timeout(self.grace, &mut fut).await.is_err() {
            warn!(grace_ms = self.grace.as_millis() as u64, "In-flight call abandoned after grace period");
        }
        Err(self.timeout_error())
    }
}

/// Round being assembled; becomes a [`RoundRecord`] once its execution
/// outcome is known.
struct RoundDraft {
    round: u32,
    observation: ObservationRef,
    request_summary: String,
    raw_response: Option<String>,
    command: Option<ActionCommand>,
    validation: ValidationOutcome,
}

/// State of one attempt.
struct Attempt<'a> {
    controller: &'a RoundController,
    task: &'a TaskDefinition,
    session: &'a mut dyn BrowserSession,
    guard: Guard,
    memory: WorkingMemory,
    recorder: RunRecorder,
    max_rounds: u32,
    round: u32,
    observation: Option<Arc<Observation>>,
    draft: Option<RoundDraft>,
    decision_failures: u32,
    /// Notes for the next decision request.
    notes: Vec<String>,
}

impl<'a> Attempt<'a> {
    fn new(
        controller: &'a RoundController,
        task: &'a TaskDefinition,
        attempt: u32,
        session: &'a mut dyn BrowserSession,
        cancel: &'a CancellationToken,
    ) -> Self {
        let config = &controller.config;
        let budget = task.timeout().or_else(|| config.default_timeout());
        Self {
            controller,
            task,
            session,
            guard: Guard::new(cancel.clone(), budget, config.grace_period()),
            memory: WorkingMemory::new(task.credentials.clone(), config.loop_guard.clone()),
            recorder: RunRecorder::new(task.id.clone(), attempt),
            max_rounds: task.max_rounds.unwrap_or(config.max_rounds),
            round: 0,
            observation: None,
            draft: None,
            decision_failures: 0,
            notes: Vec::new(),
        }
    }

    async fn step(&mut self, phase: Phase) -> Phase {
        match phase {
            Phase::Init => self.init().await,
            Phase::Observe => self.observe().await,
            Phase::Decide => self.decide().await,
            Phase::Validate(decision) => self.validate(decision).await,
            Phase::Execute(decision) => self.execute(decision).await,
            Phase::Evaluate { asserted } => self.evaluate(asserted),
            Phase::Terminated(termination) => Phase::Terminated(termination),
        }
    }

    async fn init(&mut self) -> Phase {
        if let Err(e) = self.task.check_credentials() {
            return self.fail_with(AgentError::Credential(e.to_string()));
        }

        if let Some(start_url) = &self.task.start_url {
            let url = normalize_url(start_url);
            debug!(task_id = %self.task.id, url = %url, "Opening start URL");
            match self.guard.run(self.session.navigate(&url)).await {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => return self.fail_with(AgentError::Session(e)),
                Err(e) => return self.fail_with(e),
            }
        }
        Phase::Observe
    }

    async fn observe(&mut self) -> Phase {
        if self.round >= self.max_rounds {
            return self.final_check().await;
        }
        self.round += 1;

        let observation = match self.capture().await {
            Ok(observation) => observation,
            Err(e) => return self.fail_with(e),
        };
        let controller = self.controller;
        let task = self.task;
        let attempt = self.recorder.attempt();
        let screenshot_path = persist_screenshot(
            controller.config.screenshot_dir.as_deref(),
            task.id.as_str(),
            attempt,
            self.round,
            &observation,
        )
        .await;
        debug!(
            task_id = %self.task.id,
            round = self.round,
            url = %observation.url,
            "Observed page"
        );

        self.draft = Some(RoundDraft {
            round: self.round,
            observation: observation.to_ref(screenshot_path),
            request_summary: String::new(),
            raw_response: None,
            command: None,
            validation: ValidationOutcome::NotRequired,
        });
        self.observation = Some(Arc::new(observation));
        Phase::Decide
    }

    async fn decide(&mut self) -> Phase {
        let mut warnings = self.memory.loop_guard().warnings();
        warnings.append(&mut self.notes);
        let request = match self.request(warnings) {
            Ok(request) => request,
            Err(e) => return self.fail_with(e),
        };
        if let Some(draft) = self.draft.as_mut() {
            draft.request_summary = request.summary();
        }

        match self.guard.run(self.controller.decider.decide(&request)).await {
            Ok(Ok(decision)) => {
                self.decision_failures = 0;
                debug!(
                    task_id = %self.task.id,
                    round = self.round,
                    action = decision.command.name(),
                    "Decided"
                );
                self.note_decision(&decision);
                Phase::Validate(decision)
            }
            Ok(Err(e)) => self.decision_failed(e),
            Err(e) => self.fail_with(e),
        }
    }

    async fn validate(&mut self, decision: Decision) -> Phase {
        let validator = PreflightValidator::new(self.controller.config.max_healing_attempts);
        let validated = validator.validate(decision, &mut *self).await;

        match validated {
            Ok(Validated { decision, outcome }) => {
                self.note_decision(&decision);
                let exhausted = match &outcome {
                    ValidationOutcome::Exhausted { reason, .. } => Some(reason.clone()),
                    _ => None,
                };
                if let Some(draft) = self.draft.as_mut() {
                    draft.validation = outcome;
                }

                match exhausted {
                    Some(reason) => {
                        let error = AgentError::ValidationMismatch(reason);
                        warn!(task_id = %self.task.id, round = self.round, error = %error, "Round not executed");
                        self.notes.push(format!(
                            "The previous action was not executed: {}.",
                            error
                        ));
                        self.finish_round(ExecutionOutcome::NotExecuted {
                            reason: error.to_string(),
                        });
                        Phase::Evaluate { asserted: None }
                    }
                    None => Phase::Execute(decision),
                }
            }
            Err(e) => self.fail_with(e),
        }
    }

    async fn execute(&mut self, decision: Decision) -> Phase {
        let command = decision.command;
        let executed = self
            .guard
            .run(executor::execute(
                &mut *self.session,
                &command,
                &self.memory,
                self.controller.config.wait_limits(),
            ))
            .await;

        match executed {
            Ok(Ok(Executed::Action(report))) => {
                let detail = self.memory.redact(&report.detail);
                self.finish_round(ExecutionOutcome::Succeeded { detail });
                self.after_action(&command)
            }
            Ok(Ok(Executed::Fact(fact))) => {
                debug!(task_id = %self.task.id, round = self.round, "Fact memorized");
                let fact = self.memory.redact(&fact);
                self.memory.remember(fact.clone());
                self.recorder.record_fact(fact);
                self.finish_round(ExecutionOutcome::Succeeded {
                    detail: "fact memorized".to_string(),
                });
                Phase::Evaluate { asserted: None }
            }
            Ok(Ok(Executed::Terminate { status, reason })) => {
                let reason = self.memory.redact(&reason);
                info!(
                    task_id = %self.task.id,
                    round = self.round,
                    status = ?status,
                    "Model terminated the attempt"
                );
                self.finish_round(ExecutionOutcome::Terminated {
                    status,
                    reason: reason.clone(),
                });
                Phase::Evaluate {
                    asserted: Some((status, reason)),
                }
            }
            Ok(Err(AgentError::Execution(error))) => {
                warn!(task_id = %self.task.id, round = self.round, error = %error, "Action failed");
                self.notes.push(format!("The previous action failed: {}.", error));
                self.finish_round(ExecutionOutcome::Failed { error });
                self.after_action(&command)
            }
            Ok(Err(e)) | Err(e) => self.fail_with(e),
        }
    }

    fn evaluate(&mut self, asserted: Option<(TerminateStatus, String)>) -> Phase {
        let verdict = asserted.as_ref().map(|(status, _)| status.asserted_verdict());

        match self.judge(verdict) {
            Evaluation::Terminal {
                verdict,
                source,
                rationale,
            } => {
                let (reason, rationale) = match asserted {
                    Some((_, model_reason)) => (
                        TerminationReason::ModelTerminate,
                        format!("{}; model: {}", rationale, model_reason),
                    ),
                    None => (TerminationReason::CriteriaMet, rationale),
                };
                Phase::Terminated(Termination::new(verdict, reason, source).with_rationale(rationale))
            }
            Evaluation::Continue => match self.guard.check() {
                Ok(()) => Phase::Observe,
                Err(e) => self.fail_with(e),
            },
        }
    }

    /// Judge the evidence once more after the last round's action.
    async fn final_check(&mut self) -> Phase {
        match self.capture().await {
            Ok(observation) => self.observation = Some(Arc::new(observation)),
            Err(e) if e.is_interrupt() => return self.fail_with(e),
            Err(e) => warn!(
                task_id = %self.task.id,
                error = %e,
                "Final capture failed, judging the last observation"
            ),
        }

        match self.judge(None) {
            Evaluation::Terminal {
                verdict,
                source,
                rationale,
            } => Phase::Terminated(
                Termination::new(verdict, TerminationReason::CriteriaMet, source)
                    .with_rationale(rationale),
            ),
            Evaluation::Continue => self.fail_with(AgentError::MaxRoundsExceeded(self.max_rounds)),
        }
    }

    fn judge(&self, asserted: Option<Verdict>) -> Evaluation {
        let evidence = match &self.observation {
            Some(observation) => Evidence::from_observation(observation, self.memory.facts()),
            None => Evidence {
                facts: self.memory.facts().to_vec(),
                ..Evidence::default()
            },
        };
        let judge = self.controller.judge.as_ref();
        let pass = judge_all(judge, &self.task.pass_criteria, CriterionKind::Pass, &evidence);
        let fail = judge_all(judge, &self.task.fail_criteria, CriterionKind::Fail, &evidence);
        evaluate(&pass, &fail, asserted)
    }

    fn after_action(&mut self, command: &ActionCommand) -> Phase {
        match self.memory.loop_guard_mut().record(command) {
            LoopCheck::Clear => Phase::Evaluate { asserted: None },
            LoopCheck::Detected(message) => {
                warn!(task_id = %self.task.id, round = self.round, "Loop detected: {}", message);
                Phase::Terminated(Termination::runtime(
                    Verdict::Fail,
                    TerminationReason::LoopDetected,
                    message,
                ))
            }
        }
    }

    fn decision_failed(&mut self, error: DecisionError) -> Phase {
        self.decision_failures += 1;
        warn!(
            task_id = %self.task.id,
            round = self.round,
            failures = self.decision_failures,
            error = %error,
            "Decision failed"
        );

        let raw = error.raw_response().map(|raw| self.memory.redact(raw));
        if let Some(draft) = self.draft.as_mut() {
            draft.raw_response = raw;
        }
        self.finish_round(ExecutionOutcome::NotExecuted {
            reason: error.to_string(),
        });

        if self.decision_failures >= self.controller.config.max_decision_failures {
            return self.fail_with(AgentError::Decision(error));
        }
        self.notes.push(format!(
            "Your previous answer could not be used ({}). Reply with exactly one tool call.",
            error
        ));
        Phase::Evaluate { asserted: None }
    }

    fn fail_with(&self, error: AgentError) -> Phase {
        let (verdict, reason) = error.termination();
        Phase::Terminated(Termination::runtime(
            verdict,
            reason,
            self.memory.redact(&error.to_string()),
        ))
    }

    fn note_decision(&mut self, decision: &Decision) {
        let raw = self.memory.redact(&decision.raw_response);
        if let Some(draft) = self.draft.as_mut() {
            draft.raw_response = Some(raw);
            draft.command = Some(decision.command.clone());
        }
    }

    fn finish_round(&mut self, execution: ExecutionOutcome) {
        if let Some(draft) = self.draft.take() {
            self.recorder.push_round(RoundRecord {
                round: draft.round,
                observation: draft.observation,
                request_summary: draft.request_summary,
                raw_response: draft.raw_response,
                command: draft.command,
                validation: draft.validation,
                execution,
                timestamp: Utc::now(),
            });
        }
    }

    fn request(&self, warnings: Vec<String>) -> Result<DecisionRequest, AgentError> {
        let observation = self.observation.clone().ok_or_else(|| {
            AgentError::Observation(ProviderError::Capture("no observation captured".into()))
        })?;
        let rounds = self.recorder.rounds();
        let window = rounds.len().saturating_sub(self.controller.config.history_window);

        Ok(DecisionRequest {
            task_id: self.task.id.clone(),
            objective: self.task.objective.clone(),
            steps: self.task.objective_steps.clone(),
            pass_criteria: self.task.pass_criteria.clone(),
            fail_criteria: self.task.fail_criteria.clone(),
            notes: self.task.notes.clone(),
            credential_names: self.memory.credential_names(),
            facts: self.memory.facts().to_vec(),
            history: rounds[window..].iter().map(RoundRecord::summary_line).collect(),
            warnings,
            round: self.round,
            max_rounds: self.max_rounds,
            observation,
        })
    }

    async fn capture(&mut self) -> Result<Observation, AgentError> {
        let mut observation = self
            .guard
            .run(self.session.capture())
            .await?
            .map_err(AgentError::Observation)?;
        self.memory.loop_guard_mut().observe_url(&observation.url);
        self.recorder.set_final_url(observation.url.clone());

        if !observation.console_errors.is_empty() {
            let errors: Vec<String> = observation
                .console_errors
                .iter()
                .map(|error| self.memory.redact(error))
                .collect();
            debug!(
                task_id = %self.task.id,
                round = self.round,
                count = errors.len(),
                "Console errors"
            );
            self.recorder.record_console_errors(&errors);
            observation.console_errors = errors;
        }
        Ok(observation)
    }

    fn seal(mut self, termination: Termination) -> RunResult {
        if self.draft.is_some() {
            let reason = termination
                .error
                .clone()
                .unwrap_or_else(|| termination.reason.to_string());
            self.finish_round(ExecutionOutcome::NotExecuted { reason });
        }
        info!(
            task_id = %self.task.id,
            attempt = self.recorder.attempt(),
            verdict = %termination.verdict,
            reason = %termination.reason,
            rounds = self.recorder.rounds_executed(),
            "Attempt finished"
        );
        self.recorder.seal(termination)
    }
}

#[async_trait]
impl<'a> HealingContext for Attempt<'a> {
    async fn probe(&mut self, target: &Target) -> Result<TargetState, AgentError> {
        self.guard
            .run(self.session.probe(target))
            .await?
            .map_err(|e| AgentError::ValidationMismatch(e.to_string()))
    }

    async fn reobserve(&mut self) -> Result<(), AgentError> {
        let observation = self.capture().await?;
        debug!(task_id = %self.task.id, round = self.round, url = %observation.url, "Re-observed page");
        self.observation = Some(Arc::new(observation));
        Ok(())
    }

    async fn redecide(&mut self, mismatch: &str) -> Result<Decision, AgentError> {
        let mut warnings = self.memory.loop_guard().warnings();
        warnings.push(mismatch.to_string());
        let request = self.request(warnings)?;
        let decision = self
            .guard
            .run(self.controller.decider.decide(&request))
            .await??;
        self.note_decision(&decision);
        Ok(decision)
    }
}

/// Write the screenshot under `<dir>/<task>/attempt-<n>/round-<k>.png`.
async fn persist_screenshot(
    root: Option<&Path>,
    task_id: &str,
    attempt: u32,
    round: u32,
    observation: &Observation,
) -> Option<PathBuf> {
    let root = root?;
    if observation.screenshot.is_empty() {
        return None;
    }
    let dir = root
        .join(path_component(task_id))
        .join(format!("attempt-{}", attempt));
    let path = dir.join(format!("round-{}.png", round));

    let written = async {
        tokio::fs::create_dir_all(&dir).await?;
        tokio::fs::write(&path, &observation.screenshot).await
    };
    match written.await {
        Ok(()) => Some(path),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to save screenshot");
            None
        }
    }
}

fn path_component(id: &str) -> String {
    id.chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') { c } else { '_' })
        .collect()
}
