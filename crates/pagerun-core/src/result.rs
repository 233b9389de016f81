//! Attempt results and per-task outcomes.

use crate::{RoundRecord, TaskId, TerminationReason, Verdict, VerdictSource};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Console errors kept from one observation.
pub const CONSOLE_ERRORS_PER_OBSERVATION: usize = 5;

/// How an attempt ended. Passed to [`RunRecorder::seal`].
#[derive(Debug, Clone, PartialEq)]
pub struct Termination {
    pub verdict: Verdict,
    pub reason: TerminationReason,
    pub source: VerdictSource,
    pub error: Option<String>,
    pub rationale: Option<String>,
}

impl Termination {
    pub fn new(verdict: Verdict, reason: TerminationReason, source: VerdictSource) -> Self {
        Self {
            verdict,
            reason,
            source,
            error: None,
            rationale: None,
        }
    }

    /// A runtime-imposed termination carrying an error message.
    pub fn runtime(verdict: Verdict, reason: TerminationReason, error: impl Into<String>) -> Self {
        Self::new(verdict, reason, VerdictSource::Runtime).with_error(error)
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn with_rationale(mut self, rationale: impl Into<String>) -> Self {
        self.rationale = Some(rationale.into());
        self
    }
}

/// Mutable, in-progress record of one attempt. Owned by the worker running it.
#[derive(Debug)]
pub struct RunRecorder {
    task_id: TaskId,
    attempt: u32,
    started_at: DateTime<Utc>,
    started: Instant,
    rounds: Vec<RoundRecord>,
    facts: Vec<String>,
    console_errors: Vec<String>,
    final_url: Option<String>,
}

impl RunRecorder {
    pub fn new(task_id: TaskId, attempt: u32) -> Self {
        Self {
            task_id,
            attempt,
            started_at: Utc::now(),
            started: Instant::now(),
            rounds: Vec::new(),
            facts: Vec::new(),
            console_errors: Vec::new(),
            final_url: None,
        }
    }

    pub fn task_id(&self) -> &TaskId {
        &self.task_id
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Append a round. Round indices must increase.
    pub fn push_round(&mut self, record: RoundRecord) {
        debug_assert!(
            self.rounds.last().map_or(true, |last| last.round < record.round),
            "round records must be appended in order"
        );
        self.rounds.push(record);
    }

    pub fn rounds(&self) -> &[RoundRecord] {
        &self.rounds
    }

    pub fn rounds_executed(&self) -> u32 {
        self.rounds.len() as u32
    }

    pub fn record_fact(&mut self, fact: impl Into<String>) {
        self.facts.push(fact.into());
    }

    pub fn facts(&self) -> &[String] {
        &self.facts
    }

    /// Keep the newest console errors of one observation.
    pub fn record_console_errors(&mut self, errors: &[String]) {
        let skip = errors.len().saturating_sub(CONSOLE_ERRORS_PER_OBSERVATION);
        self.console_errors.extend(errors[skip..].iter().cloned());
    }

    pub fn console_errors(&self) -> &[String] {
        &self.console_errors
    }

    pub fn set_final_url(&mut self, url: impl Into<String>) {
        self.final_url = Some(url.into());
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Seal the attempt. The recorder is consumed, so nothing can be
    /// appended afterwards.
    pub fn seal(self, termination: Termination) -> RunResult {
        let duration = self.started.elapsed();
        RunResult {
            task_id: self.task_id,
            attempt: self.attempt,
            rounds: self.rounds,
            verdict: termination.verdict,
            reason: termination.reason,
            verdict_source: termination.source,
            rationale: termination.rationale,
            error: termination.error,
            facts: self.facts,
            console_errors: self.console_errors,
            final_url: self.final_url,
            started_at: self.started_at,
            duration_ms: duration.as_millis() as u64,
        }
    }
}

/// Sealed result of one attempt. Read-only once produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    task_id: TaskId,
    attempt: u32,
    rounds: Vec<RoundRecord>,
    verdict: Verdict,
    reason: TerminationReason,
    verdict_source: VerdictSource,
    #[serde(default)]
    rationale: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    facts: Vec<String>,
    #[serde(default)]
    console_errors: Vec<String>,
    #[serde(default)]
    final_url: Option<String>,
    started_at: DateTime<Utc>,
    duration_ms: u64,
}

impl RunResult {
    /// Result for a task that was never started because it is marked skipped.
    pub fn skipped(task_id: TaskId, reason: Option<String>) -> Self {
        let mut termination = Termination::new(
            Verdict::Skipped,
            TerminationReason::Skipped,
            VerdictSource::Runtime,
        );
        termination.rationale = reason;
        RunRecorder::new(task_id, 0).seal(termination)
    }

    /// Result for a task that was still queued when the run was cancelled.
    pub fn cancelled(task_id: TaskId) -> Self {
        RunRecorder::new(task_id, 0).seal(Termination::runtime(
            Verdict::Error,
            TerminationReason::Cancelled,
            "run cancelled before the task started",
        ))
    }

    pub fn task_id(&self) -> &TaskId {
        &self.task_id
    }

    /// 1-based attempt number; 0 when the task never ran.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn rounds(&self) -> &[RoundRecord] {
        &self.rounds
    }

    pub fn verdict(&self) -> Verdict {
        self.verdict
    }

    pub fn reason(&self) -> TerminationReason {
        self.reason
    }

    pub fn verdict_source(&self) -> VerdictSource {
        self.verdict_source
    }

    pub fn rationale(&self) -> Option<&str> {
        self.rationale.as_deref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn facts(&self) -> &[String] {
        &self.facts
    }

    /// Browser console errors seen during the attempt, oldest first.
    pub fn console_errors(&self) -> &[String] {
        &self.console_errors
    }

    pub fn final_url(&self) -> Option<&str> {
        self.final_url.as_deref()
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms)
    }
}

/// Everything recorded for one task: the reported result plus every attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskOutcome {
    /// The reported result: the first PASS, or the last attempt.
    result: RunResult,
    /// Earlier attempts, oldest first.
    #[serde(default)]
    previous_attempts: Vec<RunResult>,
}

impl TaskOutcome {
    pub fn new(result: RunResult) -> Self {
        Self {
            result,
            previous_attempts: Vec::new(),
        }
    }

    pub fn with_previous(result: RunResult, previous_attempts: Vec<RunResult>) -> Self {
        Self {
            result,
            previous_attempts,
        }
    }

    pub fn task_id(&self) -> &TaskId {
        self.result.task_id()
    }

    pub fn result(&self) -> &RunResult {
        &self.result
    }

    pub fn verdict(&self) -> Verdict {
        self.result.verdict()
    }

    /// Number of attempts made; 0 for skipped or never-started tasks.
    pub fn attempt_count(&self) -> usize {
        if self.result.attempt() == 0 {
            0
        } else {
            self.previous_attempts.len() + 1
        }
    }

    /// All attempts, oldest first.
    pub fn attempts(&self) -> impl Iterator<Item = &RunResult> {
        self.previous_attempts
            .iter()
            .chain(std::iter::once(&self.result))
    }

    /// Time spent across every attempt.
    pub fn total_duration(&self) -> Duration {
        self.attempts().map(RunResult::duration).sum()
    }
}
