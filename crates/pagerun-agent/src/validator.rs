//! Pre-flight validation with self-healing.
//!
//! Before a targeted action runs, its target is probed. On a mismatch the
//! page is re-observed and probed again; if the target is still unusable a
//! fresh decision is requested with the mismatch reported, up to
//! `max_healing_attempts` times. None of this opens a new round.

use crate::decision::Decision;
use crate::error::AgentError;
use crate::provider::TargetState;
use async_trait::async_trait;
use pagerun_core::{Target, ValidationOutcome};
use tracing::{debug, info, warn};

/// The parts of an attempt the validator may use while healing.
#[async_trait]
pub trait HealingContext: Send {
    async fn probe(&mut self, target: &Target) -> Result<TargetState, AgentError>;

    /// Refresh the current observation without starting a round.
    async fn reobserve(&mut self) -> Result<(), AgentError>;

    /// Ask for a new decision, reporting `mismatch` to the model.
    async fn redecide(&mut self, mismatch: &str) -> Result<Decision, AgentError>;
}

/// A decision that passed (or exhausted) validation.
#[derive(Debug, Clone, PartialEq)]
pub struct Validated {
    /// The decision to execute; differs from the input after healing.
    pub decision: Decision,
    pub outcome: ValidationOutcome,
}

/// Probes targets and heals stale decisions.
#[derive(Debug, Clone, Copy)]
pub struct PreflightValidator {
    max_healing_attempts: u32,
}

impl PreflightValidator {
    pub fn new(max_healing_attempts: u32) -> Self {
        Self {
            max_healing_attempts,
        }
    }

    /// Validate `decision`, healing if needed.
    ///
    /// Interruptions and observation failures are returned as errors;
    /// an unusable target is reported through `ValidationOutcome::Exhausted`.
    pub async fn validate(
        &self,
        decision: Decision,
        ctx: &mut dyn HealingContext,
    ) -> Result<Validated, AgentError> {
        let mut decision = decision;
        let mut healing_attempts = 0;

        loop {
            let Some(target) = decision.command.target() else {
                let outcome = if healing_attempts == 0 {
                    ValidationOutcome::NotRequired
                } else {
                    ValidationOutcome::Valid {
                        healing_attempts,
                        healed_by_reobserve: false,
                    }
                };
                return Ok(Validated { decision, outcome });
            };

            let Some(mismatch) = check(ctx, &target).await? else {
                return Ok(Validated {
                    decision,
                    outcome: ValidationOutcome::Valid {
                        healing_attempts,
                        healed_by_reobserve: false,
                    },
                });
            };
            debug!(action_target = %target, mismatch = %mismatch, "Target mismatch, re-observing");

            ctx.reobserve().await?;
            let Some(mismatch) = check(ctx, &target).await? else {
                info!(action_target = %target, "Target healed by re-observation");
                return Ok(Validated {
                    decision,
                    outcome: ValidationOutcome::Valid {
                        healing_attempts,
                        healed_by_reobserve: true,
                    },
                });
            };

            if healing_attempts >= self.max_healing_attempts {
                warn!(action_target = %target, healing_attempts, "Healing attempts exhausted");
                return Ok(Validated {
                    decision,
                    outcome: ValidationOutcome::Exhausted {
                        healing_attempts,
                        reason: format!("{} at {}", mismatch, target),
                    },
                });
            }

            healing_attempts += 1;
            info!(action_target = %target, healing_attempts, "Requesting a fresh decision");
            let report = format!(
                "Your last action targeted {} but {}. Choose a different action.",
                target, mismatch
            );
            match ctx.redecide(&report).await {
                Ok(fresh) => decision = fresh,
                Err(AgentError::Decision(e)) => {
                    warn!(error = %e, "Fresh decision failed during healing");
                }
                Err(e) => return Err(e),
            }
        }
    }
}

async fn check(ctx: &mut dyn HealingContext, target: &Target) -> Result<Option<String>, AgentError> {
    match ctx.probe(target).await {
        Ok(state) => Ok(state.mismatch().map(str::to_string)),
        Err(e) if e.is_interrupt() => Err(e),
        Err(e) => Ok(Some(e.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decision::DecisionError;
    use pagerun_core::{ActionCommand, Point};
    use std::collections::VecDeque;

    struct ScriptedContext {
        probes: VecDeque<TargetState>,
        decisions: VecDeque<Result<Decision, AgentError>>,
        reobserved: u32,
        mismatches: Vec<String>,
    }

    impl ScriptedContext {
        fn new(probes: Vec<TargetState>) -> Self {
            Self {
                probes: probes.into(),
                decisions: VecDeque::new(),
                reobserved: 0,
                mismatches: Vec::new(),
            }
        }
    }

    #[async_trait]
    impl HealingContext for ScriptedContext {
        async fn probe(&mut self, _target: &Target) -> Result<TargetState, AgentError> {
            Ok(self.probes.pop_front().unwrap_or_else(TargetState::missing))
        }

        async fn reobserve(&mut self) -> Result<(), AgentError> {
            self.reobserved += 1;
            Ok(())
        }

        async fn redecide(&mut self, mismatch: &str) -> Result<Decision, AgentError> {
            self.mismatches.push(mismatch.to_string());
            self.decisions
                .pop_front()
                .unwrap_or_else(|| Err(AgentError::Decision(DecisionError::Unavailable("none".into()))))
        }
    }

    fn click(x: f64) -> Decision {
        Decision::new(
            ActionCommand::Click {
                point: Point::new(x, 10.0),
            },
            "raw",
        )
    }

    #[tokio::test]
    async fn test_untargeted_action_needs_no_validation() {
        let mut ctx = ScriptedContext::new(vec![]);
        let decision = Decision::new(ActionCommand::Reload, "raw");
        let validated = PreflightValidator::new(2)
            .validate(decision, &mut ctx)
            .await
            .unwrap();
        assert_eq!(validated.outcome, ValidationOutcome::NotRequired);
    }

    #[tokio::test]
    async fn test_valid_target() {
        let mut ctx = ScriptedContext::new(vec![TargetState::interactable("button")]);
        let validated = PreflightValidator::new(2)
            .validate(click(1.0), &mut ctx)
            .await
            .unwrap();
        assert_eq!(
            validated.outcome,
            ValidationOutcome::Valid {
                healing_attempts: 0,
                healed_by_reobserve: false
            }
        );
        assert_eq!(ctx.reobserved, 0);
    }

    #[tokio::test]
    async fn test_healed_by_reobservation() {
        let mut ctx = ScriptedContext::new(vec![
            TargetState::missing(),
            TargetState::interactable("button"),
        ]);
        let validated = PreflightValidator::new(2)
            .validate(click(1.0), &mut ctx)
            .await
            .unwrap();
        assert_eq!(
            validated.outcome,
            ValidationOutcome::Valid {
                healing_attempts: 0,
                healed_by_reobserve: true
            }
        );
        assert_eq!(validated.decision, click(1.0));
        assert!(ctx.mismatches.is_empty());
    }

    #[tokio::test]
    async fn test_healed_by_fresh_decision() {
        let mut ctx = ScriptedContext::new(vec![
            TargetState::missing(),
            TargetState::missing(),
            TargetState::interactable("link"),
        ]);
        ctx.decisions.push_back(Ok(click(2.0)));

        let validated = PreflightValidator::new(2)
            .validate(click(1.0), &mut ctx)
            .await
            .unwrap();
        assert_eq!(validated.decision, click(2.0));
        assert_eq!(validated.outcome.healing_attempts(), 1);
        assert_eq!(ctx.mismatches.len(), 1);
        assert!(ctx.mismatches[0].contains("no element at target"));
    }

    #[tokio::test]
    async fn test_exhausted() {
        let mut ctx = ScriptedContext::new(vec![]);
        ctx.decisions.push_back(Ok(click(2.0)));
        ctx.decisions.push_back(Ok(click(3.0)));

        let validated = PreflightValidator::new(2)
            .validate(click(1.0), &mut ctx)
            .await
            .unwrap();
        assert!(validated.outcome.is_exhausted());
        assert_eq!(validated.outcome.healing_attempts(), 2);
        assert_eq!(validated.decision, click(3.0));
        assert_eq!(ctx.reobserved, 3);
    }

    #[tokio::test]
    async fn test_zero_attempts_exhausts_immediately() {
        let mut ctx = ScriptedContext::new(vec![]);
        let validated = PreflightValidator::new(0)
            .validate(click(1.0), &mut ctx)
            .await
            .unwrap();
        assert!(validated.outcome.is_exhausted());
        assert!(ctx.mismatches.is_empty());
    }
}
