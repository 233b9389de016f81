//! pagerun agent loop.
//!
//! Drives one attempt of a test task through bounded
//! observe / decide / validate / execute / evaluate rounds against a live
//! browser session. The browser and the decision model are reached only
//! through the traits in [`provider`] and [`decision`].

pub mod config;
pub mod controller;
pub mod decision;
pub mod error;
pub mod evaluator;
pub mod executor;
pub mod memory;
pub mod provider;
pub mod validator;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use config::{AgentConfig, LoopGuardConfig, WaitLimits};
pub use controller::RoundController;
pub use decision::{Decision, DecisionError, DecisionRequest, DecisionService};
pub use error::AgentError;
pub use evaluator::{
    evaluate, judge_all, CriteriaJudge, CriterionJudgment, CriterionKind, Evaluation, Evidence,
    EvidenceJudge, Judgment,
};
pub use executor::Executed;
pub use memory::{LoopGuard, WorkingMemory};
pub use provider::{
    ActionReport, BrowserSession, Observation, ProviderError, SessionFactory, TargetState, Viewport,
};
pub use validator::{HealingContext, PreflightValidator, Validated};
