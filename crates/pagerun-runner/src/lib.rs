//! pagerun run orchestration.
//!
//! Turns a selected task set into a [`RunSummary`](pagerun_core::RunSummary):
//! a worker pool drains the task queue, every task gets up to
//! `retry_count + 1` attempts on fresh browser sessions, and sealed outcomes
//! are collected by a concurrency-safe aggregator.

pub mod aggregator;
pub mod config;
pub mod error;
pub mod retry;
pub mod scheduler;
pub mod sink;

pub use aggregator::ResultAggregator;
pub use config::RunnerConfig;
pub use error::RunnerError;
pub use retry::RetryController;
pub use scheduler::Scheduler;
pub use sink::{report_all, ReportSink};
