//! Report sinks shipped with the binary.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pagerun_core::{RunSummary, Verdict};
use pagerun_runner::{ReportSink, RunnerError};
use serde::Serialize;
use std::path::PathBuf;
use tracing::info;

const REPORT_VERSION: &str = "1.0";

#[derive(Serialize)]
struct JsonReport<'a> {
    generated_at: DateTime<Utc>,
    report_version: &'static str,
    #[serde(flatten)]
    summary: &'a RunSummary,
}

/// Writes the whole run as one pretty-printed JSON document.
pub struct JsonFileSink {
    path: PathBuf,
}

impl JsonFileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl ReportSink for JsonFileSink {
    async fn report(&self, summary: &RunSummary) -> Result<(), RunnerError> {
        let report = JsonReport {
            generated_at: Utc::now(),
            report_version: REPORT_VERSION,
            summary,
        };
        let bytes =
            serde_json::to_vec_pretty(&report).map_err(|e| RunnerError::Sink(e.to_string()))?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| RunnerError::Sink(format!("{}: {}", parent.display(), e)))?;
        }
        tokio::fs::write(&self.path, bytes)
            .await
            .map_err(|e| RunnerError::Sink(format!("{}: {}", self.path.display(), e)))?;

        info!(path = %self.path.display(), "Report written");
        Ok(())
    }
}

/// Prints one line per task and the totals to stdout.
pub struct ConsoleSink;

#[async_trait]
impl ReportSink for ConsoleSink {
    async fn report(&self, summary: &RunSummary) -> Result<(), RunnerError> {
        print!("{}", render_table(summary));
        Ok(())
    }
}

fn render_table(summary: &RunSummary) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "{:<28}  {:<8}  {:>8}  {:>6}  {:>9}  {}\n",
        "TASK", "VERDICT", "ATTEMPTS", "ROUNDS", "DURATION", "REASON"
    ));
    out.push_str(&format!("{}\n", "-".repeat(84)));

    for outcome in &summary.outcomes {
        let result = outcome.result();
        let detail = result
            .rationale()
            .or(result.error())
            .map(|text| format!("{}: {}", result.reason(), truncate(text, 40)))
            .unwrap_or_else(|| result.reason().to_string());
        out.push_str(&format!(
            "{:<28}  {:<8}  {:>8}  {:>6}  {:>8.1}s  {}\n",
            truncate(outcome.task_id().as_str(), 28),
            result.verdict().as_str(),
            outcome.attempt_count(),
            result.rounds().len(),
            outcome.total_duration().as_secs_f64(),
            detail
        ));
        if let Some(last) = result.console_errors().last() {
            out.push_str(&format!(
                "{:<30}console: {} error(s), last: {}\n",
                "",
                result.console_errors().len(),
                truncate(last, 50)
            ));
        }
    }

    let counts = &summary.counts;
    out.push_str(&format!(
        "\n{} tasks: {} passed, {} failed, {} errors, {} timed out, {} skipped ({:.2}% pass rate, {:.1}s)\n",
        summary.total(),
        counts.get(Verdict::Pass),
        counts.get(Verdict::Fail),
        counts.get(Verdict::Error),
        counts.get(Verdict::Timeout),
        counts.get(Verdict::Skipped),
        summary.pass_rate,
        summary.wall_clock_ms as f64 / 1000.0
    ));
    out
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((end, _)) => format!("{}…", &text[..end]),
        None => text.to_string(),
    }
}
