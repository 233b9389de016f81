//! Report sinks.

use crate::error::RunnerError;
use async_trait::async_trait;
use pagerun_core::RunSummary;

/// Receives the finished run. Outcomes in the summary are in dispatch order.
#[async_trait]
pub trait ReportSink: Send + Sync {
    async fn report(&self, summary: &RunSummary) -> Result<(), RunnerError>;
}

/// Deliver `summary` to every sink, stopping at the first failure.
pub async fn report_all(
    sinks: &[Box<dyn ReportSink>],
    summary: &RunSummary,
) -> Result<(), RunnerError> {
    for sink in sinks {
        sink.report(summary).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pagerun_core::RunId;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    struct Recording(Arc<Mutex<Vec<String>>>);

    #[async_trait]
    impl ReportSink for Recording {
        async fn report(&self, summary: &RunSummary) -> Result<(), RunnerError> {
            self.0.lock().unwrap().push(summary.run_id.to_string());
            Ok(())
        }
    }

    struct Broken;

    #[async_trait]
    impl ReportSink for Broken {
        async fn report(&self, _summary: &RunSummary) -> Result<(), RunnerError> {
            Err(RunnerError::Sink("disk full".into()))
        }
    }

    #[tokio::test]
    async fn test_report_all_stops_at_failure() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sinks: Vec<Box<dyn ReportSink>> = vec![
            Box::new(Recording(seen.clone())),
            Box::new(Broken),
            Box::new(Recording(seen.clone())),
        ];
        let summary = RunSummary::build(RunId::new("r1"), Vec::new(), Vec::new(), Duration::ZERO);

        let err = report_all(&sinks, &summary).await.unwrap_err();
        assert!(err.to_string().contains("disk full"));
        assert_eq!(*seen.lock().unwrap(), vec!["r1".to_string()]);
    }
}
