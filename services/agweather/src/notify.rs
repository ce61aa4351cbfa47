//! Delivery of the import status report.

use anyhow::Result;
use async_trait::async_trait;
use tracing::warn;

use storage::StatusReport;

/// Receives the status report when a run finds problems.
#[async_trait]
pub trait StatusNotifier: Send + Sync {
    async fn notify(&self, report: &StatusReport) -> Result<()>;
}

/// Writes the rendered report to the log at warn level.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl StatusNotifier for LogNotifier {
    async fn notify(&self, report: &StatusReport) -> Result<()> {
        let problems = serde_json::to_value(report.problem_days().collect::<Vec<_>>())?;
        warn!(
            problem_days = report.problem_days().count(),
            problems = %problems,
            "Import problems detected:\n{}",
            report
        );
        Ok(())
    }
}
