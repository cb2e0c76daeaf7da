mod summary_report;

use crate::collector::MetricsCollector;
use crate::result::RunResult;

pub use summary_report::{render_summary, SummaryReportCollector};

/// Receives the final state of a run once every virtual user has stopped.
pub trait ReportCollector: Send + Sync {
    fn finalize(&self, collector: &MetricsCollector, result: &RunResult);
}

/// Discards the report. Useful for tests and when only the exit code matters.
#[derive(Debug, Default)]
pub struct NoopReportCollector;

impl ReportCollector for NoopReportCollector {
    fn finalize(&self, _collector: &MetricsCollector, _result: &RunResult) {}
}
