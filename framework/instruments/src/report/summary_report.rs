mod tables;

use std::fmt::Write;

use tabled::settings::Style;
use tabled::Table;

use crate::collector::MetricsCollector;
use crate::metrics::{self, MetricKind};
use crate::report::summary_report::tables::{MetricRow, RequestRow, ThresholdRow};
use crate::report::ReportCollector;
use crate::result::RunResult;
use crate::tags::TagSet;

/// Prints a human readable summary of the run at the end: every metric, a per request name
/// breakdown and the outcome of each threshold.
#[derive(Debug, Default)]
pub struct SummaryReportCollector;

impl SummaryReportCollector {
    pub fn new() -> Self {
        Self
    }
}

impl ReportCollector for SummaryReportCollector {
    fn finalize(&self, collector: &MetricsCollector, result: &RunResult) {
        println!("{}", render_summary(collector, result));
    }
}

/// Render the end of run summary as text.
pub fn render_summary(collector: &MetricsCollector, result: &RunResult) -> String {
    let mut out = String::new();

    let metric_rows = result
        .metrics
        .iter()
        .map(|m| MetricRow {
            metric: m.name.clone(),
            kind: m.kind.to_string(),
            values: format_stats(m.kind, &m.stats),
        })
        .collect::<Vec<_>>();
    if !metric_rows.is_empty() {
        let _ = writeln!(out, "\nSummary of metrics");
        let _ = writeln!(out, "{}", Table::new(metric_rows).with(Style::modern()));
    }

    let request_rows = request_rows(collector);
    if !request_rows.is_empty() {
        let _ = writeln!(out, "\nSummary of requests");
        let _ = writeln!(out, "{}", Table::new(request_rows).with(Style::modern()));
    }

    if !result.thresholds.is_empty() {
        let threshold_rows = result
            .thresholds
            .iter()
            .map(|t| ThresholdRow {
                metric: t.selector.clone(),
                threshold: t.expression.clone(),
                measured: t
                    .value
                    .map(|v| format!("{v:.4}"))
                    .unwrap_or_else(|| "no data".to_string()),
                status: if t.passed { "✓ pass" } else { "✗ fail" }.to_string(),
            })
            .collect::<Vec<_>>();
        let _ = writeln!(out, "\nThresholds");
        let _ = writeln!(out, "{}", Table::new(threshold_rows).with(Style::modern()));
    }

    let verdict = match (result.passed, result.aborted) {
        (true, _) => "PASSED",
        (false, true) => "ABORTED (threshold breached)",
        (false, false) => "FAILED",
    };
    let _ = writeln!(out, "\nRun {verdict}");

    out
}

fn request_rows(collector: &MetricsCollector) -> Vec<RequestRow> {
    collector
        .tag_values(metrics::HTTP_REQ_DURATION, "name")
        .into_iter()
        .filter_map(|name| {
            let filter = TagSet::new().with_tag("name", name.clone());
            let durations = collector.snapshot(metrics::HTTP_REQ_DURATION, &filter)?;
            let failed = collector.snapshot(metrics::HTTP_REQ_FAILED, &filter)?;

            Some(RequestRow {
                name,
                total_requests: durations.samples(),
                avg_time_ms: durations.avg()?,
                min_time_ms: durations.min()?,
                p95_time_ms: durations.percentile(95.0)?,
                max_time_ms: durations.max()?,
                failed: failed.rate().unwrap_or_default(),
            })
        })
        .collect()
}

fn format_stats(kind: MetricKind, stats: &[(String, f64)]) -> String {
    stats
        .iter()
        .map(|(label, value)| match (kind, label.as_str()) {
            (MetricKind::Rate, "rate") => format!("{:.2}%", value * 100.0),
            (MetricKind::Rate, "passes") => format!("✓ {value}"),
            (MetricKind::Rate, "fails") => format!("✗ {value}"),
            (MetricKind::Counter, "rate") => format!("{value:.2}/s"),
            (MetricKind::Trend, "count") => format!("count={value}"),
            (MetricKind::Trend, _) => format!("{label}={value:.2}ms"),
            _ => format!("{label}={value}"),
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::{CheckOutcome, RequestSample};
    use crate::threshold::{evaluate, ThresholdSpec};
    use std::time::Duration;

    #[test]
    fn summary_lists_thresholds_with_measured_values() {
        let collector = MetricsCollector::default();
        for status in [200, 200, 500] {
            collector.record(&RequestSample {
                tags: TagSet::new().with_tag("name", "list_deals"),
                status: Some(status),
                duration: Duration::from_millis(40),
                checks: vec![CheckOutcome::new("status is 200", status == 200)],
                failed: status >= 400,
                error: None,
            });
        }

        let result = evaluate(
            &[
                ThresholdSpec::parse("checks", "rate > 0.99").unwrap(),
                ThresholdSpec::parse("http_req_duration", "p(95) < 500").unwrap(),
            ],
            &collector,
        );
        let summary = render_summary(&collector, &result);

        assert!(summary.contains("rate > 0.99"));
        assert!(summary.contains("p(95) < 500"));
        assert!(summary.contains("✗ fail"));
        assert!(summary.contains("✓ pass"));
        assert!(summary.contains("list_deals"));
        assert!(summary.contains("Run FAILED"));
    }
}
