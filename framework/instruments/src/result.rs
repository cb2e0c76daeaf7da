use crate::metrics::MetricKind;
use crate::snapshot::MetricSnapshot;

/// The outcome of one threshold.
#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdResult {
    pub selector: String,
    pub expression: String,
    /// The measured value, `None` if no samples matched the selector.
    pub value: Option<f64>,
    pub passed: bool,
    pub abort_on_fail: bool,
}

/// Headline statistics for one metric across the whole run.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricAggregate {
    pub name: String,
    pub kind: MetricKind,
    pub samples: usize,
    pub stats: Vec<(String, f64)>,
}

impl MetricAggregate {
    pub fn from_snapshot(name: &str, snapshot: &MetricSnapshot) -> Self {
        let mut stats = Vec::new();
        let mut push = |label: &str, value: Option<f64>| {
            if let Some(value) = value {
                stats.push((label.to_string(), value));
            }
        };

        match snapshot.kind() {
            MetricKind::Trend => {
                push("avg", snapshot.avg());
                push("min", snapshot.min());
                push("med", snapshot.med());
                push("max", snapshot.max());
                push("p(90)", snapshot.percentile(90.0));
                push("p(95)", snapshot.percentile(95.0));
                push("p(99)", snapshot.percentile(99.0));
                push("count", Some(snapshot.count()));
            }
            MetricKind::Rate => {
                push("rate", snapshot.rate());
                push("passes", Some(snapshot.passes() as f64));
                push("fails", Some(snapshot.fails() as f64));
            }
            MetricKind::Counter => {
                push("count", Some(snapshot.count()));
                push("rate", snapshot.rate());
            }
            MetricKind::Gauge => {
                push("value", snapshot.last());
                push("min", snapshot.min());
                push("max", snapshot.max());
            }
        }

        Self {
            name: name.to_string(),
            kind: snapshot.kind(),
            samples: snapshot.samples(),
            stats,
        }
    }

    pub fn stat(&self, label: &str) -> Option<f64> {
        self.stats
            .iter()
            .find(|(l, _)| l == label)
            .map(|(_, v)| *v)
    }
}

/// The verdict of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunResult {
    pub thresholds: Vec<ThresholdResult>,
    pub metrics: Vec<MetricAggregate>,
    pub passed: bool,
    /// The run was stopped early by an `abort_on_fail` threshold.
    pub aborted: bool,
}

impl RunResult {
    pub fn new(thresholds: Vec<ThresholdResult>, metrics: Vec<MetricAggregate>) -> Self {
        let passed = thresholds.iter().all(|t| t.passed);
        Self {
            thresholds,
            metrics,
            passed,
            aborted: false,
        }
    }

    /// Mark the run as aborted, which always fails it.
    pub fn into_aborted(mut self) -> Self {
        self.aborted = true;
        self.passed = false;
        self
    }

    pub fn failed_thresholds(&self) -> impl Iterator<Item = &ThresholdResult> {
        self.thresholds.iter().filter(|t| !t.passed)
    }

    pub fn metric(&self, name: &str) -> Option<&MetricAggregate> {
        self.metrics.iter().find(|m| m.name == name)
    }
}
