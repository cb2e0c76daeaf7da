use std::time::Duration;

use crate::metrics::MetricKind;

/// A point in time aggregate view of the values recorded for one metric under a tag filter.
#[derive(Debug, Clone)]
pub struct MetricSnapshot {
    kind: MetricKind,
    /// Sorted ascending for trends, in recording order for every other kind.
    values: Vec<f64>,
    elapsed: Duration,
}

impl MetricSnapshot {
    pub(crate) fn new(kind: MetricKind, mut values: Vec<f64>, elapsed: Duration) -> Self {
        if kind == MetricKind::Trend {
            values.sort_by(f64::total_cmp);
        }

        Self {
            kind,
            values,
            elapsed,
        }
    }

    pub fn kind(&self) -> MetricKind {
        self.kind
    }

    /// Number of values recorded.
    pub fn samples(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// The count reported for this metric: the sum for counters, the number of samples otherwise.
    pub fn count(&self) -> f64 {
        match self.kind {
            MetricKind::Counter => self.values.iter().sum(),
            _ => self.values.len() as f64,
        }
    }

    /// Number of non-zero values, which for a rate metric is the number of `true` outcomes.
    pub fn passes(&self) -> usize {
        self.values.iter().filter(|v| **v != 0.0).count()
    }

    pub fn fails(&self) -> usize {
        self.values.len() - self.passes()
    }

    /// For rate metrics, the fraction of non-zero values. For counters, the sum per second of run
    /// time.
    pub fn rate(&self) -> Option<f64> {
        if self.values.is_empty() {
            return None;
        }

        match self.kind {
            MetricKind::Counter => {
                let secs = self.elapsed.as_secs_f64();
                if secs > 0.0 {
                    Some(self.count() / secs)
                } else {
                    None
                }
            }
            _ => Some(self.passes() as f64 / self.values.len() as f64),
        }
    }

    pub fn min(&self) -> Option<f64> {
        self.values.iter().copied().min_by(f64::total_cmp)
    }

    pub fn max(&self) -> Option<f64> {
        self.values.iter().copied().max_by(f64::total_cmp)
    }

    pub fn avg(&self) -> Option<f64> {
        if self.values.is_empty() {
            None
        } else {
            Some(self.values.iter().sum::<f64>() / self.values.len() as f64)
        }
    }

    pub fn med(&self) -> Option<f64> {
        self.percentile(50.0)
    }

    /// The most recently recorded value.
    pub fn last(&self) -> Option<f64> {
        match self.kind {
            // Trend values are sorted so the recording order is lost.
            MetricKind::Trend => None,
            _ => self.values.last().copied(),
        }
    }

    /// The `p`th percentile, linearly interpolated between the closest ranks.
    ///
    /// `p` is clamped into `0..=100`. Only meaningful for trends.
    pub fn percentile(&self, p: f64) -> Option<f64> {
        if self.kind != MetricKind::Trend {
            return None;
        }
        percentile_of_sorted(&self.values, p)
    }
}

pub(crate) fn percentile_of_sorted(sorted: &[f64], p: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }

    let p = p.clamp(0.0, 100.0);
    let rank = p / 100.0 * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let weight = rank - lower as f64;

    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * weight)
}
