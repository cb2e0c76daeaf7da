use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};

use crate::metrics::{self, MetricKind, MetricRegistry};
use crate::sample::RequestSample;
use crate::snapshot::MetricSnapshot;
use crate::tags::TagSet;

#[derive(Debug, thiserror::Error)]
pub enum CollectorError {
    #[error("Metric `{0}` is not registered")]
    UnknownMetric(String),
}

#[derive(Debug)]
struct Point {
    tags: Arc<TagSet>,
    value: f64,
}

#[derive(Debug, Default)]
struct Series {
    points: Vec<Point>,
}

/// Accumulates every value recorded during a run.
///
/// Values are kept in full for the duration of the run so that statistics can be computed for any
/// tag filter after the fact. All writes go through a single lock so concurrent `record` calls from
/// virtual users are never lost and a snapshot never sees a partially recorded request.
#[derive(Debug)]
pub struct MetricsCollector {
    registry: MetricRegistry,
    series: RwLock<HashMap<String, Series>>,
    started: Mutex<Instant>,
    finished: Mutex<Option<Instant>>,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new(MetricRegistry::default())
    }
}

impl MetricsCollector {
    pub fn new(registry: MetricRegistry) -> Self {
        Self {
            registry,
            series: RwLock::new(HashMap::new()),
            started: Mutex::new(Instant::now()),
            finished: Mutex::new(None),
        }
    }

    pub fn registry(&self) -> &MetricRegistry {
        &self.registry
    }

    /// Record the outcome of a request into `http_reqs`, `http_req_duration`, `http_req_failed`
    /// and one `checks` value per check.
    pub fn record(&self, sample: &RequestSample) {
        let tags = Arc::new(sample.tags.clone());
        let check_points = sample
            .checks
            .iter()
            .map(|check| Point {
                tags: Arc::new(sample.tags.clone().with_tag("check", check.name.clone())),
                value: bool_value(check.passed),
            })
            .collect::<Vec<_>>();

        let mut series = self.series.write();
        push(&mut series, metrics::HTTP_REQS, tags.clone(), 1.0);
        push(
            &mut series,
            metrics::HTTP_REQ_DURATION,
            tags.clone(),
            sample.duration_ms(),
        );
        push(
            &mut series,
            metrics::HTTP_REQ_FAILED,
            tags,
            bool_value(sample.failed),
        );
        series
            .entry(metrics::CHECKS.to_string())
            .or_default()
            .points
            .extend(check_points);
    }

    /// Record a completed workload iteration.
    pub fn record_iteration(&self, tags: &TagSet, duration: Duration) {
        let tags = Arc::new(tags.clone());
        let mut series = self.series.write();
        push(&mut series, metrics::ITERATIONS, tags.clone(), 1.0);
        push(
            &mut series,
            metrics::ITERATION_DURATION,
            tags,
            duration.as_secs_f64() * 1000.0,
        );
    }

    /// Record a value for any registered metric, including custom metrics.
    pub fn add(&self, name: &str, tags: &TagSet, value: f64) -> Result<(), CollectorError> {
        if self.registry.kind_of(name).is_none() {
            return Err(CollectorError::UnknownMetric(name.to_string()));
        }

        push(
            &mut self.series.write(),
            name,
            Arc::new(tags.clone()),
            value,
        );
        Ok(())
    }

    /// Aggregate view of `metric` over every value whose tags contain all of `filter`.
    ///
    /// Returns `None` for a metric that isn't registered. A registered metric with no matching
    /// values gives an empty snapshot.
    ///
    /// Gauges recorded under different tag sets are combined: each value in the snapshot is the sum
    /// of the latest value of every matching tag set at that point, so the `vus` of two concurrent
    /// scenarios add up.
    pub fn snapshot(&self, metric: &str, filter: &TagSet) -> Option<MetricSnapshot> {
        let kind = self.registry.kind_of(metric)?;
        let series = self.series.read();
        let points = series
            .get(metric)
            .map(|series| {
                series
                    .points
                    .iter()
                    .filter(|p| p.tags.contains_all(filter))
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();

        let values = match kind {
            MetricKind::Gauge => combine_gauge(&points),
            _ => points.iter().map(|p| p.value).collect(),
        };

        Some(MetricSnapshot::new(kind, values, self.elapsed()))
    }

    /// Names of metrics that have at least one value, with their kind, sorted by name.
    pub fn recorded_metrics(&self) -> Vec<(String, MetricKind)> {
        let series = self.series.read();
        let mut names = series
            .iter()
            .filter(|(_, s)| !s.points.is_empty())
            .filter_map(|(name, _)| Some((name.clone(), self.registry.kind_of(name)?)))
            .collect::<Vec<_>>();
        names.sort_by(|a, b| a.0.cmp(&b.0));
        names
    }

    /// Distinct values of tag `key` seen on `metric`, sorted.
    pub fn tag_values(&self, metric: &str, key: &str) -> Vec<String> {
        let series = self.series.read();
        let mut values = series
            .get(metric)
            .map(|s| {
                s.points
                    .iter()
                    .filter_map(|p| p.tags.get(key).map(str::to_string))
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();
        values.sort();
        values.dedup();
        values
    }

    /// Stop the run clock used for per-second rates.
    pub fn finish(&self) {
        self.finished.lock().get_or_insert_with(Instant::now);
    }

    pub fn elapsed(&self) -> Duration {
        let started = *self.started.lock();
        match *self.finished.lock() {
            Some(finished) => finished.duration_since(started),
            None => started.elapsed(),
        }
    }

    /// Drop every recorded value and restart the run clock.
    pub fn reset(&self) {
        self.series.write().clear();
        *self.started.lock() = Instant::now();
        *self.finished.lock() = None;
    }
}

fn push(series: &mut HashMap<String, Series>, name: &str, tags: Arc<TagSet>, value: f64) {
    series
        .entry(name.to_string())
        .or_default()
        .points
        .push(Point { tags, value });
}

fn combine_gauge(points: &[&Point]) -> Vec<f64> {
    let mut latest: HashMap<&TagSet, f64> = HashMap::new();
    points
        .iter()
        .map(|p| {
            latest.insert(p.tags.as_ref(), p.value);
            latest.values().sum::<f64>()
        })
        .collect()
}

fn bool_value(b: bool) -> f64 {
    if b {
        1.0
    } else {
        0.0
    }
}
