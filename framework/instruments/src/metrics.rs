use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

pub const HTTP_REQS: &str = "http_reqs";
pub const HTTP_REQ_DURATION: &str = "http_req_duration";
pub const HTTP_REQ_FAILED: &str = "http_req_failed";
pub const CHECKS: &str = "checks";
pub const ITERATIONS: &str = "iterations";
pub const ITERATION_DURATION: &str = "iteration_duration";
pub const VUS: &str = "vus";

/// How the values recorded for a metric are aggregated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricKind {
    /// Values are summed.
    Counter,
    /// Only the latest value matters.
    Gauge,
    /// Each value is a boolean outcome, aggregated into the fraction of non-zero values.
    Rate,
    /// Values form a distribution, aggregated into statistics such as percentiles.
    Trend,
}

impl Display for MetricKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            MetricKind::Counter => "counter",
            MetricKind::Gauge => "gauge",
            MetricKind::Rate => "rate",
            MetricKind::Trend => "trend",
        };
        write!(f, "{name}")
    }
}

/// The set of metric names a collector knows about.
///
/// Thresholds may only reference registered metrics.
#[derive(Debug, Clone)]
pub struct MetricRegistry {
    kinds: BTreeMap<String, MetricKind>,
}

impl Default for MetricRegistry {
    fn default() -> Self {
        let kinds = [
            (HTTP_REQS, MetricKind::Counter),
            (HTTP_REQ_DURATION, MetricKind::Trend),
            (HTTP_REQ_FAILED, MetricKind::Rate),
            (CHECKS, MetricKind::Rate),
            (ITERATIONS, MetricKind::Counter),
            (ITERATION_DURATION, MetricKind::Trend),
            (VUS, MetricKind::Gauge),
        ]
        .into_iter()
        .map(|(name, kind)| (name.to_string(), kind))
        .collect();

        Self { kinds }
    }
}

impl MetricRegistry {
    /// Register a custom metric. Returns false if the name is already taken by a different kind.
    pub fn register(&mut self, name: &str, kind: MetricKind) -> bool {
        match self.kinds.get(name) {
            Some(existing) => *existing == kind,
            None => {
                self.kinds.insert(name.to_string(), kind);
                true
            }
        }
    }

    pub fn kind_of(&self, name: &str) -> Option<MetricKind> {
        self.kinds.get(name).copied()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.kinds.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtins_are_registered() {
        let registry = MetricRegistry::default();
        assert_eq!(Some(MetricKind::Trend), registry.kind_of(HTTP_REQ_DURATION));
        assert_eq!(Some(MetricKind::Rate), registry.kind_of(CHECKS));
        assert_eq!(None, registry.kind_of("http_req_waiting"));
    }

    #[test]
    fn conflicting_registration_is_rejected() {
        let mut registry = MetricRegistry::default();
        assert!(registry.register("deals_imported", MetricKind::Counter));
        assert!(registry.register("deals_imported", MetricKind::Counter));
        assert!(!registry.register("deals_imported", MetricKind::Trend));
        assert!(!registry.register(CHECKS, MetricKind::Trend));
    }
}
