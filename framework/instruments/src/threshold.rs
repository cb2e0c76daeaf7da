use std::fmt::{Display, Formatter};
use std::time::Duration;

use crate::collector::MetricsCollector;
use crate::metrics::{MetricKind, MetricRegistry};
use crate::result::{MetricAggregate, RunResult, ThresholdResult};
use crate::snapshot::MetricSnapshot;
use crate::tags::TagSet;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ThresholdError {
    #[error("Empty metric selector")]
    EmptySelector,
    #[error("Invalid metric selector `{0}`")]
    InvalidSelector(String),
    #[error("Threshold `{0}` has no comparison operator, expected one of <, <=, >, >=")]
    MissingOperator(String),
    #[error("Unknown aggregation `{0}`")]
    UnknownAggregation(String),
    #[error("Invalid percentile in `{0}`, expected p(N) with 0 <= N <= 100")]
    InvalidPercentile(String),
    #[error("Invalid threshold bound `{0}`")]
    InvalidBound(String),
    #[error("Threshold on `{0}` references a metric that is not tracked")]
    UnknownMetric(String),
    #[error("Aggregation `{aggregation}` is not supported for {kind} metric `{metric}`")]
    UnsupportedAggregation {
        metric: String,
        kind: MetricKind,
        aggregation: Aggregation,
    },
}

/// A metric name with an optional tag filter, as written in `http_req_duration{name:list_deals}`.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricSelector {
    pub metric: String,
    pub filter: TagSet,
}

impl MetricSelector {
    pub fn parse(input: &str) -> Result<Self, ThresholdError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(ThresholdError::EmptySelector);
        }

        let (metric, filter) = match input.find('{') {
            None => (input, TagSet::new()),
            Some(open) => {
                let inner = input[open + 1..]
                    .strip_suffix('}')
                    .ok_or_else(|| ThresholdError::InvalidSelector(input.to_string()))?;
                (&input[..open], parse_tag_filter(inner, input)?)
            }
        };

        let metric = metric.trim();
        if metric.is_empty()
            || !metric
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(ThresholdError::InvalidSelector(input.to_string()));
        }

        Ok(Self {
            metric: metric.to_string(),
            filter,
        })
    }
}

impl Display for MetricSelector {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", self.metric, self.filter)
    }
}

fn parse_tag_filter(inner: &str, selector: &str) -> Result<TagSet, ThresholdError> {
    let mut filter = TagSet::new();
    for pair in inner.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let (key, value) = pair
            .split_once(':')
            .ok_or_else(|| ThresholdError::InvalidSelector(selector.to_string()))?;
        let (key, value) = (key.trim(), value.trim());
        if key.is_empty() {
            return Err(ThresholdError::InvalidSelector(selector.to_string()));
        }
        filter.insert(key, value);
    }
    Ok(filter)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Aggregation {
    Avg,
    Min,
    Max,
    Med,
    Count,
    Rate,
    Value,
    Percentile(f64),
}

impl Aggregation {
    pub fn parse(input: &str) -> Result<Self, ThresholdError> {
        let compact = input
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect::<String>();

        match compact.as_str() {
            "avg" => Ok(Aggregation::Avg),
            "min" => Ok(Aggregation::Min),
            "max" => Ok(Aggregation::Max),
            "med" => Ok(Aggregation::Med),
            "count" => Ok(Aggregation::Count),
            "rate" => Ok(Aggregation::Rate),
            "value" => Ok(Aggregation::Value),
            other => {
                let inner = other
                    .strip_prefix("p(")
                    .and_then(|rest| rest.strip_suffix(')'))
                    .ok_or_else(|| ThresholdError::UnknownAggregation(input.trim().to_string()))?;
                let p = inner
                    .parse::<f64>()
                    .map_err(|_| ThresholdError::InvalidPercentile(input.trim().to_string()))?;
                if !(0.0..=100.0).contains(&p) {
                    return Err(ThresholdError::InvalidPercentile(input.trim().to_string()));
                }
                Ok(Aggregation::Percentile(p))
            }
        }
    }

    pub fn supports(&self, kind: MetricKind) -> bool {
        match kind {
            MetricKind::Trend => matches!(
                self,
                Aggregation::Avg
                    | Aggregation::Min
                    | Aggregation::Max
                    | Aggregation::Med
                    | Aggregation::Count
                    | Aggregation::Percentile(_)
            ),
            MetricKind::Rate => matches!(self, Aggregation::Rate),
            MetricKind::Counter => matches!(self, Aggregation::Count | Aggregation::Rate),
            MetricKind::Gauge => matches!(
                self,
                Aggregation::Value | Aggregation::Min | Aggregation::Max
            ),
        }
    }

    /// Compute this aggregation over a snapshot, `None` when there is no data.
    pub fn resolve(&self, snapshot: &MetricSnapshot) -> Option<f64> {
        if snapshot.is_empty() {
            return None;
        }

        match self {
            Aggregation::Avg => snapshot.avg(),
            Aggregation::Min => snapshot.min(),
            Aggregation::Max => snapshot.max(),
            Aggregation::Med => snapshot.med(),
            Aggregation::Count => Some(snapshot.count()),
            Aggregation::Rate => snapshot.rate(),
            Aggregation::Value => snapshot.last(),
            Aggregation::Percentile(p) => snapshot.percentile(*p),
        }
    }
}

impl Display for Aggregation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Aggregation::Avg => write!(f, "avg"),
            Aggregation::Min => write!(f, "min"),
            Aggregation::Max => write!(f, "max"),
            Aggregation::Med => write!(f, "med"),
            Aggregation::Count => write!(f, "count"),
            Aggregation::Rate => write!(f, "rate"),
            Aggregation::Value => write!(f, "value"),
            Aggregation::Percentile(p) => write!(f, "p({p})"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Lt,
    Le,
    Gt,
    Ge,
}

impl Operator {
    pub fn compare(&self, value: f64, bound: f64) -> bool {
        match self {
            Operator::Lt => value < bound,
            Operator::Le => value <= bound,
            Operator::Gt => value > bound,
            Operator::Ge => value >= bound,
        }
    }
}

impl Display for Operator {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let op = match self {
            Operator::Lt => "<",
            Operator::Le => "<=",
            Operator::Gt => ">",
            Operator::Ge => ">=",
        };
        write!(f, "{op}")
    }
}

/// A parsed comparison such as `p(95) < 500`.
#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdExpression {
    pub aggregation: Aggregation,
    pub operator: Operator,
    pub bound: f64,
}

impl ThresholdExpression {
    pub fn parse(input: &str) -> Result<Self, ThresholdError> {
        let op_start = input
            .find(['<', '>'])
            .ok_or_else(|| ThresholdError::MissingOperator(input.to_string()))?;
        let or_equal = input[op_start + 1..].starts_with('=');
        let operator = match (&input[op_start..op_start + 1], or_equal) {
            ("<", false) => Operator::Lt,
            ("<", true) => Operator::Le,
            (">", false) => Operator::Gt,
            _ => Operator::Ge,
        };
        let rhs_start = op_start + if or_equal { 2 } else { 1 };

        let aggregation = Aggregation::parse(&input[..op_start])?;
        let rhs = input[rhs_start..].trim();
        let bound = rhs
            .parse::<f64>()
            .ok()
            .filter(|b| b.is_finite())
            .ok_or_else(|| ThresholdError::InvalidBound(rhs.to_string()))?;

        Ok(Self {
            aggregation,
            operator,
            bound,
        })
    }
}

impl Display for ThresholdExpression {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} {}", self.aggregation, self.operator, self.bound)
    }
}

/// A pass/fail condition over an aggregate metric.
#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdSpec {
    pub selector: MetricSelector,
    pub expression: ThresholdExpression,
    /// The expression as it was written in the configuration.
    pub source: String,
    /// Stop the run as soon as this threshold is breached.
    pub abort_on_fail: bool,
    /// How long to wait after the run starts before checking `abort_on_fail`.
    pub delay_abort_eval: Duration,
}

impl ThresholdSpec {
    pub fn parse(selector: &str, expression: &str) -> Result<Self, ThresholdError> {
        Ok(Self {
            selector: MetricSelector::parse(selector)?,
            expression: ThresholdExpression::parse(expression)?,
            source: expression.trim().to_string(),
            abort_on_fail: false,
            delay_abort_eval: Duration::ZERO,
        })
    }

    pub fn with_abort_on_fail(mut self, delay_abort_eval: Duration) -> Self {
        self.abort_on_fail = true;
        self.delay_abort_eval = delay_abort_eval;
        self
    }

    /// Check that the selector names a tracked metric and the aggregation makes sense for it.
    pub fn validate(&self, registry: &MetricRegistry) -> Result<(), ThresholdError> {
        let kind = registry
            .kind_of(&self.selector.metric)
            .ok_or_else(|| ThresholdError::UnknownMetric(self.selector.to_string()))?;

        if !self.expression.aggregation.supports(kind) {
            return Err(ThresholdError::UnsupportedAggregation {
                metric: self.selector.metric.clone(),
                kind,
                aggregation: self.expression.aggregation,
            });
        }

        Ok(())
    }

    pub fn evaluate(&self, collector: &MetricsCollector) -> ThresholdResult {
        let value = collector
            .snapshot(&self.selector.metric, &self.selector.filter)
            .and_then(|snapshot| self.expression.aggregation.resolve(&snapshot));

        let passed = match value {
            Some(value) => self.expression.operator.compare(value, self.expression.bound),
            None => {
                log::warn!(
                    "No data for threshold `{}` on `{}`",
                    self.source,
                    self.selector
                );
                true
            }
        };

        ThresholdResult {
            selector: self.selector.to_string(),
            expression: self.source.clone(),
            value,
            passed,
            abort_on_fail: self.abort_on_fail,
        }
    }
}

/// Evaluate every threshold against the collector and build the run verdict.
///
/// One failed threshold fails the run.
pub fn evaluate(thresholds: &[ThresholdSpec], collector: &MetricsCollector) -> RunResult {
    let results = thresholds
        .iter()
        .map(|t| t.evaluate(collector))
        .collect::<Vec<_>>();
    let metrics = collector
        .recorded_metrics()
        .into_iter()
        .filter_map(|(name, _)| {
            let snapshot = collector.snapshot(&name, &TagSet::new())?;
            Some(MetricAggregate::from_snapshot(&name, &snapshot))
        })
        .collect();

    RunResult::new(results, metrics)
}
