mod collector;
mod metrics;
mod report;
mod result;
mod sample;
mod snapshot;
mod tags;
mod threshold;

pub use metrics::{
    CHECKS, HTTP_REQS, HTTP_REQ_DURATION, HTTP_REQ_FAILED, ITERATIONS, ITERATION_DURATION, VUS,
};

pub mod prelude {
    pub use crate::collector::{CollectorError, MetricsCollector};
    pub use crate::metrics::{MetricKind, MetricRegistry};
    pub use crate::report::{
        render_summary, NoopReportCollector, ReportCollector, SummaryReportCollector,
    };
    pub use crate::result::{MetricAggregate, RunResult, ThresholdResult};
    pub use crate::sample::{CheckOutcome, RequestSample};
    pub use crate::snapshot::MetricSnapshot;
    pub use crate::tags::TagSet;
    pub use crate::threshold::{
        evaluate, Aggregation, MetricSelector, Operator, ThresholdError, ThresholdExpression,
        ThresholdSpec,
    };
}
