use std::time::Duration;

use crate::tags::TagSet;

/// The outcome of a single named check against a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckOutcome {
    pub name: String,
    pub passed: bool,
}

impl CheckOutcome {
    pub fn new(name: impl Into<String>, passed: bool) -> Self {
        Self {
            name: name.into(),
            passed,
        }
    }
}

/// Everything recorded about one request.
///
/// A sample without a status code is a request that never got a response, because of a network
/// error or a timeout.
#[derive(Debug, Clone)]
pub struct RequestSample {
    pub tags: TagSet,
    pub status: Option<u16>,
    pub duration: Duration,
    pub checks: Vec<CheckOutcome>,
    /// Whether this request counts towards `http_req_failed`.
    pub failed: bool,
    pub error: Option<String>,
}

impl RequestSample {
    pub fn duration_ms(&self) -> f64 {
        self.duration.as_secs_f64() * 1000.0
    }

    /// True if every check attached to this request passed.
    pub fn checks_passed(&self) -> bool {
        self.checks.iter().all(|c| c.passed)
    }
}
