use std::fmt::{Debug, Formatter};
use std::sync::Arc;

use bytes::Bytes;
use reqwest::header::HeaderMap;

/// What a check can see of a response.
#[derive(Debug, Clone)]
pub struct ResponseView {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl ResponseView {
    pub fn text(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }
}

type Predicate = Arc<dyn Fn(&ResponseView) -> bool + Send + Sync>;

/// A named assertion about a response. Each outcome is recorded into the `checks` metric.
#[derive(Clone)]
pub enum Check {
    Status { name: String, status: u16 },
    BodyContains { name: String, needle: String },
    Custom { name: String, predicate: Predicate },
}

impl Check {
    /// Named `status is <status>`.
    pub fn status(status: u16) -> Self {
        Check::Status {
            name: format!("status is {status}"),
            status,
        }
    }

    /// Named `body contains <needle>`.
    pub fn body_contains(needle: impl Into<String>) -> Self {
        let needle = needle.into();
        Check::BodyContains {
            name: format!("body contains {needle}"),
            needle,
        }
    }

    pub fn custom(
        name: impl Into<String>,
        predicate: impl Fn(&ResponseView) -> bool + Send + Sync + 'static,
    ) -> Self {
        Check::Custom {
            name: name.into(),
            predicate: Arc::new(predicate),
        }
    }

    /// Replace the check's name.
    pub fn named(mut self, new_name: impl Into<String>) -> Self {
        match &mut self {
            Check::Status { name, .. }
            | Check::BodyContains { name, .. }
            | Check::Custom { name, .. } => *name = new_name.into(),
        }
        self
    }

    pub fn name(&self) -> &str {
        match self {
            Check::Status { name, .. }
            | Check::BodyContains { name, .. }
            | Check::Custom { name, .. } => name,
        }
    }

    /// `None` when there was no response, which always fails.
    pub fn passes(&self, response: Option<&ResponseView>) -> bool {
        let Some(response) = response else {
            return false;
        };

        match self {
            Check::Status { status, .. } => response.status == *status,
            Check::BodyContains { needle, .. } => response.text().contains(needle.as_str()),
            Check::Custom { predicate, .. } => predicate(response),
        }
    }
}

impl Debug for Check {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Check").field(&self.name()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(status: u16, body: &'static str) -> ResponseView {
        ResponseView {
            status,
            headers: HeaderMap::new(),
            body: Bytes::from_static(body.as_bytes()),
        }
    }

    #[test]
    fn status_check() {
        let check = Check::status(200);
        assert_eq!("status is 200", check.name());
        assert!(check.passes(Some(&response(200, ""))));
        assert!(!check.passes(Some(&response(500, ""))));
        assert!(!check.passes(None));
    }

    #[test]
    fn body_and_custom_checks() {
        let ok = response(200, r#"{"results":[{"dealId":"D0001"}]}"#);
        assert!(Check::body_contains("results").passes(Some(&ok)));
        assert!(!Check::body_contains("errors").passes(Some(&ok)));

        let check = Check::custom("response has results", |r| r.text().contains("\"results\""))
            .named("has results");
        assert_eq!("has results", check.name());
        assert!(check.passes(Some(&ok)));
    }
}
