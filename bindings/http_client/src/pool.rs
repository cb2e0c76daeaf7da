use std::sync::Arc;
use std::time::{Duration, Instant};

use gale_instruments::prelude::{CheckOutcome, MetricsCollector, RequestSample, TagSet};
use reqwest::multipart::{Form, Part};

use crate::check::{Check, ResponseView};
use crate::request::{MultipartField, RequestBody, RequestSpec};

#[derive(Debug, Clone, PartialEq)]
pub struct PoolConfig {
    pub timeout: Duration,
    pub max_idle_per_host: usize,
    pub user_agent: String,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            max_idle_per_host: 32,
            user_agent: format!("gale/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// An HTTP client that records every request it makes.
///
/// Cloning is cheap and clones share the same connection pool and collector.
#[derive(Debug, Clone)]
pub struct HttpClientPool {
    inner: reqwest::Client,
    collector: Arc<MetricsCollector>,
}

impl HttpClientPool {
    pub fn new(config: &PoolConfig, collector: Arc<MetricsCollector>) -> anyhow::Result<Self> {
        let inner = reqwest::Client::builder()
            .timeout(config.timeout)
            .pool_max_idle_per_host(config.max_idle_per_host)
            .user_agent(config.user_agent.as_str())
            .build()?;

        Ok(Self { inner, collector })
    }

    pub fn collector(&self) -> &Arc<MetricsCollector> {
        &self.collector
    }

    /// Issue the request, run the checks against the response and record the outcome.
    ///
    /// Network errors and timeouts don't produce an error. They are recorded as a failed sample
    /// with no status, and every check fails.
    pub async fn execute(&self, spec: RequestSpec, checks: &[Check], tags: &TagSet) -> RequestSample {
        let sample_tags = spec.sample_tags(tags);
        let started = Instant::now();

        let response = self.send(spec).await;
        let duration = started.elapsed();

        let sample = match response {
            Ok(view) => RequestSample {
                tags: sample_tags.with_tag("status", view.status.to_string()),
                status: Some(view.status),
                duration,
                checks: run_checks(checks, Some(&view)),
                failed: !(200..=399).contains(&view.status),
                error: None,
            },
            Err(e) => {
                log::debug!("Request failed: {e:?}");
                RequestSample {
                    tags: sample_tags,
                    status: None,
                    duration,
                    checks: run_checks(checks, None),
                    failed: true,
                    error: Some(e.to_string()),
                }
            }
        };

        self.collector.record(&sample);
        sample
    }

    async fn send(&self, spec: RequestSpec) -> reqwest::Result<ResponseView> {
        let mut request = self
            .inner
            .request(spec.method, spec.url.as_str())
            .headers(spec.headers);

        request = match spec.body {
            RequestBody::Empty => request,
            RequestBody::Bytes(bytes) => request.body(bytes),
            RequestBody::Multipart(fields) => request.multipart(build_form(fields)?),
        };

        let response = request.send().await?;
        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = response.bytes().await?;

        Ok(ResponseView {
            status,
            headers,
            body,
        })
    }
}

fn build_form(fields: Vec<MultipartField>) -> reqwest::Result<Form> {
    let mut form = Form::new();
    for field in fields {
        form = match field {
            MultipartField::Text { name, value } => form.text(name, value),
            MultipartField::File {
                name,
                filename,
                content_type,
                data,
            } => {
                let length = data.len() as u64;
                let part = Part::stream_with_length(data, length)
                    .file_name(filename)
                    .mime_str(&content_type)?;
                form.part(name, part)
            }
        };
    }
    Ok(form)
}

fn run_checks(checks: &[Check], response: Option<&ResponseView>) -> Vec<CheckOutcome> {
    checks
        .iter()
        .map(|check| CheckOutcome::new(check.name(), check.passes(response)))
        .collect()
}
