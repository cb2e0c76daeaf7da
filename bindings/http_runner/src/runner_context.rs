use bytes::Bytes;
use gale_http_client::prelude::HttpClientPool;
use gale_runner::prelude::UserValuesConstraint;
use std::collections::HashMap;

/// Run-wide values for HTTP scenarios, filled in by the setup hook.
#[derive(Default, Debug)]
pub struct HttpRunnerContext {
    /// Shared by every VU. Set by [crate::prelude::configure_http_pool].
    pub pool: Option<HttpClientPool>,
    /// Request payloads loaded once during setup, by name.
    pub fixtures: HashMap<String, Bytes>,
}

impl UserValuesConstraint for HttpRunnerContext {}
