mod check;
mod pool;
mod request;

pub mod prelude {
    pub use crate::check::{Check, ResponseView};
    pub use crate::pool::{HttpClientPool, PoolConfig};
    pub use crate::request::{MultipartField, RequestBody, RequestSpec};

    // Types defined in reqwest that appear in the public API are re-exported here so that scenarios
    // don't need to depend on reqwest directly.
    pub use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
    pub use reqwest::Method;
}
