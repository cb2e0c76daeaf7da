use std::path::Path;

use anyhow::Context;
use bytes::Bytes;
use gale_http_client::prelude::{Check, HttpClientPool, PoolConfig, RequestSpec};
use gale_runner::prelude::{
    GaleResult, HookResult, RequestSample, RunnerContext, UserValuesConstraint, VuContext,
};
use rand::seq::SliceRandom;

use crate::context::HttpVuContext;
use crate::runner_context::HttpRunnerContext;

/// Creates the shared [HttpClientPool] from the `[http]` configuration.
///
/// Call this from the scenario setup hook:
/// ```rust
/// use gale_http_runner::prelude::{configure_http_pool, HookResult, HttpRunnerContext, RunnerContext};
///
/// fn setup(ctx: &mut RunnerContext<HttpRunnerContext>) -> HookResult {
///     configure_http_pool(ctx)?;
///     Ok(())
/// }
/// ```
pub fn configure_http_pool(ctx: &mut RunnerContext<HttpRunnerContext>) -> HookResult {
    let http_config = ctx.http_config();
    let pool_config = PoolConfig {
        timeout: http_config.timeout()?,
        max_idle_per_host: http_config.max_idle_per_host,
        user_agent: http_config.user_agent.clone(),
    };
    log::debug!("Creating HTTP client pool: {pool_config:?}");

    let pool = HttpClientPool::new(&pool_config, ctx.collector().clone())
        .context("Failed to create HTTP client")?;
    ctx.get_mut().pool = Some(pool);

    Ok(())
}

/// Reads a file into memory once so that every VU can send it without touching the disk.
pub fn load_fixture(
    ctx: &mut RunnerContext<HttpRunnerContext>,
    name: &str,
    path: &Path,
) -> HookResult {
    let data = std::fs::read(path)
        .with_context(|| format!("Failed to read fixture {name} from {}", path.display()))?;
    log::debug!("Loaded fixture {name}, {} bytes", data.len());
    ctx.get_mut().fixtures.insert(name.to_string(), Bytes::from(data));

    Ok(())
}

/// A fixture loaded by [load_fixture]. Cloning [Bytes] doesn't copy the data.
pub fn fixture<SV: UserValuesConstraint>(
    ctx: &VuContext<HttpRunnerContext, HttpVuContext<SV>>,
    name: &str,
) -> GaleResult<Bytes> {
    ctx.runner_context()
        .get()
        .fixtures
        .get(name)
        .cloned()
        .with_context(|| format!("Fixture {name} was not loaded in setup"))
}

/// Resolve `path` against the configured target URL.
///
/// A path starting with `/` replaces any path on the target URL.
pub fn target_url<RV: UserValuesConstraint>(
    ctx: &RunnerContext<RV>,
    path: &str,
) -> GaleResult<String> {
    let base = url::Url::parse(ctx.require_target_url()?)
        .context("Failed to parse target URL")?;
    let url = base
        .join(path)
        .with_context(|| format!("Failed to join {path} onto the target URL"))?;
    Ok(url.to_string())
}

/// Send a request through the shared pool, blocking the VU until it completes.
///
/// The sample is tagged with the VU's scenario tags and recorded. A failed request is not an error,
/// check [RequestSample::failed]. The only errors are a missing pool or cancellation when the
/// scenario is force stopped.
pub fn http_request<SV: UserValuesConstraint>(
    ctx: &mut VuContext<HttpRunnerContext, HttpVuContext<SV>>,
    spec: RequestSpec,
    checks: &[Check],
) -> GaleResult<RequestSample> {
    let pool = ctx
        .runner_context()
        .get()
        .pool
        .clone()
        .context("HTTP client pool is not configured, call 'configure_http_pool' in the scenario setup")?;
    let tags = ctx.tags().clone();
    let checks = checks.to_vec();

    ctx.execute(async move { Ok(pool.execute(spec, &checks, &tags).await) })
}

/// Pick one of `items` using the VU's random number generator.
pub fn pick<'a, T, RV: UserValuesConstraint, V: UserValuesConstraint>(
    ctx: &mut VuContext<RV, V>,
    items: &'a [T],
) -> GaleResult<&'a T> {
    items
        .choose(ctx.rng())
        .context("Cannot pick from an empty list")
}
