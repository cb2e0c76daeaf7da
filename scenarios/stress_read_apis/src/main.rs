use gale_http_runner::prelude::*;
use std::process::ExitCode;

/// Path and request name of each read endpoint.
const ENDPOINTS: [(&str, &str); 3] = [
    ("/api/v1/deals", "list_deals"),
    ("/api/v1/deals/D0001", "get_deal"),
    ("/api/v1/deals/health", "health"),
];

fn setup(ctx: &mut RunnerContext<HttpRunnerContext>) -> HookResult {
    configure_http_pool(ctx)?;
    // Fail fast on a bad target rather than on every request.
    target_url(ctx, "/")?;
    Ok(())
}

fn read_random_endpoint(ctx: &mut VuContext<HttpRunnerContext, HttpVuContext>) -> HookResult {
    let (path, name) = *pick(ctx, &ENDPOINTS)?;
    let url = target_url(ctx.runner_context(), path)?;

    http_request(ctx, RequestSpec::get(url).name(name), &[Check::status(200)])?;

    Ok(())
}

fn main() -> ExitCode {
    let builder =
        ScenarioDefinitionBuilder::<HttpRunnerContext, HttpVuContext>::new_with_init(env!(
            "CARGO_PKG_NAME"
        ))
        .with_default_config(include_str!("../scenario.toml"))
        .use_setup(setup)
        .use_workload(read_random_endpoint);

    run_main(builder)
}
