use gale_http_runner::fixture_path;
use gale_http_runner::prelude::*;
use std::process::ExitCode;

const SAMPLES: [&str; 2] = ["sample1.csv", "sample2.csv"];

fn setup(ctx: &mut RunnerContext<HttpRunnerContext>) -> HookResult {
    configure_http_pool(ctx)?;
    load_fixture(ctx, SAMPLES[0], &fixture_path!("sample1.csv")?)?;
    load_fixture(ctx, SAMPLES[1], &fixture_path!("sample2.csv")?)?;
    Ok(())
}

fn import_csv(ctx: &mut VuContext<HttpRunnerContext, HttpVuContext>) -> HookResult {
    let sample = *pick(ctx, &SAMPLES)?;
    let data = fixture(ctx, sample)?;
    // Unique per upload so that server logs can be traced back to a VU and iteration.
    let filename = format!("deals_vu{}_iter{}.csv", ctx.vu_id(), ctx.iteration());
    let url = target_url(ctx.runner_context(), "/api/v1/deals/import")?;

    http_request(
        ctx,
        RequestSpec::post(url)
            .name("import_csv")
            .file_field("file", filename, "text/csv", data),
        &[Check::status(200)],
    )?;

    Ok(())
}

fn main() -> ExitCode {
    let builder =
        ScenarioDefinitionBuilder::<HttpRunnerContext, HttpVuContext>::new_with_init(env!(
            "CARGO_PKG_NAME"
        ))
        .with_default_config(include_str!("../scenario.toml"))
        .use_setup(setup)
        .use_workload(import_csv);

    run_main(builder)
}
