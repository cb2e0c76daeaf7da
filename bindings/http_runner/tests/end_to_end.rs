use std::net::SocketAddr;
use std::sync::mpsc;

use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::Router;
use gale_http_runner::prelude::*;

/// Start a stand-in for the deals API on its own runtime, so that the runner can create its own.
fn start_target(healthy: bool) -> SocketAddr {
    let (tx, rx) = mpsc::channel();
    std::thread::spawn(move || {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        runtime.block_on(async move {
            let app = if healthy {
                Router::new()
                    .route("/api/v1/deals", get(|| async { "[]" }))
                    .route(
                        "/api/v1/deals/import",
                        post(|| async { r#"{"results":[{"dealId":"D0001"}]}"# }),
                    )
            } else {
                Router::new().route(
                    "/api/v1/deals",
                    get(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "boom") }),
                )
            };

            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            tx.send(listener.local_addr().unwrap()).unwrap();
            axum::serve(listener, app).await.unwrap();
        });
    });
    rx.recv().unwrap()
}

fn cli(addr: SocketAddr) -> GaleScenarioCli {
    GaleScenarioCli {
        target_url: Some(format!("http://{addr}")),
        no_progress: true,
        reporter: ReporterOpt::Noop,
        ..Default::default()
    }
}

const CONFIG: &str = r#"
[scenarios.list]
executor = "constant-vus"
vus = 2
duration = "2s"
pause = "50ms"

[thresholds]
http_req_duration = ["p(95) < 500"]
http_req_failed = ["rate < 0.01"]
checks = ["rate > 0.99"]
"#;

fn setup(ctx: &mut RunnerContext<HttpRunnerContext>) -> HookResult {
    configure_http_pool(ctx)
}

fn list_deals(ctx: &mut VuContext<HttpRunnerContext, HttpVuContext>) -> HookResult {
    let url = target_url(ctx.runner_context(), "/api/v1/deals")?;
    http_request(
        ctx,
        RequestSpec::get(url).name("list_deals"),
        &[Check::status(200)],
    )?;
    Ok(())
}

#[test]
fn healthy_target_passes_thresholds() {
    let addr = start_target(true);

    let outcome = run(
        ScenarioDefinitionBuilder::<HttpRunnerContext, HttpVuContext>::new("healthy", cli(addr))
            .with_default_config(CONFIG)
            .use_setup(setup)
            .use_workload(list_deals),
    )
    .unwrap();

    assert_eq!(EXIT_OK, outcome.exit_code);
    assert!(outcome.result.thresholds.iter().all(|t| t.value.is_some()));
    assert_eq!(2, outcome.scenario("list").unwrap().max_active_vus);
}

#[test]
fn all_server_errors_fail_the_run() {
    let addr = start_target(false);

    let outcome = run(
        ScenarioDefinitionBuilder::<HttpRunnerContext, HttpVuContext>::new("failing", cli(addr))
            .with_default_config(CONFIG)
            .use_setup(setup)
            .use_workload(list_deals),
    )
    .unwrap();

    assert_eq!(EXIT_THRESHOLDS_FAILED, outcome.exit_code);
    assert_eq!(
        Some(1.0),
        outcome
            .result
            .metric(HTTP_REQ_FAILED)
            .and_then(|m| m.stat("rate"))
    );
    let failed = outcome
        .result
        .failed_thresholds()
        .map(|t| t.selector.as_str())
        .collect::<Vec<_>>();
    assert!(failed.contains(&"http_req_failed"));
    assert!(failed.contains(&"checks"));
}

#[test]
fn multipart_import_with_fixture() {
    fn setup_with_fixture(ctx: &mut RunnerContext<HttpRunnerContext>) -> HookResult {
        configure_http_pool(ctx)?;
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("sample1.csv");
        std::fs::write(
            &path,
            "dealId,fromCurrency,toCurrency,timestamp,amount\nD0001,USD,EUR,2024-01-01T10:00:00,1000.50\n",
        )?;
        load_fixture(ctx, "sample1.csv", &path)
    }

    fn import(ctx: &mut VuContext<HttpRunnerContext, HttpVuContext>) -> HookResult {
        let url = target_url(ctx.runner_context(), "/api/v1/deals/import")?;
        let data = fixture(ctx, "sample1.csv")?;
        let filename = format!("deals_vu{}_iter{}.csv", ctx.vu_id(), ctx.iteration());
        http_request(
            ctx,
            RequestSpec::post(url).file_field("file", filename, "text/csv", data),
            &[Check::status(200), Check::body_contains("results")],
        )?;
        Ok(())
    }

    let addr = start_target(true);
    let outcome = run(
        ScenarioDefinitionBuilder::<HttpRunnerContext, HttpVuContext>::new("import", cli(addr))
            .with_default_config(
                r#"
                [scenarios.import]
                executor = "constant-vus"
                vus = 1
                duration = "500ms"

                [thresholds]
                checks = ["rate > 0.99"]
                "#,
            )
            .use_setup(setup_with_fixture)
            .use_workload(import),
    )
    .unwrap();

    assert_eq!(EXIT_OK, outcome.exit_code);
    assert!(outcome.total_iterations() > 0);
}

#[test]
fn missing_pool_is_a_workload_error() {
    let addr = start_target(true);

    let outcome = run(
        ScenarioDefinitionBuilder::<HttpRunnerContext, HttpVuContext>::new("no_pool", cli(addr))
            .with_default_config(
                r#"
                [scenarios.no_pool]
                executor = "constant-vus"
                vus = 1
                duration = "300ms"
                "#,
            )
            .use_workload(list_deals),
    )
    .unwrap();

    assert_eq!(0, outcome.total_iterations());
}
