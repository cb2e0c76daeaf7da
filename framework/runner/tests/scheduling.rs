use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::OnceLock;
use std::time::{Duration, Instant};

use gale_runner::prelude::{
    run, CheckOutcome, ConfigError, GaleScenarioCli, HookResult, ReporterOpt, RequestSample,
    Rng, RunnerContext, ScenarioDefinitionBuilder, UserValuesConstraint, VuContext,
    EXIT_OK, EXIT_THRESHOLDS_FAILED, HTTP_REQS, ITERATIONS,
};
use parking_lot::{const_mutex, Mutex};

#[derive(Default, Debug)]
struct Values {}

impl UserValuesConstraint for Values {}

type Ctx = VuContext<Values, Values>;
type Builder = ScenarioDefinitionBuilder<Values, Values>;

fn cli() -> GaleScenarioCli {
    GaleScenarioCli {
        no_progress: true,
        reporter: ReporterOpt::Noop,
        ..Default::default()
    }
}

fn record_ok(ctx: &Ctx, ms: u64) {
    ctx.collector().record(&RequestSample {
        tags: ctx.tags().clone().with_tag("name", "list_deals"),
        status: Some(200),
        duration: Duration::from_millis(ms),
        checks: vec![CheckOutcome::new("status is 200", true)],
        failed: false,
        error: None,
    });
}

#[test]
fn constant_vus_never_exceed_configured_count() {
    static ACTIVE: AtomicUsize = AtomicUsize::new(0);
    static PEAK: AtomicUsize = AtomicUsize::new(0);

    fn workload(_ctx: &mut Ctx) -> HookResult {
        let now = ACTIVE.fetch_add(1, Ordering::SeqCst) + 1;
        PEAK.fetch_max(now, Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(15));
        ACTIVE.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }

    let outcome = run(Builder::new("ceiling", cli())
        .with_default_config(
            r#"
            [scenarios.ceiling]
            executor = "constant-vus"
            vus = 3
            duration = "1s"
            "#,
        )
        .use_workload(workload))
    .unwrap();

    assert!(PEAK.load(Ordering::SeqCst) <= 3);
    let report = outcome.scenario("ceiling").unwrap();
    assert_eq!(3, report.vus_started);
    assert_eq!(3, report.max_active_vus);
    assert!(report.iterations > 0);
}

#[test]
fn ramping_vus_follow_the_stages() {
    static STARTED: OnceLock<Instant> = OnceLock::new();
    static ACTIVE: AtomicUsize = AtomicUsize::new(0);
    static OBSERVED: Mutex<Vec<(Duration, usize)>> = const_mutex(Vec::new());

    fn setup(_ctx: &mut RunnerContext<Values>) -> HookResult {
        STARTED.get_or_init(Instant::now);
        Ok(())
    }

    fn vu_setup(_ctx: &mut Ctx) -> HookResult {
        ACTIVE.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn vu_teardown(_ctx: &mut Ctx) -> HookResult {
        ACTIVE.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }

    fn workload(_ctx: &mut Ctx) -> HookResult {
        if let Some(started) = STARTED.get() {
            OBSERVED
                .lock()
                .push((started.elapsed(), ACTIVE.load(Ordering::SeqCst)));
        }
        std::thread::sleep(Duration::from_millis(20));
        Ok(())
    }

    let outcome = run(Builder::new("ramping", cli())
        .with_default_config(
            r#"
            [scenarios.ramping]
            executor = "ramping-vus"
            start_vus = 0
            stages = [{ duration = "2s", target = 4 }, { duration = "1s", target = 4 }]
            graceful_stop = "1s"
            "#,
        )
        .use_setup(setup)
        .use_vu_setup(vu_setup)
        .use_vu_teardown(vu_teardown)
        .use_workload(workload))
    .unwrap();

    let observed = OBSERVED.lock();
    let around_midpoint = observed
        .iter()
        .filter(|(at, _)| *at >= Duration::from_millis(950) && *at <= Duration::from_millis(1050))
        .map(|(_, active)| *active)
        .collect::<Vec<_>>();
    assert!(!around_midpoint.is_empty());
    assert!(around_midpoint.iter().all(|active| (1..=3).contains(active)));

    assert!(observed.iter().all(|(_, active)| *active <= 4));
    assert_eq!(4, outcome.scenario("ramping").unwrap().max_active_vus);
}

#[test]
fn graceful_stop_lets_the_iteration_finish() {
    fn workload(ctx: &mut Ctx) -> HookResult {
        ctx.execute(async {
            tokio::time::sleep(Duration::from_millis(800)).await;
            Ok(())
        })?;
        Ok(())
    }

    let outcome = run(Builder::new("graceful", cli())
        .with_default_config(
            r#"
            [scenarios.graceful]
            executor = "constant-vus"
            vus = 1
            duration = "500ms"
            graceful_stop = "5s"
            "#,
        )
        .use_workload(workload))
    .unwrap();

    let report = outcome.scenario("graceful").unwrap();
    assert!(!report.forced_stop);
    assert_eq!(1, report.iterations);
}

#[test]
fn forced_stop_after_graceful_stop_runs_out() {
    fn workload(ctx: &mut Ctx) -> HookResult {
        ctx.execute(async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(())
        })?;
        Ok(())
    }

    let started = Instant::now();
    let outcome = run(Builder::new("forced", cli())
        .with_default_config(
            r#"
            [scenarios.forced]
            executor = "constant-vus"
            vus = 2
            duration = "300ms"
            graceful_stop = "300ms"
            "#,
        )
        .use_workload(workload))
    .unwrap();

    assert!(started.elapsed() < Duration::from_secs(10));
    let report = outcome.scenario("forced").unwrap();
    assert!(report.forced_stop);
    // The cancelled iterations are not recorded.
    assert_eq!(0, report.iterations);
}

#[test]
fn forced_stop_detaches_blocked_vus_and_discards_their_iteration() {
    fn workload(_ctx: &mut Ctx) -> HookResult {
        // Blocks outside the executor so only detaching can end the scenario on time.
        std::thread::sleep(Duration::from_secs(3));
        Ok(())
    }

    let started = Instant::now();
    let outcome = run(Builder::new("blocked", cli())
        .with_default_config(
            r#"
            [scenarios.blocked]
            executor = "constant-vus"
            vus = 1
            duration = "300ms"
            graceful_stop = "300ms"
            "#,
        )
        .use_workload(workload))
    .unwrap();

    assert!(started.elapsed() < Duration::from_millis(2500));
    let report = outcome.scenario("blocked").unwrap();
    assert!(report.forced_stop);
    assert_eq!(0, report.iterations);
    assert!(outcome.result.metric(ITERATIONS).is_none());
}

#[test]
fn iteration_finishing_after_forced_stop_is_not_recorded() {
    fn workload(_ctx: &mut Ctx) -> HookResult {
        // Returns while the scheduler is still waiting for cancelled VUs to unwind.
        std::thread::sleep(Duration::from_millis(600));
        Ok(())
    }

    let outcome = run(Builder::new("late", cli())
        .with_default_config(
            r#"
            [scenarios.late]
            executor = "constant-vus"
            vus = 1
            duration = "300ms"
            graceful_stop = "100ms"
            "#,
        )
        .use_workload(workload))
    .unwrap();

    let report = outcome.scenario("late").unwrap();
    assert!(report.forced_stop);
    assert_eq!(0, report.iterations);
    assert!(outcome.result.metric(ITERATIONS).is_none());
}

#[test]
fn vus_of_concurrent_scenarios_add_up() {
    fn workload(_ctx: &mut Ctx) -> HookResult {
        std::thread::sleep(Duration::from_millis(20));
        Ok(())
    }

    let outcome = run(Builder::new("concurrent", cli())
        .with_default_config(
            r#"
            [scenarios.reads]
            executor = "constant-vus"
            vus = 2
            duration = "1s"
            workload = "default"

            [scenarios.imports]
            executor = "constant-vus"
            vus = 2
            duration = "1s"
            workload = "default"

            [thresholds]
            vus = ["max >= 4"]
            "vus{scenario:reads}" = ["max <= 2"]
            "#,
        )
        .use_workload(workload))
    .unwrap();

    assert_eq!(EXIT_OK, outcome.exit_code);
    let run_wide = outcome
        .result
        .thresholds
        .iter()
        .find(|t| t.selector == "vus")
        .unwrap();
    assert_eq!(Some(4.0), run_wide.value);
    let scoped = outcome
        .result
        .thresholds
        .iter()
        .find(|t| t.selector.starts_with("vus{"))
        .unwrap();
    assert_eq!(Some(2.0), scoped.value);
}

#[test]
fn constant_two_vus_for_two_seconds_pass_thresholds() {
    fn workload(ctx: &mut Ctx) -> HookResult {
        record_ok(ctx, 10);
        std::thread::sleep(Duration::from_millis(50));
        Ok(())
    }

    let outcome = run(Builder::new("e2e", cli())
        .with_default_config(
            r#"
            [scenarios.e2e]
            executor = "constant-vus"
            vus = 2
            duration = "2s"

            [thresholds]
            http_req_duration = ["p(95) < 500"]
            checks = ["rate > 0.99"]
            "http_req_duration{scenario:e2e}" = ["max < 100"]
            "#,
        )
        .use_workload(workload))
    .unwrap();

    assert_eq!(EXIT_OK, outcome.exit_code);
    assert!(outcome.passed());
    assert_eq!(3, outcome.result.thresholds.len());
    assert!(outcome.total_iterations() > 0);
    assert_eq!(
        Some(outcome.total_iterations() as f64),
        outcome
            .result
            .metric(HTTP_REQS)
            .and_then(|m| m.stat("count"))
    );
}

#[test]
fn failing_threshold_exits_with_threshold_code() {
    fn workload(ctx: &mut Ctx) -> HookResult {
        record_ok(ctx, 700);
        std::thread::sleep(Duration::from_millis(20));
        Ok(())
    }

    let outcome = run(Builder::new("slow", cli())
        .with_default_config(
            r#"
            [scenarios.slow]
            executor = "constant-vus"
            vus = 1
            duration = "300ms"

            [thresholds]
            http_req_duration = ["p(95) < 500"]
            "#,
        )
        .use_workload(workload))
    .unwrap();

    assert_eq!(EXIT_THRESHOLDS_FAILED, outcome.exit_code);
    assert!(!outcome.result.aborted);
}

#[test]
fn abort_on_fail_stops_the_run_early() {
    fn workload(ctx: &mut Ctx) -> HookResult {
        ctx.collector().record(&RequestSample {
            tags: ctx.tags().clone(),
            status: Some(500),
            duration: Duration::from_millis(5),
            checks: vec![CheckOutcome::new("status is 200", false)],
            failed: true,
            error: None,
        });
        std::thread::sleep(Duration::from_millis(20));
        Ok(())
    }

    let started = Instant::now();
    let outcome = run(Builder::new("abort", cli())
        .with_default_config(
            r#"
            [scenarios.abort]
            executor = "constant-vus"
            vus = 1
            duration = "1m"
            graceful_stop = "1s"

            [thresholds]
            http_req_failed = [{ threshold = "rate < 0.01", abort_on_fail = true }]
            "#,
        )
        .use_workload(workload))
    .unwrap();

    assert!(started.elapsed() < Duration::from_secs(20));
    assert!(outcome.result.aborted);
    assert_eq!(EXIT_THRESHOLDS_FAILED, outcome.exit_code);
}

#[test]
fn config_errors_are_returned_before_any_vu_starts() {
    static SETUP_CALLS: AtomicUsize = AtomicUsize::new(0);

    fn setup(_ctx: &mut RunnerContext<Values>) -> HookResult {
        SETUP_CALLS.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn workload(_ctx: &mut Ctx) -> HookResult {
        Ok(())
    }

    let result = run(Builder::new("invalid", cli())
        .with_default_config(
            r#"
            [scenarios.invalid]
            executor = "constant-vus"
            vus = 1
            duration = "-5s"
            "#,
        )
        .use_setup(setup)
        .use_workload(workload));

    let err = result.err().unwrap();
    assert!(matches!(
        err.downcast_ref::<ConfigError>(),
        Some(ConfigError::InvalidDuration { .. })
    ));
    assert_eq!(0, SETUP_CALLS.load(Ordering::SeqCst));
}

#[test]
fn seeded_runs_make_the_same_random_choices() {
    static FIRST_DRAW: AtomicU64 = AtomicU64::new(0);

    fn workload(ctx: &mut Ctx) -> HookResult {
        if ctx.iteration() == 0 {
            FIRST_DRAW.store(ctx.rng().gen(), Ordering::SeqCst);
        }
        ctx.runner_context().stop_run();
        Ok(())
    }

    let draw = || {
        let cli = GaleScenarioCli {
            seed: Some(7),
            ..cli()
        };
        run(Builder::new("seeded", cli)
            .with_default_config(
                r#"
                [scenarios.seeded]
                executor = "constant-vus"
                vus = 1
                duration = "5s"
                "#,
            )
            .use_workload(workload))
        .unwrap();
        FIRST_DRAW.load(Ordering::SeqCst)
    };

    assert_eq!(draw(), draw());
}

#[test]
fn pause_paces_iterations() {
    fn workload(_ctx: &mut Ctx) -> HookResult {
        Ok(())
    }

    let outcome = run(Builder::new("paced", cli())
        .with_default_config(
            r#"
            [scenarios.paced]
            executor = "constant-vus"
            vus = 1
            duration = "1s"
            pause = "200ms"
            "#,
        )
        .use_workload(workload))
    .unwrap();

    let iterations = outcome.scenario("paced").unwrap().iterations;
    assert!((3..=7).contains(&iterations), "{iterations} iterations");
}
