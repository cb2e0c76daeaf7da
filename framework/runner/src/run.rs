use std::collections::BTreeMap;
use std::process::ExitCode;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use gale_core::prelude::ShutdownHandle;
use gale_instruments::prelude::{
    evaluate, MetricsCollector, NoopReportCollector, ReportCollector, RunResult,
    SummaryReportCollector,
};
use gale_summary_model::{RunSummary, ScenarioSummary, ThresholdSummary};

use crate::cli::ReporterOpt;
use crate::config::ConfigError;
use crate::context::{RunnerContext, UserValuesConstraint};
use crate::definition::{ScenarioDefinition, ScenarioDefinitionBuilder};
use crate::executor::Executor;
use crate::monitor::start_monitor;
use crate::progress::start_progress;
use crate::scheduler::{ScenarioReport, ScenarioScheduler, VuHooks};
use crate::shutdown::start_shutdown_listener;
use crate::threshold_monitor::start_threshold_monitor;

/// Every threshold passed.
pub const EXIT_OK: u8 = 0;
/// A threshold failed or the run was aborted by an `abort_on_fail` threshold.
pub const EXIT_THRESHOLDS_FAILED: u8 = 99;
/// The configuration was rejected before any VU started.
pub const EXIT_INVALID_CONFIG: u8 = 104;
/// The runner itself failed, for example in the setup hook.
pub const EXIT_RUNNER_ERROR: u8 = 107;

/// The outcome of a completed run.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub run_id: String,
    pub result: RunResult,
    pub scenarios: Vec<ScenarioReport>,
    pub exit_code: u8,
}

impl RunOutcome {
    pub fn passed(&self) -> bool {
        self.result.passed
    }

    pub fn total_iterations(&self) -> u64 {
        self.scenarios.iter().map(|s| s.iterations).sum()
    }

    pub fn scenario(&self, name: &str) -> Option<&ScenarioReport> {
        self.scenarios.iter().find(|s| s.name == name)
    }
}

/// Run every configured scenario to completion and evaluate the thresholds.
///
/// An `Err` means the run could not be carried out. A run that completed with failing thresholds
/// is an `Ok` with a non-zero [RunOutcome::exit_code].
pub fn run<RV: UserValuesConstraint, V: UserValuesConstraint>(
    definition: ScenarioDefinitionBuilder<RV, V>,
) -> anyhow::Result<RunOutcome> {
    let definition = definition.build()?;

    log::info!(
        "Running suite {} with {} scenarios",
        definition.name,
        definition.scenarios.len()
    );

    let run_id = definition
        .run_id
        .clone()
        .unwrap_or_else(|| nanoid::nanoid!());
    let seed = definition.seed.unwrap_or_else(rand::random);
    log::info!("Run id {run_id}, seed {seed}");

    let runtime = tokio::runtime::Runtime::new().context("Failed to create Tokio runtime")?;
    let stop_handle = ShutdownHandle::new();
    let hard_stop_handle = ShutdownHandle::new();
    let finished_handle = ShutdownHandle::new();
    start_shutdown_listener(&runtime, stop_handle.clone(), hard_stop_handle.clone());

    let executor = Arc::new(Executor::new(runtime, hard_stop_handle));
    let collector = Arc::new(MetricsCollector::new(definition.registry.clone()));
    let reporter: Box<dyn ReportCollector> = match definition.reporter {
        ReporterOpt::Summary => Box::new(SummaryReportCollector::new()),
        ReporterOpt::Noop => Box::new(NoopReportCollector),
    };

    let mut runner_context = RunnerContext::new(
        executor,
        collector.clone(),
        stop_handle.clone(),
        run_id.clone(),
        definition.target_url.clone(),
        definition.http_config.clone(),
    );

    if let Some(setup_fn) = definition.setup_fn {
        setup_fn(&mut runner_context)?;
    }

    // Only traffic generated by the scenarios counts towards the thresholds.
    collector.reset();
    let started_at = chrono::Utc::now();
    let started = Instant::now();

    let result = run_scenarios(
        &definition,
        Arc::new(runner_context),
        &stop_handle,
        &finished_handle,
        seed,
    );
    finished_handle.shutdown();
    collector.finish();
    let (scenarios, aborted) = result?;

    let result = evaluate(&definition.thresholds, &collector);
    let result = if aborted {
        result.into_aborted()
    } else {
        result
    };

    reporter.finalize(&collector, &result);

    let exit_code = if result.passed {
        EXIT_OK
    } else {
        EXIT_THRESHOLDS_FAILED
    };
    if !result.passed {
        for failed in result.failed_thresholds() {
            log::warn!(
                "Threshold `{}` on `{}` failed with {:?}",
                failed.expression,
                failed.selector,
                failed.value
            );
        }
    }

    let outcome = RunOutcome {
        run_id,
        result,
        scenarios,
        exit_code,
    };

    if let Some(path) = &definition.summary_file {
        let summary = build_run_summary(&definition.name, &outcome, started_at, started.elapsed());
        gale_summary_model::append_run_summary(summary, path.clone())
            .with_context(|| format!("Failed to write run summary to {}", path.display()))?;
    }

    Ok(outcome)
}

fn run_scenarios<RV: UserValuesConstraint, V: UserValuesConstraint>(
    definition: &ScenarioDefinition<RV, V>,
    runner_context: Arc<RunnerContext<RV>>,
    stop_handle: &ShutdownHandle,
    finished_handle: &ShutdownHandle,
    seed: u64,
) -> anyhow::Result<(Vec<ScenarioReport>, bool)> {
    let started = Instant::now();

    if !definition.no_progress {
        let planned_runtime = definition
            .scenarios
            .iter()
            .map(|s| s.planned_end())
            .max()
            .unwrap_or_default();
        start_progress(planned_runtime, finished_handle.new_listener())?;
    }

    // Ready to start spawning VUs so start the resource monitor to report high usage by the VUs
    // which might lead to a misleading outcome.
    start_monitor(finished_handle.new_listener())?;

    let aborted = start_threshold_monitor(
        definition
            .thresholds
            .iter()
            .filter(|t| t.abort_on_fail)
            .cloned()
            .collect(),
        runner_context.collector().clone(),
        stop_handle.clone(),
        finished_handle.new_listener(),
        started,
    )?;

    let next_global_vu_index = Arc::new(AtomicUsize::new(0));
    let mut handles = Vec::new();
    for scenario in &definition.scenarios {
        let workload = *definition
            .workloads
            .get(&scenario.workload)
            .ok_or_else(|| ConfigError::MissingWorkload {
                scenario: scenario.name.clone(),
                workload: scenario.workload.clone(),
            })?;

        let scheduler = ScenarioScheduler::new(
            Arc::new(scenario.clone()),
            VuHooks {
                setup: definition.setup_vu_fn,
                workload,
                teardown: definition.teardown_vu_fn,
            },
            runner_context.clone(),
            stop_handle.clone(),
            next_global_vu_index.clone(),
            seed,
        );

        let handle = std::thread::Builder::new()
            .name(format!("scenario-{}", scenario.name))
            .spawn(move || scheduler.run())
            .with_context(|| format!("Failed to start scenario {}", scenario.name))?;
        handles.push(handle);
    }

    let mut reports = Vec::with_capacity(handles.len());
    for handle in handles {
        let report = handle
            .join()
            .map_err(|e| anyhow::anyhow!("Error joining thread for scenario: {:?}", e))?;
        reports.push(report);
    }

    if let Some(teardown_fn) = definition.teardown_fn {
        // Don't fail the run if the teardown fails. We still want the reporting to happen
        // cleanly. The hook is documented as 'best effort'
        if let Err(e) = teardown_fn(runner_context.clone()) {
            log::error!("Teardown failed: {:?}", e);
        }
    }

    Ok((reports, aborted.load(Ordering::Acquire)))
}

fn build_run_summary(
    suite_name: &str,
    outcome: &RunOutcome,
    started_at: chrono::DateTime<chrono::Utc>,
    run_duration: Duration,
) -> RunSummary {
    let scenarios = outcome
        .scenarios
        .iter()
        .map(|s| ScenarioSummary {
            name: s.name.clone(),
            executor: s.executor.to_string(),
            planned_duration_s: s.planned_duration.as_secs_f64(),
            max_active_vus: s.max_active_vus,
            vus_started: s.vus_started,
            iterations: s.iterations,
            forced_stop: s.forced_stop,
        })
        .collect();

    let mut summary = RunSummary::new(
        outcome.run_id.clone(),
        suite_name.to_string(),
        started_at.timestamp(),
        scenarios,
        env!("CARGO_PKG_VERSION").to_string(),
    );
    summary.run_duration_ms = run_duration.as_millis() as u64;
    summary.thresholds = outcome
        .result
        .thresholds
        .iter()
        .map(|t| ThresholdSummary {
            selector: t.selector.clone(),
            expression: t.expression.clone(),
            value: t.value,
            passed: t.passed,
        })
        .collect();
    summary.metrics = outcome
        .result
        .metrics
        .iter()
        .map(|m| (m.name.clone(), m.stats.iter().cloned().collect::<BTreeMap<_, _>>()))
        .collect();
    summary.passed = outcome.result.passed;
    summary.aborted = outcome.result.aborted;
    summary.exit_code = outcome.exit_code as i32;
    for (key, value) in std::env::vars().filter(|(k, _)| k.starts_with("GALE_")) {
        summary.add_env(key, value);
    }
    summary.config_fingerprint = summary.fingerprint();
    log::debug!("Run configuration fingerprint {}", summary.config_fingerprint);

    summary
}

/// The process exit code for an error returned by [run].
pub fn exit_code_for(error: &anyhow::Error) -> u8 {
    if error.downcast_ref::<ConfigError>().is_some() {
        EXIT_INVALID_CONFIG
    } else {
        EXIT_RUNNER_ERROR
    }
}

/// Run the scenarios and turn the outcome into a process exit code. Intended to be returned from
/// a scenario's `main` function.
pub fn run_main<RV: UserValuesConstraint, V: UserValuesConstraint>(
    definition: ScenarioDefinitionBuilder<RV, V>,
) -> ExitCode {
    match run(definition) {
        Ok(outcome) => ExitCode::from(outcome.exit_code),
        Err(e) => {
            log::error!("Run failed: {e:?}");
            eprintln!("Error: {e:#}");
            ExitCode::from(exit_code_for(&e))
        }
    }
}
