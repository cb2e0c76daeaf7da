use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use gale_core::prelude::{
    DelegatedShutdownListener, ShutdownHandle, ShutdownSignalError, VuBailError,
};
use gale_instruments::VUS;
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::context::{RunnerContext, UserValuesConstraint, VuContext};
use crate::definition::VuHookMut;
use crate::scenario::{Scenario, ScenarioState};

/// How often the control loop matches the running VUs to the executor's target.
const CONTROL_TICK: Duration = Duration::from_millis(100);

/// How often to check whether stopping VUs have exited during graceful stop.
const GRACEFUL_POLL: Duration = Duration::from_millis(20);

/// How long cancelled VUs get to unwind after a forced stop before they are detached.
const FORCED_STOP_JOIN: Duration = Duration::from_millis(500);

/// Delay before replacing a VU whose setup hook failed, doubled on each consecutive failure.
const SETUP_RETRY_MIN: Duration = Duration::from_secs(1);
const SETUP_RETRY_MAX: Duration = Duration::from_secs(30);

/// What a scenario did, for the end of run summary.
#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioReport {
    pub name: String,
    pub executor: &'static str,
    pub planned_duration: Duration,
    pub max_active_vus: usize,
    pub vus_started: usize,
    pub iterations: u64,
    pub forced_stop: bool,
}

/// The hooks each VU of a scenario runs.
pub(crate) struct VuHooks<RV: UserValuesConstraint, V: UserValuesConstraint> {
    pub setup: Option<VuHookMut<RV, V>>,
    pub workload: VuHookMut<RV, V>,
    pub teardown: Option<VuHookMut<RV, V>>,
}

impl<RV: UserValuesConstraint, V: UserValuesConstraint> Clone for VuHooks<RV, V> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<RV: UserValuesConstraint, V: UserValuesConstraint> Copy for VuHooks<RV, V> {}

/// Counters shared between the control loop and its VUs.
#[derive(Debug, Default)]
struct Counters {
    active: AtomicUsize,
    max_active: AtomicUsize,
    iterations: AtomicU64,
}

/// Decrements the active VU count when the VU thread ends, even by panic.
struct ActiveGuard(Arc<Counters>);

impl ActiveGuard {
    fn new(counters: Arc<Counters>) -> Self {
        let active = counters.active.fetch_add(1, Ordering::AcqRel) + 1;
        counters.max_active.fetch_max(active, Ordering::AcqRel);
        Self(counters)
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.active.fetch_sub(1, Ordering::AcqRel);
    }
}

struct VuHandle {
    vu_id: usize,
    retiring: Arc<AtomicBool>,
    setup_failed: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

impl VuHandle {
    fn join(self, scenario_name: &str) {
        if self.handle.join().is_err() {
            log::error!("VU {} of scenario {} panicked", self.vu_id, scenario_name);
        }
    }
}

/// Runs the virtual users of one scenario from its start time until every VU has stopped.
pub(crate) struct ScenarioScheduler<RV: UserValuesConstraint, V: UserValuesConstraint> {
    scenario: Arc<Scenario>,
    hooks: VuHooks<RV, V>,
    runner_context: Arc<RunnerContext<RV>>,
    run_stop_handle: ShutdownHandle,
    next_global_vu_index: Arc<AtomicUsize>,
    seed: u64,
}

impl<RV: UserValuesConstraint, V: UserValuesConstraint> ScenarioScheduler<RV, V> {
    pub(crate) fn new(
        scenario: Arc<Scenario>,
        hooks: VuHooks<RV, V>,
        runner_context: Arc<RunnerContext<RV>>,
        run_stop_handle: ShutdownHandle,
        next_global_vu_index: Arc<AtomicUsize>,
        seed: u64,
    ) -> Self {
        Self {
            scenario,
            hooks,
            runner_context,
            run_stop_handle,
            next_global_vu_index,
            seed,
        }
    }

    pub(crate) fn run(self) -> ScenarioReport {
        let scenario = self.scenario.clone();
        let counters = Arc::new(Counters::default());
        let mut report = ScenarioReport {
            name: scenario.name.clone(),
            executor: scenario.executor.label(),
            planned_duration: scenario.executor.duration(),
            max_active_vus: 0,
            vus_started: 0,
            iterations: 0,
            forced_stop: false,
        };

        let mut run_stop_listener = self.run_stop_handle.new_listener();
        if !scenario.start_time.is_zero() {
            log::debug!(
                "Scenario {} starts in {:?}",
                scenario.name,
                scenario.start_time
            );
            self.runner_context
                .executor()
                .sleep_until(scenario.start_time, &mut run_stop_listener);
        }
        if self.run_stop_handle.is_shutdown() {
            log::info!("Scenario {} stopped before it started", scenario.name);
            return report;
        }

        let stop_handle = ShutdownHandle::new();
        let force_handle = ShutdownHandle::new();
        let mut vus: Vec<VuHandle> = Vec::new();
        let mut next_vu_id = 1;
        let mut state = ScenarioState::Steady;
        let mut setup_backoff = SETUP_RETRY_MIN;
        let mut spawn_after: Option<Instant> = None;

        log::info!(
            "Starting scenario {} ({}, up to {} VUs for {:?})",
            scenario.name,
            scenario.executor.label(),
            scenario.executor.max_vus(),
            scenario.executor.duration()
        );

        let started = Instant::now();
        let duration = scenario.executor.duration();
        loop {
            let elapsed = started.elapsed();
            if elapsed >= duration || self.run_stop_handle.is_shutdown() {
                break;
            }

            let phase = scenario.executor.phase_at(elapsed);
            if phase != state {
                log::debug!("Scenario {} is {}", scenario.name, phase);
                state = phase;
            }

            let setup_failures = reap_finished(&mut vus, &scenario.name);
            if setup_failures > 0 {
                log::warn!(
                    "VU setup failed in scenario {}, replacing it in {:?}",
                    scenario.name,
                    setup_backoff
                );
                spawn_after = Some(Instant::now() + setup_backoff);
                setup_backoff = (setup_backoff * 2).min(SETUP_RETRY_MAX);
            }

            let target = scenario.executor.target_at(elapsed);
            let running = vus
                .iter()
                .filter(|vu| !vu.retiring.load(Ordering::Acquire))
                .count();
            let may_spawn = spawn_after.map_or(true, |at| Instant::now() >= at);

            if running < target && may_spawn {
                for _ in running..target {
                    match self.spawn_vu(next_vu_id, &stop_handle, &force_handle, &counters) {
                        Ok(vu) => {
                            vus.push(vu);
                            next_vu_id += 1;
                            report.vus_started += 1;
                        }
                        Err(e) => {
                            log::error!("Failed to start VU for scenario {}: {e:?}", scenario.name);
                            break;
                        }
                    }
                }
            } else if running > target {
                // Newest first
                vus.iter()
                    .rev()
                    .filter(|vu| !vu.retiring.load(Ordering::Acquire))
                    .take(running - target)
                    .for_each(|vu| {
                        log::trace!("Retiring VU {} of scenario {}", vu.vu_id, scenario.name);
                        vu.retiring.store(true, Ordering::Release);
                    });
            }

            self.record_vus(counters.active.load(Ordering::Acquire));

            std::thread::sleep(CONTROL_TICK.min(duration.saturating_sub(started.elapsed())));
        }

        log::debug!(
            "Scenario {} is {}, waiting up to {:?} for {} VUs",
            scenario.name,
            ScenarioState::GracefulStop,
            scenario.graceful_stop,
            counters.active.load(Ordering::Acquire)
        );
        stop_handle.shutdown();

        let deadline = Instant::now() + scenario.graceful_stop;
        while !vus.iter().all(|vu| vu.handle.is_finished()) {
            if Instant::now() >= deadline {
                log::warn!(
                    "Scenario {} did not stop within {:?}, cancelling in-flight iterations",
                    scenario.name,
                    scenario.graceful_stop
                );
                force_handle.shutdown();
                report.forced_stop = true;
                break;
            }
            std::thread::sleep(GRACEFUL_POLL);
        }

        if report.forced_stop {
            let deadline = Instant::now() + FORCED_STOP_JOIN;
            while Instant::now() < deadline && !vus.iter().all(|vu| vu.handle.is_finished()) {
                std::thread::sleep(GRACEFUL_POLL);
            }
        }

        let mut detached = 0;
        for vu in vus {
            if vu.handle.is_finished() {
                vu.join(&scenario.name);
            } else {
                // Blocked outside the executor, nothing can interrupt it.
                log::warn!(
                    "VU {} of scenario {} did not respond to the forced stop and was detached",
                    vu.vu_id,
                    scenario.name
                );
                detached += 1;
            }
        }
        self.record_vus(
            counters
                .active
                .load(Ordering::Acquire)
                .saturating_sub(detached),
        );

        report.max_active_vus = counters.max_active.load(Ordering::Acquire);
        report.iterations = counters.iterations.load(Ordering::Acquire);
        log::info!(
            "Scenario {} is {} after {} iterations",
            scenario.name,
            ScenarioState::Done,
            report.iterations
        );

        report
    }

    fn record_vus(&self, active: usize) {
        if let Err(e) = self
            .runner_context
            .collector()
            .add(VUS, &self.scenario.tags, active as f64)
        {
            log::warn!("Failed to record VU count: {e}");
        }
    }

    fn spawn_vu(
        &self,
        vu_id: usize,
        stop_handle: &ShutdownHandle,
        force_handle: &ShutdownHandle,
        counters: &Arc<Counters>,
    ) -> std::io::Result<VuHandle> {
        let global_vu_index = self.next_global_vu_index.fetch_add(1, Ordering::AcqRel);
        let rng = StdRng::seed_from_u64(vu_seed(self.seed, global_vu_index));
        let retiring = Arc::new(AtomicBool::new(false));
        let setup_failed = Arc::new(AtomicBool::new(false));

        let vu = VirtualUser {
            scenario: self.scenario.clone(),
            hooks: self.hooks,
            retiring: retiring.clone(),
            setup_failed: setup_failed.clone(),
            stop_listener: stop_handle.new_listener(),
            force_listener: force_handle.new_listener(),
            hard_stop_handle: self.runner_context.executor().hard_stop_handle().clone(),
            counters: counters.clone(),
        };
        let context = VuContext::new(
            vu_id,
            global_vu_index,
            Arc::from(self.scenario.name.as_str()),
            Arc::new(self.scenario.tags.clone()),
            self.runner_context.clone(),
            stop_handle.new_listener(),
            force_handle.new_listener(),
            rng,
        );

        let handle = std::thread::Builder::new()
            .name(format!("{}-vu-{}", self.scenario.name, vu_id))
            .spawn(move || vu.run(context))?;

        Ok(VuHandle {
            vu_id,
            retiring,
            setup_failed,
            handle,
        })
    }
}

/// Derive the RNG seed of a VU so that every VU gets a different but repeatable stream.
fn vu_seed(run_seed: u64, global_vu_index: usize) -> u64 {
    run_seed.wrapping_add((global_vu_index as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15))
}

/// Join and drop VUs whose thread has ended, so the control loop can replace them.
///
/// Returns how many of them stopped because their setup hook failed.
fn reap_finished(vus: &mut Vec<VuHandle>, scenario_name: &str) -> usize {
    let (finished, running): (Vec<_>, Vec<_>) =
        vus.drain(..).partition(|vu| vu.handle.is_finished());
    *vus = running;

    let mut setup_failures = 0;
    for vu in finished {
        if vu.setup_failed.load(Ordering::Acquire) {
            setup_failures += 1;
        }
        vu.join(scenario_name);
    }
    setup_failures
}

struct VirtualUser<RV: UserValuesConstraint, V: UserValuesConstraint> {
    scenario: Arc<Scenario>,
    hooks: VuHooks<RV, V>,
    retiring: Arc<AtomicBool>,
    setup_failed: Arc<AtomicBool>,
    stop_listener: DelegatedShutdownListener,
    force_listener: DelegatedShutdownListener,
    hard_stop_handle: ShutdownHandle,
    counters: Arc<Counters>,
}

impl<RV: UserValuesConstraint, V: UserValuesConstraint> VirtualUser<RV, V> {
    fn run(mut self, mut context: VuContext<RV, V>) {
        let _active = ActiveGuard::new(self.counters.clone());
        let vu_id = context.vu_id();

        if let Some(setup) = self.hooks.setup {
            if let Err(e) = setup(&mut context) {
                log::error!(
                    "VU setup failed for VU {} of scenario {}: {:?}",
                    vu_id,
                    self.scenario.name,
                    e
                );
                self.setup_failed.store(true, Ordering::Release);
                return;
            }
        }

        let collector = context.collector().clone();
        let executor = context.runner_context().executor().clone();
        loop {
            if self.should_stop() {
                log::debug!("Stopping VU {} of scenario {}", vu_id, self.scenario.name);
                break;
            }

            let iteration_started = Instant::now();
            let result = (self.hooks.workload)(&mut context);
            let forced = self.is_forced();
            match result {
                Ok(()) if forced => {
                    log::debug!(
                        "Discarding iteration {} of VU {} in scenario {}, it outlived the forced stop",
                        context.iteration(),
                        vu_id,
                        self.scenario.name
                    );
                }
                Ok(()) => {
                    collector.record_iteration(&self.scenario.tags, iteration_started.elapsed());
                    self.counters.iterations.fetch_add(1, Ordering::AcqRel);
                }
                Err(e) if e.is::<ShutdownSignalError>() => {
                    // The iteration was cancelled, the check at the top of the loop will catch this.
                }
                Err(e) if e.is::<VuBailError>() => {
                    log::warn!(
                        "VU {} of scenario {} bailed: {}",
                        vu_id,
                        self.scenario.name,
                        e
                    );
                    break;
                }
                Err(e) => {
                    log::error!(
                        "Workload failed for VU {} of scenario {}: {:?}",
                        vu_id,
                        self.scenario.name,
                        e
                    );
                }
            }
            context.next_iteration();

            if let Some(pause) = self.scenario.pause {
                if !self.should_stop() {
                    executor.sleep_until(pause, &mut self.stop_listener);
                }
            }
        }

        if let Some(teardown) = self.hooks.teardown {
            if let Err(e) = teardown(&mut context) {
                log::error!(
                    "VU teardown failed for VU {} of scenario {}: {:?}",
                    vu_id,
                    self.scenario.name,
                    e
                );
            }
        }
    }

    fn should_stop(&mut self) -> bool {
        self.retiring.load(Ordering::Acquire)
            || self.stop_listener.should_shutdown()
            || self.is_forced()
    }

    fn is_forced(&mut self) -> bool {
        self.force_listener.should_shutdown() || self.hard_stop_handle.is_shutdown()
    }
}
