use std::fmt::Debug;
use std::future::Future;
use std::sync::Arc;

use gale_core::prelude::{DelegatedShutdownListener, ShutdownHandle};
use gale_instruments::prelude::{MetricsCollector, TagSet};
use rand::rngs::StdRng;

use crate::config::HttpConfig;
use crate::executor::Executor;

pub trait UserValuesConstraint: Default + Debug + Send + Sync + 'static {}

/// State shared by every virtual user in the run.
///
/// The `RV` value can be filled in by the global setup hook, after which it is read only.
#[derive(Debug)]
pub struct RunnerContext<RV: UserValuesConstraint> {
    executor: Arc<Executor>,
    collector: Arc<MetricsCollector>,
    stop_handle: ShutdownHandle,
    run_id: String,
    target_url: Option<String>,
    http_config: HttpConfig,
    value: RV,
}

impl<RV: UserValuesConstraint> RunnerContext<RV> {
    pub(crate) fn new(
        executor: Arc<Executor>,
        collector: Arc<MetricsCollector>,
        stop_handle: ShutdownHandle,
        run_id: String,
        target_url: Option<String>,
        http_config: HttpConfig,
    ) -> Self {
        Self {
            executor,
            collector,
            stop_handle,
            run_id,
            target_url,
            http_config,
            value: Default::default(),
        }
    }

    pub fn executor(&self) -> &Arc<Executor> {
        &self.executor
    }

    pub fn collector(&self) -> &Arc<MetricsCollector> {
        &self.collector
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// The base URL of the system under test, from the CLI or the scenario configuration.
    pub fn target_url(&self) -> Option<&str> {
        self.target_url.as_deref()
    }

    /// Like [RunnerContext::target_url] but an error when no target is configured.
    pub fn require_target_url(&self) -> anyhow::Result<&str> {
        self.target_url()
            .ok_or_else(|| anyhow::anyhow!("No target URL configured, pass --target-url"))
    }

    pub fn http_config(&self) -> &HttpConfig {
        &self.http_config
    }

    /// Ask every scenario to stop as if the run had reached its end. In-flight iterations still get
    /// their graceful stop period.
    pub fn stop_run(&self) {
        self.stop_handle.shutdown();
    }

    pub fn is_stopping(&self) -> bool {
        self.stop_handle.is_shutdown()
    }

    pub fn get_mut(&mut self) -> &mut RV {
        &mut self.value
    }

    pub fn get(&self) -> &RV {
        &self.value
    }
}

/// The context of a single virtual user, passed to every workload call it makes.
pub struct VuContext<RV: UserValuesConstraint, V: UserValuesConstraint> {
    vu_id: usize,
    global_vu_index: usize,
    iteration: u64,
    scenario_name: Arc<str>,
    tags: Arc<TagSet>,
    runner_context: Arc<RunnerContext<RV>>,
    stop_listener: DelegatedShutdownListener,
    force_listener: DelegatedShutdownListener,
    rng: StdRng,
    value: V,
}

impl<RV: UserValuesConstraint, V: UserValuesConstraint> VuContext<RV, V> {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        vu_id: usize,
        global_vu_index: usize,
        scenario_name: Arc<str>,
        tags: Arc<TagSet>,
        runner_context: Arc<RunnerContext<RV>>,
        stop_listener: DelegatedShutdownListener,
        force_listener: DelegatedShutdownListener,
        rng: StdRng,
    ) -> Self {
        Self {
            vu_id,
            global_vu_index,
            iteration: 0,
            scenario_name,
            tags,
            runner_context,
            stop_listener,
            force_listener,
            rng,
            value: Default::default(),
        }
    }

    /// The id of this VU within its scenario, starting at 1.
    pub fn vu_id(&self) -> usize {
        self.vu_id
    }

    /// Index of this VU across every scenario in the run, starting at 0.
    pub fn global_vu_index(&self) -> usize {
        self.global_vu_index
    }

    /// How many iterations this VU has started before the current one.
    pub fn iteration(&self) -> u64 {
        self.iteration
    }

    pub(crate) fn next_iteration(&mut self) {
        self.iteration += 1;
    }

    pub fn scenario_name(&self) -> &str {
        &self.scenario_name
    }

    /// Tags attached to everything this VU records, always including `scenario`.
    pub fn tags(&self) -> &TagSet {
        &self.tags
    }

    pub fn runner_context(&self) -> &Arc<RunnerContext<RV>> {
        &self.runner_context
    }

    pub fn collector(&self) -> &Arc<MetricsCollector> {
        self.runner_context.collector()
    }

    /// Random number generator for this VU, seeded from the run seed and the VU index.
    pub fn rng(&mut self) -> &mut StdRng {
        &mut self.rng
    }

    /// Fires when the scenario starts its graceful stop. Long running workloads can check this to
    /// end their iteration early.
    pub fn shutdown_listener(&mut self) -> &mut DelegatedShutdownListener {
        &mut self.stop_listener
    }

    /// Run async code for this VU, blocking until it completes.
    ///
    /// The future is cancelled if the scenario's graceful stop runs out or the run is stopped
    /// immediately. The error is then a [gale_core::prelude::ShutdownSignalError] and the
    /// iteration is not recorded.
    pub fn execute<T>(&mut self, fut: impl Future<Output = anyhow::Result<T>>) -> anyhow::Result<T> {
        let executor = self.runner_context.executor().clone();
        executor.execute_until(fut, &mut self.force_listener)
    }

    pub fn get_mut(&mut self) -> &mut V {
        &mut self.value
    }

    pub fn get(&self) -> &V {
        &self.value
    }
}
