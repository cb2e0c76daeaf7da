use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use gale_instruments::prelude::{MetricKind, MetricRegistry, ThresholdSpec};

use crate::cli::{GaleScenarioCli, ReporterOpt};
use crate::config::{ConfigError, HttpConfig, RunConfig};
use crate::context::{RunnerContext, UserValuesConstraint, VuContext};
use crate::init::init;
use crate::scenario::Scenario;

pub type HookResult = anyhow::Result<()>;

pub type GlobalHookMut<RV> = fn(&mut RunnerContext<RV>) -> HookResult;
pub type GlobalHook<RV> = fn(Arc<RunnerContext<RV>>) -> HookResult;
pub type VuHookMut<RV, V> = fn(&mut VuContext<RV, V>) -> HookResult;

/// The builder for a scenario suite definition.
///
/// This must be used at the start of a test to define the workloads that you want to run. Which
/// workload runs under which VU profile comes from the TOML configuration.
pub struct ScenarioDefinitionBuilder<RV: UserValuesConstraint, V: UserValuesConstraint> {
    /// The name of the suite.
    ///
    /// Recommended value is `env!("CARGO_PKG_NAME")`.
    name: String,
    /// This value is initialised for you and you cannot change it.
    #[doc(hidden)]
    cli: GaleScenarioCli,
    /// Configuration used when `--config` is not given, usually `include_str!("../scenario.toml")`.
    default_config: Option<String>,
    /// Configuration built in code, takes precedence over `default_config`.
    config: Option<RunConfig>,
    /// Global setup hook for this suite. It will be run once, before any VUs are started.
    setup_fn: Option<GlobalHookMut<RV>>,
    /// Setup hook for a VU, which will be run once for each VU as it starts.
    setup_vu_fn: Option<VuHookMut<RV, V>>,
    /// The workloads for this suite. Each scenario runs one of these in a loop on every VU.
    workloads: HashMap<String, VuHookMut<RV, V>>,
    /// Workload names registered more than once, reported when the definition is built.
    duplicate_workloads: Vec<String>,
    /// Teardown hook for a VU, run once when the VU stops.
    teardown_vu_fn: Option<VuHookMut<RV, V>>,
    /// Global teardown hook, run once after every VU has stopped. Errors are logged, not returned.
    teardown_fn: Option<GlobalHook<RV>>,
    custom_metrics: Vec<(String, MetricKind)>,
}

pub struct ScenarioDefinition<RV: UserValuesConstraint, V: UserValuesConstraint> {
    pub name: String,
    pub scenarios: Vec<Scenario>,
    pub thresholds: Vec<ThresholdSpec>,
    pub registry: MetricRegistry,
    pub http_config: HttpConfig,
    pub target_url: Option<String>,
    pub seed: Option<u64>,
    pub no_progress: bool,
    pub reporter: ReporterOpt,
    pub run_id: Option<String>,
    pub summary_file: Option<PathBuf>,
    pub setup_fn: Option<GlobalHookMut<RV>>,
    pub setup_vu_fn: Option<VuHookMut<RV, V>>,
    pub workloads: HashMap<String, VuHookMut<RV, V>>,
    pub teardown_vu_fn: Option<VuHookMut<RV, V>>,
    pub teardown_fn: Option<GlobalHook<RV>>,
}

impl<RV: UserValuesConstraint, V: UserValuesConstraint> ScenarioDefinitionBuilder<RV, V> {
    /// Initialise a new definition from the suite name and already parsed command line arguments.
    /// See the [ScenarioDefinitionBuilder::name] for more information about the name.
    pub fn new(name: &str, cli: GaleScenarioCli) -> Self {
        Self {
            name: name.to_string(),
            cli,
            default_config: None,
            config: None,
            setup_fn: None,
            setup_vu_fn: None,
            workloads: HashMap::new(),
            duplicate_workloads: Vec::new(),
            teardown_vu_fn: None,
            teardown_fn: None,
            custom_metrics: Vec::new(),
        }
    }

    /// Initialise logging, parse the command line and create a new definition.
    pub fn new_with_init(name: &str) -> Self {
        Self::new(name, init())
    }

    /// Set the TOML configuration to use when none is given with `--config`.
    pub fn with_default_config(mut self, toml: &str) -> Self {
        self.default_config = Some(toml.to_string());
        self
    }

    /// Set the configuration directly. `--config` still takes precedence.
    pub fn with_config(mut self, config: RunConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the global setup hook [ScenarioDefinitionBuilder::setup_fn] for this suite.
    pub fn use_setup(mut self, setup_fn: GlobalHookMut<RV>) -> Self {
        self.setup_fn = Some(setup_fn);
        self
    }

    /// Set the VU setup hook [ScenarioDefinitionBuilder::setup_vu_fn] for this suite.
    pub fn use_vu_setup(mut self, setup_vu_fn: VuHookMut<RV, V>) -> Self {
        self.setup_vu_fn = Some(setup_vu_fn);
        self
    }

    /// Set the `default` workload, used by scenarios that don't name one.
    pub fn use_workload(self, workload: VuHookMut<RV, V>) -> Self {
        self.use_named_workload(crate::config::DEFAULT_WORKLOAD, workload)
    }

    /// Add a named workload. A scenario with the same name uses it unless it sets `workload`.
    pub fn use_named_workload(mut self, name: &str, workload: VuHookMut<RV, V>) -> Self {
        if self.workloads.insert(name.to_string(), workload).is_some() {
            self.duplicate_workloads.push(name.to_string());
        }
        self
    }

    pub fn use_vu_teardown(mut self, teardown_vu_fn: VuHookMut<RV, V>) -> Self {
        self.teardown_vu_fn = Some(teardown_vu_fn);
        self
    }

    pub fn use_teardown(mut self, teardown_fn: GlobalHook<RV>) -> Self {
        self.teardown_fn = Some(teardown_fn);
        self
    }

    /// Register a custom metric so that workloads can record it and thresholds can select it.
    pub fn register_metric(mut self, name: &str, kind: MetricKind) -> Self {
        self.custom_metrics.push((name.to_string(), kind));
        self
    }

    /// Resolve the configuration against the registered workloads and metrics.
    ///
    /// Nothing has started when this fails, and every configuration problem is a [ConfigError].
    pub(crate) fn build(self) -> anyhow::Result<ScenarioDefinition<RV, V>> {
        if let Some(name) = self.duplicate_workloads.first() {
            anyhow::bail!("Workload [{}] is already defined", name);
        }

        let config = match (&self.cli.config, self.config, &self.default_config) {
            (Some(path), _, _) => RunConfig::load(path)?,
            (None, Some(config), _) => config,
            (None, None, Some(toml)) => RunConfig::from_toml_str(toml)?,
            (None, None, None) => return Err(ConfigError::NoScenarios.into()),
        };

        let mut registry = MetricRegistry::default();
        for (name, kind) in &self.custom_metrics {
            if !registry.register(name, *kind) {
                return Err(ConfigError::MetricConflict(name.clone()).into());
            }
        }

        let workloads = self.workloads;
        let scenarios = config.scenarios(|name| workloads.contains_key(name))?;
        let thresholds = config.thresholds(&registry)?;
        // Fail before the run starts rather than on the first request.
        config.http.timeout()?;

        Ok(ScenarioDefinition {
            name: self.name,
            scenarios,
            thresholds,
            registry,
            http_config: config.http,
            target_url: self.cli.target_url.or(config.target_url),
            seed: self.cli.seed.or(config.seed),
            no_progress: self.cli.no_progress,
            reporter: self.cli.reporter,
            run_id: self.cli.run_id,
            summary_file: self.cli.summary_file,
            setup_fn: self.setup_fn,
            setup_vu_fn: self.setup_vu_fn,
            workloads,
            teardown_vu_fn: self.teardown_vu_fn,
            teardown_fn: self.teardown_fn,
        })
    }
}
