use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use gale_instruments::prelude::{MetricRegistry, TagSet, ThresholdError, ThresholdSpec};
use serde::Deserialize;

use crate::duration::parse_duration;
use crate::scenario::{ExecutorKind, Scenario, Stage};

/// The workload name used when neither the scenario nor a matching named workload is set.
pub const DEFAULT_WORKLOAD: &str = "default";

const DEFAULT_GRACEFUL_STOP: Duration = Duration::from_secs(30);

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read configuration file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("No scenarios configured")]
    NoScenarios,
    #[error("Invalid duration `{value}` for `{field}` in {location}")]
    InvalidDuration {
        location: String,
        field: &'static str,
        value: String,
    },
    #[error("Scenario `{scenario}` is missing `{field}`, which {executor} requires")]
    MissingField {
        scenario: String,
        field: &'static str,
        executor: &'static str,
    },
    #[error("Scenario `{scenario}` sets `{field}`, which {executor} does not use")]
    UnexpectedField {
        scenario: String,
        field: &'static str,
        executor: &'static str,
    },
    #[error("Scenario `{0}` has no stages")]
    EmptyStages(String),
    #[error("Invalid threshold `{expression}` on `{selector}`: {source}")]
    Threshold {
        selector: String,
        expression: String,
        source: ThresholdError,
    },
    #[error("Scenario `{scenario}` uses workload `{workload}` which is not defined")]
    MissingWorkload { scenario: String, workload: String },
    #[error("Custom metric `{0}` conflicts with an existing metric of a different kind")]
    MetricConflict(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExecutorName {
    ConstantVus,
    RampingVus,
}

impl ExecutorName {
    fn label(&self) -> &'static str {
        match self {
            ExecutorName::ConstantVus => "constant-vus",
            ExecutorName::RampingVus => "ramping-vus",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StageConfig {
    pub duration: String,
    pub target: usize,
}

/// One `[scenarios.<name>]` table.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScenarioConfig {
    pub executor: ExecutorName,
    pub vus: Option<usize>,
    pub duration: Option<String>,
    pub start_vus: Option<usize>,
    pub stages: Option<Vec<StageConfig>>,
    pub graceful_stop: Option<String>,
    pub start_time: Option<String>,
    pub pause: Option<String>,
    pub workload: Option<String>,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

/// A threshold is either a bare expression or a table with abort options.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ThresholdEntry {
    Expression(String),
    Detailed {
        threshold: String,
        #[serde(default)]
        abort_on_fail: bool,
        delay_abort_eval: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HttpConfig {
    /// Per request timeout.
    #[serde(default = "default_timeout")]
    pub timeout: String,
    /// Idle connections kept open per target host.
    #[serde(default = "default_max_idle_per_host")]
    pub max_idle_per_host: usize,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: default_timeout(),
            max_idle_per_host: default_max_idle_per_host(),
            user_agent: default_user_agent(),
        }
    }
}

impl HttpConfig {
    pub fn timeout(&self) -> Result<Duration, ConfigError> {
        duration_field("[http]", "timeout", &self.timeout)
    }
}

fn default_timeout() -> String {
    "60s".to_string()
}

fn default_max_idle_per_host() -> usize {
    32
}

fn default_user_agent() -> String {
    format!("gale/{}", env!("CARGO_PKG_VERSION"))
}

/// The declarative configuration of a run, usually loaded from TOML.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunConfig {
    /// Base URL of the system under test. Overridden by `--target-url`.
    pub target_url: Option<String>,
    /// Seed for the per-VU random number generators. Overridden by `--seed`.
    pub seed: Option<u64>,
    #[serde(default)]
    pub scenarios: BTreeMap<String, ScenarioConfig>,
    #[serde(default)]
    pub thresholds: BTreeMap<String, Vec<ThresholdEntry>>,
    #[serde(default)]
    pub http: HttpConfig,
}

impl RunConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(input)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Turn every scenario table into a [Scenario], in name order.
    ///
    /// `has_workload` decides which workload names exist.
    pub fn scenarios(
        &self,
        has_workload: impl Fn(&str) -> bool,
    ) -> Result<Vec<Scenario>, ConfigError> {
        if self.scenarios.is_empty() {
            return Err(ConfigError::NoScenarios);
        }

        self.scenarios
            .iter()
            .map(|(name, config)| {
                let scenario = config.to_scenario(name, &has_workload)?;
                if !has_workload(&scenario.workload) {
                    return Err(ConfigError::MissingWorkload {
                        scenario: name.clone(),
                        workload: scenario.workload,
                    });
                }
                Ok(scenario)
            })
            .collect()
    }

    /// Parse every threshold and check it against the metrics that will be tracked.
    pub fn thresholds(&self, registry: &MetricRegistry) -> Result<Vec<ThresholdSpec>, ConfigError> {
        let mut specs = Vec::new();
        for (selector, entries) in &self.thresholds {
            for entry in entries {
                let (expression, abort) = match entry {
                    ThresholdEntry::Expression(expression) => (expression, None),
                    ThresholdEntry::Detailed {
                        threshold,
                        abort_on_fail,
                        delay_abort_eval,
                    } => {
                        let delay = match delay_abort_eval {
                            Some(d) => duration_field(
                                &format!("threshold `{selector}`"),
                                "delay_abort_eval",
                                d,
                            )?,
                            None => Duration::ZERO,
                        };
                        (threshold, abort_on_fail.then_some(delay))
                    }
                };

                let spec = ThresholdSpec::parse(selector, expression)
                    .and_then(|spec| spec.validate(registry).map(|_| spec))
                    .map_err(|source| ConfigError::Threshold {
                        selector: selector.clone(),
                        expression: expression.clone(),
                        source,
                    })?;

                specs.push(match abort {
                    Some(delay) => spec.with_abort_on_fail(delay),
                    None => spec,
                });
            }
        }
        Ok(specs)
    }
}

impl ScenarioConfig {
    fn to_scenario(
        &self,
        name: &str,
        has_workload: &impl Fn(&str) -> bool,
    ) -> Result<Scenario, ConfigError> {
        let location = format!("scenario `{name}`");
        let executor_label = self.executor.label();
        let missing = |field| ConfigError::MissingField {
            scenario: name.to_string(),
            field,
            executor: executor_label,
        };
        let unexpected = |field| ConfigError::UnexpectedField {
            scenario: name.to_string(),
            field,
            executor: executor_label,
        };

        let executor = match self.executor {
            ExecutorName::ConstantVus => {
                if self.stages.is_some() {
                    return Err(unexpected("stages"));
                }
                if self.start_vus.is_some() {
                    return Err(unexpected("start_vus"));
                }
                let vus = self.vus.ok_or_else(|| missing("vus"))?;
                let duration = self.duration.as_deref().ok_or_else(|| missing("duration"))?;
                ExecutorKind::ConstantVus {
                    vus,
                    duration: duration_field(&location, "duration", duration)?,
                }
            }
            ExecutorName::RampingVus => {
                if self.vus.is_some() {
                    return Err(unexpected("vus"));
                }
                if self.duration.is_some() {
                    return Err(unexpected("duration"));
                }
                let stages = self.stages.as_ref().ok_or_else(|| missing("stages"))?;
                if stages.is_empty() {
                    return Err(ConfigError::EmptyStages(name.to_string()));
                }
                ExecutorKind::RampingVus {
                    start_vus: self.start_vus.unwrap_or(1),
                    stages: stages
                        .iter()
                        .map(|stage| {
                            Ok(Stage {
                                duration: duration_field(
                                    &location,
                                    "stages.duration",
                                    &stage.duration,
                                )?,
                                target: stage.target,
                            })
                        })
                        .collect::<Result<Vec<_>, ConfigError>>()?,
                }
            }
        };

        let optional_duration = |field, value: &Option<String>| {
            value
                .as_deref()
                .map(|v| duration_field(&location, field, v))
                .transpose()
        };

        let workload = match &self.workload {
            Some(workload) => workload.clone(),
            None if has_workload(name) => name.to_string(),
            None => DEFAULT_WORKLOAD.to_string(),
        };

        let mut tags = self.tags.iter().collect::<TagSet>();
        tags.insert("scenario", name);

        Ok(Scenario {
            name: name.to_string(),
            executor,
            graceful_stop: optional_duration("graceful_stop", &self.graceful_stop)?
                .unwrap_or(DEFAULT_GRACEFUL_STOP),
            start_time: optional_duration("start_time", &self.start_time)?.unwrap_or_default(),
            pause: optional_duration("pause", &self.pause)?.filter(|p| !p.is_zero()),
            workload,
            tags,
        })
    }
}

fn duration_field(location: &str, field: &'static str, value: &str) -> Result<Duration, ConfigError> {
    parse_duration(value).ok_or_else(|| ConfigError::InvalidDuration {
        location: location.to_string(),
        field,
        value: value.to_string(),
    })
}
