mod cli;
mod config;
mod context;
mod definition;
mod duration;
mod executor;
mod init;
mod monitor;
mod progress;
mod run;
mod scenario;
mod scheduler;
mod shutdown;
mod threshold_monitor;
mod types;

pub mod prelude {
    pub use crate::cli::{GaleScenarioCli, ReporterOpt};
    pub use crate::config::{
        ConfigError, HttpConfig, RunConfig, ScenarioConfig, StageConfig, ThresholdEntry,
        DEFAULT_WORKLOAD,
    };
    pub use crate::context::{RunnerContext, UserValuesConstraint, VuContext};
    pub use crate::definition::{HookResult, ScenarioDefinitionBuilder};
    pub use crate::duration::parse_duration;
    pub use crate::executor::Executor;
    pub use crate::init::init;
    pub use crate::run::{
        exit_code_for, run, run_main, RunOutcome, EXIT_INVALID_CONFIG, EXIT_OK,
        EXIT_RUNNER_ERROR, EXIT_THRESHOLDS_FAILED,
    };
    pub use crate::scenario::{ExecutorKind, Scenario, ScenarioState, Stage};
    pub use crate::scheduler::ScenarioReport;
    pub use crate::types::GaleResult;

    pub use gale_core::prelude::*;
    pub use gale_instruments::prelude::*;
    pub use gale_instruments::{
        CHECKS, HTTP_REQS, HTTP_REQ_DURATION, HTTP_REQ_FAILED, ITERATIONS, ITERATION_DURATION, VUS,
    };
    pub use rand::Rng;
}
