use std::fmt::{Display, Formatter};
use std::time::Duration;

use gale_instruments::prelude::TagSet;

/// A time-bounded target VU count. Over its duration the VU count moves linearly from the
/// previous target to this one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stage {
    pub duration: Duration,
    pub target: usize,
}

/// How many virtual users a scenario runs over time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutorKind {
    ConstantVus { vus: usize, duration: Duration },
    RampingVus { start_vus: usize, stages: Vec<Stage> },
}

impl ExecutorKind {
    pub fn label(&self) -> &'static str {
        match self {
            ExecutorKind::ConstantVus { .. } => "constant-vus",
            ExecutorKind::RampingVus { .. } => "ramping-vus",
        }
    }

    /// The nominal run time, excluding graceful stop.
    pub fn duration(&self) -> Duration {
        match self {
            ExecutorKind::ConstantVus { duration, .. } => *duration,
            ExecutorKind::RampingVus { stages, .. } => stages.iter().map(|s| s.duration).sum(),
        }
    }

    pub fn max_vus(&self) -> usize {
        match self {
            ExecutorKind::ConstantVus { vus, .. } => *vus,
            ExecutorKind::RampingVus { start_vus, stages } => stages
                .iter()
                .map(|s| s.target)
                .fold(*start_vus, usize::max),
        }
    }

    /// The number of VUs that should be running `elapsed` after the scenario started.
    ///
    /// For ramping executors this is the piecewise linear interpolation across the stages,
    /// rounded down. Past the last stage the final target holds.
    pub fn target_at(&self, elapsed: Duration) -> usize {
        match self {
            ExecutorKind::ConstantVus { vus, .. } => *vus,
            ExecutorKind::RampingVus { start_vus, stages } => {
                let mut from = *start_vus;
                let mut stage_start = Duration::ZERO;
                for stage in stages {
                    let stage_end = stage_start + stage.duration;
                    if elapsed < stage_end {
                        let progress = (elapsed - stage_start).as_secs_f64()
                            / stage.duration.as_secs_f64();
                        let value =
                            from as f64 + (stage.target as f64 - from as f64) * progress;
                        return value.floor().max(0.0) as usize;
                    }
                    from = stage.target;
                    stage_start = stage_end;
                }
                from
            }
        }
    }

    /// Which phase of its lifetime the executor is in, `elapsed` after the scenario started.
    pub fn phase_at(&self, elapsed: Duration) -> ScenarioState {
        match self {
            ExecutorKind::ConstantVus { .. } => ScenarioState::Steady,
            ExecutorKind::RampingVus { start_vus, stages } => {
                let mut from = *start_vus;
                let mut stage_start = Duration::ZERO;
                for stage in stages {
                    let stage_end = stage_start + stage.duration;
                    if elapsed < stage_end {
                        return match stage.target.cmp(&from) {
                            std::cmp::Ordering::Greater => ScenarioState::RampingUp,
                            std::cmp::Ordering::Less => ScenarioState::RampingDown,
                            std::cmp::Ordering::Equal => ScenarioState::Steady,
                        };
                    }
                    from = stage.target;
                    stage_start = stage_end;
                }
                ScenarioState::Steady
            }
        }
    }
}

/// The lifecycle of a running scenario.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScenarioState {
    RampingUp,
    Steady,
    RampingDown,
    GracefulStop,
    Done,
}

impl Display for ScenarioState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ScenarioState::RampingUp => "ramping-up",
            ScenarioState::Steady => "steady",
            ScenarioState::RampingDown => "ramping-down",
            ScenarioState::GracefulStop => "graceful-stop",
            ScenarioState::Done => "done",
        };
        write!(f, "{name}")
    }
}

/// A validated scenario, immutable once the run starts.
#[derive(Debug, Clone, PartialEq)]
pub struct Scenario {
    pub name: String,
    pub executor: ExecutorKind,
    pub graceful_stop: Duration,
    /// Delay between the start of the run and the start of this scenario.
    pub start_time: Duration,
    /// Fixed delay after every iteration.
    pub pause: Option<Duration>,
    /// The named workload each VU runs.
    pub workload: String,
    /// Tags added to every metric recorded by this scenario.
    pub tags: TagSet,
}

impl Scenario {
    /// When the scenario stops starting iterations, counted from the start of the run.
    pub fn planned_end(&self) -> Duration {
        self.start_time + self.executor.duration()
    }
}
