use itertools::Itertools;
use serde::{Deserialize, Serialize};
use sha3::Digest;
use std::collections::{BTreeMap, HashMap};
use std::io::Write;
use std::path::PathBuf;

/// Summary of a run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunSummary {
    /// The unique run id
    ///
    /// Chosen by the runner. Unique for each run.
    pub run_id: String,
    /// The name of the scenario suite that was run
    pub suite_name: String,
    /// The time the run started
    ///
    /// This is a Unix timestamp in seconds.
    pub started_at: i64,
    /// How long the run actually took, in milliseconds
    pub run_duration_ms: u64,
    /// One entry per configured scenario, in configuration order
    pub scenarios: Vec<ScenarioSummary>,
    /// The outcome of every configured threshold
    pub thresholds: Vec<ThresholdSummary>,
    /// Headline statistics per metric, keyed by metric name then statistic label
    pub metrics: BTreeMap<String, BTreeMap<String, f64>>,
    /// True if every threshold passed and the run was not aborted
    pub passed: bool,
    /// True if an `abort_on_fail` threshold stopped the run early
    pub aborted: bool,
    /// The exit code the runner reported for this run
    pub exit_code: i32,
    /// Environment variables set for the run
    ///
    /// This won't capture all environment variables. Just the ones that the runner is aware of or
    /// that are included by the scenario itself.
    pub env: HashMap<String, String>,
    /// The version of Gale that was used for this run
    pub gale_version: String,
    /// See [RunSummary::fingerprint]
    ///
    /// Runs with the same fingerprint are comparable with each other.
    #[serde(default)]
    pub config_fingerprint: String,
}

/// What a single scenario was configured to do and what it actually did
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScenarioSummary {
    pub name: String,
    /// The executor kind, `constant-vus` or `ramping-vus`
    pub executor: String,
    /// Planned lifetime excluding graceful stop, in seconds
    pub planned_duration_s: f64,
    /// The highest number of VUs running at the same time
    pub max_active_vus: usize,
    /// How many VUs were started over the scenario's lifetime
    pub vus_started: usize,
    /// Completed iterations across all VUs
    pub iterations: u64,
    /// True if graceful stop ran out and in-flight iterations were cancelled
    pub forced_stop: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ThresholdSummary {
    pub selector: String,
    pub expression: String,
    pub value: Option<f64>,
    pub passed: bool,
}

impl RunSummary {
    /// Create a new run summary
    pub fn new(
        run_id: String,
        suite_name: String,
        started_at: i64,
        scenarios: Vec<ScenarioSummary>,
        gale_version: String,
    ) -> Self {
        Self {
            run_id,
            suite_name,
            started_at,
            run_duration_ms: 0,
            scenarios,
            thresholds: Vec::new(),
            metrics: BTreeMap::new(),
            passed: false,
            aborted: false,
            exit_code: 0,
            env: HashMap::with_capacity(0),
            gale_version,
            config_fingerprint: String::new(),
        }
    }

    /// Add an environment variable
    pub fn add_env(&mut self, key: String, value: String) {
        self.env.insert(key, value);
    }

    /// Compute a fingerprint for this run summary
    ///
    /// The fingerprint is intended to uniquely identify the configuration used to run the suite.
    /// It uses the
    ///     - Suite name
    ///     - Scenario names, executors and planned durations
    ///     - Threshold selectors and expressions
    ///     - Selected environment variables
    ///     - Gale version
    ///
    /// The fingerprint is computed using [sha3::Sha3_256].
    pub fn fingerprint(&self) -> String {
        let mut hasher = sha3::Sha3_256::new();
        Digest::update(&mut hasher, self.suite_name.as_bytes());
        self.scenarios
            .iter()
            .sorted_by_key(|s| s.name.to_owned())
            .for_each(|s| {
                Digest::update(&mut hasher, s.name.as_bytes());
                Digest::update(&mut hasher, s.executor.as_bytes());
                Digest::update(&mut hasher, s.planned_duration_s.to_le_bytes());
            });
        self.thresholds
            .iter()
            .sorted_by_key(|t| (t.selector.to_owned(), t.expression.to_owned()))
            .for_each(|t| {
                Digest::update(&mut hasher, t.selector.as_bytes());
                Digest::update(&mut hasher, t.expression.as_bytes());
            });
        self.env
            .iter()
            .sorted_by_key(|(k, _)| k.to_owned())
            .for_each(|(k, v)| {
                Digest::update(&mut hasher, k.as_bytes());
                Digest::update(&mut hasher, v.as_bytes());
            });
        Digest::update(&mut hasher, self.gale_version.as_bytes());

        format!("{:x}", hasher.finalize())
    }
}

/// Append the run summary to a file
///
/// The summary will be serialized to JSON and output as a single line followed by a newline. The
/// recommended file extension is `.jsonl`.
pub fn append_run_summary(run_summary: RunSummary, path: PathBuf) -> anyhow::Result<()> {
    let mut file = std::fs::OpenOptions::new()
        .append(true)
        .create(true)
        .open(path)?;
    store_run_summary(run_summary, &mut file)?;
    file.write_all("\n".as_bytes())?;
    Ok(())
}

/// Serialize the run summary to a writer
pub fn store_run_summary<W: Write>(run_summary: RunSummary, writer: &mut W) -> anyhow::Result<()> {
    serde_json::to_writer(writer, &run_summary)?;
    Ok(())
}
