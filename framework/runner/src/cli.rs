use std::path::PathBuf;

use clap::{Parser, ValueEnum};

#[derive(Parser, Debug, Clone)]
#[command(about, long_about = None)]
pub struct GaleScenarioCli {
    /// Base URL of the service to test, for example `http://localhost:8080`.
    ///
    /// Overrides `target_url` from the scenario configuration.
    #[clap(short, long)]
    pub target_url: Option<String>,

    /// Path to a TOML file that replaces the scenario's built-in configuration.
    #[clap(short, long)]
    pub config: Option<PathBuf>,

    /// Seed for the random number generator given to each virtual user.
    ///
    /// Runs with the same seed and configuration make the same random choices. If no seed is
    /// given here or in the configuration then one is picked at random and logged.
    #[clap(long)]
    pub seed: Option<u64>,

    /// Do not show a progress bar on the CLI.
    ///
    /// This is recommended for CI/CD environments where the progress bar isn't being looked at by anyone and is just adding noise to the logs.
    #[clap(long, default_value = "false")]
    pub no_progress: bool,

    /// How to report the results of the run
    #[clap(long, value_enum, default_value_t = ReporterOpt::Summary)]
    pub reporter: ReporterOpt,

    /// Identifier for this run, included in the run summary.
    ///
    /// A random id is generated if none is given.
    #[clap(long)]
    pub run_id: Option<String>,

    /// Append a JSON summary of the run to this file, one line per run.
    #[clap(long)]
    pub summary_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum ReporterOpt {
    /// Print summary tables of metrics and thresholds to stdout
    #[default]
    Summary,
    /// Do not report anything, only the exit code tells the outcome
    Noop,
}

impl Default for GaleScenarioCli {
    fn default() -> Self {
        Self {
            target_url: None,
            config: None,
            seed: None,
            no_progress: false,
            reporter: ReporterOpt::Summary,
            run_id: None,
            summary_file: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_flags() {
        let cli = GaleScenarioCli::parse_from([
            "csv_import_load",
            "--target-url",
            "http://localhost:8080",
            "--seed",
            "42",
            "--no-progress",
            "--reporter",
            "noop",
        ]);

        assert_eq!(Some("http://localhost:8080"), cli.target_url.as_deref());
        assert_eq!(Some(42), cli.seed);
        assert!(cli.no_progress);
        assert_eq!(ReporterOpt::Noop, cli.reporter);
        assert_eq!(None, cli.summary_file);
    }

    #[test]
    fn defaults_to_summary_reporter() {
        let cli = GaleScenarioCli::parse_from(["stress_read_apis"]);
        assert_eq!(ReporterOpt::Summary, cli.reporter);
        assert!(!cli.no_progress);
    }
}
