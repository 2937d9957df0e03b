//! Command-line arguments.

use std::path::PathBuf;

use clap::Parser;

/// Scenario file used when none is given.
pub const DEFAULT_SCENARIO: &str = "scenario.yaml";

/// Compile an energy-system scenario and run it as a co-simulation.
#[derive(Parser, Debug, Clone, PartialEq, Eq)]
#[command(name = "illuminator")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to the scenario file (YAML, or TOML with a `.toml` extension)
    #[arg(default_value = DEFAULT_SCENARIO)]
    pub file_path: PathBuf,

    /// Print the compiled execution plan as JSON instead of running it
    #[arg(long)]
    pub plan: bool,

    /// Implementation reference of the results collector
    #[arg(long, value_name = "REFERENCE")]
    pub collector: Option<String>,

    /// Write results here instead of the scenario's `results` destination
    #[arg(long, value_name = "PATH")]
    pub results: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_scenario_yaml() {
        let cli = Cli::try_parse_from(["illuminator"]).expect("no args is valid");
        assert_eq!(cli.file_path, PathBuf::from(DEFAULT_SCENARIO));
        assert!(!cli.plan);
        assert_eq!(cli.collector, None);
    }

    #[test]
    fn parses_all_options() {
        let cli = Cli::try_parse_from([
            "illuminator",
            "grid.yaml",
            "--plan",
            "--collector",
            "illuminator.models:Collector",
            "--results",
            "out/run.csv",
        ])
        .expect("valid args");
        assert_eq!(cli.file_path, PathBuf::from("grid.yaml"));
        assert!(cli.plan);
        assert_eq!(cli.collector.as_deref(), Some("illuminator.models:Collector"));
        assert_eq!(cli.results.as_deref(), Some("out/run.csv"));
    }

    #[test]
    fn rejects_unknown_flag() {
        assert!(Cli::try_parse_from(["illuminator", "--seed", "4"]).is_err());
    }
}
