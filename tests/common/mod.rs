//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::path::{Path, PathBuf};

use illuminator::config::ScenarioConfig;

/// Start of every inline scenario.
pub const START: &str = "2012-01-01 00:00:00";

/// Path of a scenario shipped in `scenarios/`.
pub fn scenario_path(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("scenarios")
        .join(name)
}

/// Scenario header spanning `START` to `end_time`, followed by `body`.
pub fn scenario_yaml(end_time: &str, body: &str) -> String {
    format!("scenario:\n  start_time: '{START}'\n  end_time: '{end_time}'\n{body}")
}

/// Parses an inline scenario that is expected to be valid.
pub fn parse(yaml: &str) -> ScenarioConfig {
    ScenarioConfig::from_yaml_str(yaml).expect("scenario should parse")
}

/// Two chained adders monitored at the end of the chain.
pub fn adder_chain(end_time: &str) -> String {
    scenario_yaml(
        end_time,
        "models:
  - {name: A, type: Adder}
  - name: B
    type: Adder
    parameters: {in2: 1}
connections:
  - {from: A.out1, to: B.in1}
monitor:
  items: [A.out1, B.out1]
",
    )
}

/// Writes `contents` to `name` inside `dir` and returns the path.
pub fn write_file(dir: &Path, name: &str, contents: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, contents).expect("fixture file should be written");
    path
}

/// Reads a results CSV into its header and data rows.
pub fn read_results(path: &Path) -> (Vec<String>, Vec<Vec<String>>) {
    let mut rdr = csv::Reader::from_path(path).expect("results file should exist");
    let header = rdr
        .headers()
        .expect("results file should have a header")
        .iter()
        .map(str::to_string)
        .collect();
    let rows = rdr
        .records()
        .map(|r| {
            r.expect("row should parse")
                .iter()
                .map(str::to_string)
                .collect()
        })
        .collect();
    (header, rows)
}
