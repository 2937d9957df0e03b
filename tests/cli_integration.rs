//! Runs the `illuminator` binary.

mod common;

use std::process::{Command, Output};

fn illuminator(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_illuminator"))
        .args(args)
        .current_dir(env!("CARGO_MANIFEST_DIR"))
        .env("RUST_LOG", "warn")
        .output()
        .expect("failed to run illuminator binary")
}

#[test]
fn plan_flag_prints_json_without_running() {
    let dir = tempfile::tempdir().expect("temp dir");
    let results = dir.path().join("never.csv");
    let results = results.to_string_lossy();
    let out = illuminator(&["scenarios/adder.yaml", "--plan", "--results", &results]);
    assert!(out.status.success(), "stderr: {}", String::from_utf8_lossy(&out.stderr));

    let plan: serde_json::Value =
        serde_json::from_slice(&out.stdout).expect("stdout should be JSON");
    assert_eq!(plan["step_count"], 4);
    assert_eq!(plan["launch_plan"]["collector"], "illuminator.models:Collector");
    assert_eq!(plan["launch_plan"]["models"].as_array().map(Vec::len), Some(2));
    assert!(plan.get("entity_table").is_none());
    assert!(!dir.path().join("never.csv").exists());
}

#[test]
fn run_writes_results_and_prints_summary() {
    let dir = tempfile::tempdir().expect("temp dir");
    let results = dir.path().join("adder.csv");
    let out = illuminator(&[
        "scenarios/adder.yaml",
        "--results",
        &results.to_string_lossy(),
    ]);
    assert!(out.status.success(), "stderr: {}", String::from_utf8_lossy(&out.stderr));

    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("Run Summary (adder-chain)"), "stdout: {stdout}");
    assert!(stdout.contains("Steps: 4 x 900 s"));

    let (header, rows) = common::read_results(&results);
    assert_eq!(header, vec!["date", "Adder1.out1", "Adder2.out1"]);
    assert_eq!(rows.len(), 4);
    assert_eq!(rows[0][1..], ["30", "35"]);
}

#[test]
fn hydrogen_scenario_runs_from_shipped_data() {
    let dir = tempfile::tempdir().expect("temp dir");
    let results = dir.path().join("h2.csv");
    let out = illuminator(&[
        "scenarios/hydrogen.yaml",
        "--results",
        &results.to_string_lossy(),
    ]);
    assert!(out.status.success(), "stderr: {}", String::from_utf8_lossy(&out.stderr));

    let (header, rows) = common::read_results(&results);
    assert_eq!(
        header,
        vec!["date", "Electrolyser1.e_consume", "Electrolyser1.h2_gen", "PV.p_kw"]
    );
    assert_eq!(rows.len(), 4);
    let h2: f64 = rows[0][2].parse().expect("numeric");
    assert!(h2 > 0.0);
}

#[test]
fn missing_scenario_exits_nonzero() {
    let out = illuminator(&["scenarios/does_not_exist.yaml"]);
    assert_eq!(out.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("error: cannot read"), "stderr: {stderr}");
}

#[test]
fn invalid_scenario_reports_field_path() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = common::write_file(
        dir.path(),
        "bad.yaml",
        "scenario:\n  start_time: '2012-01-01 00:00:00'\n  end_time: '2012-01-01 01:00:00'\nmodels:\n  - {name: A}\n",
    );
    let out = illuminator(&[&path.to_string_lossy()]);
    assert_eq!(out.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("models[0].type"), "stderr: {stderr}");
}

#[test]
fn unknown_collector_reference_is_rejected() {
    let out = illuminator(&["scenarios/adder.yaml", "--plan", "--collector", "ext:Sink"]);
    assert_eq!(out.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("unknown model type `ext:Sink`"), "stderr: {stderr}");
}
