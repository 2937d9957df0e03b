use crate::plan::ExecutionPlan;

/// Outcome of a completed run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Step count the run was asked to reach.
    pub until: u64,
    /// Simulators that took part, collector included.
    pub simulators: usize,
    /// Total `step` calls across all simulators.
    pub sim_steps: u64,
    /// Last simulation time at which anything was stepped.
    pub last_time: Option<u64>,
}

/// Renders the summary printed after a run.
pub fn format_run_summary(summary: &RunSummary, plan: &ExecutionPlan) -> String {
    let name = plan.scenario_name.as_deref().unwrap_or("scenario");
    format!(
        "\n--- Run Summary ({name}) ---\n\
         Steps: {} x {} s\n\
         Simulated: {} .. {}\n\
         Simulators: {} ({} step calls)\n\
         Results: {}",
        summary.until,
        plan.time_resolution,
        plan.start_time,
        plan.simulated_end(),
        summary.simulators,
        summary.sim_steps,
        plan.results,
    )
}

pub fn print_run_summary(summary: &RunSummary, plan: &ExecutionPlan) {
    println!("{}", format_run_summary(summary, plan));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScenarioConfig;

    #[test]
    fn summary_names_results_destination() {
        let yaml = "scenario:\n  name: demo\n  start_time: '2012-01-01 00:00:00'\n  end_time: '2012-01-01 01:00:00'\n  results: out/run.csv\nmodels:\n  - {name: A, type: Adder}\n";
        let config = ScenarioConfig::from_yaml_str(yaml).expect("parses");
        let plan = crate::plan::compile(&config).expect("compiles");
        let summary = RunSummary {
            until: plan.step_count,
            simulators: 2,
            sim_steps: 4,
            last_time: Some(3),
        };
        let text = format_run_summary(&summary, &plan);
        assert!(text.contains("Run Summary (demo)"));
        assert!(text.contains("Steps: 4 x 900 s"));
        assert!(text.contains("2012-01-01 00:00:00 .. 2012-01-01 01:00:00"));
        assert!(text.contains("Results: out/run.csv"));
    }
}
