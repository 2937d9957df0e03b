//! Drives an [`ExecutionPlan`] through an [`EngineAdapter`].

use tracing::info;

use crate::config::{COLLECTOR_NAME, Params};
use crate::error::{Error, Result};
use crate::plan::{EntityHandle, ExecutionPlan};
use crate::reporting::RunSummary;
use crate::sim::world::EngineAdapter;

/// Parameter through which the collector learns the results destination.
const OUTPUT_FILE_PARAM: &str = "output_file";

/// Starts every simulator of `plan`, wires them up, and runs to `step_count`.
///
/// The collector and its monitor entity come first, then one simulator with
/// one entity per declared model, in scenario order. `plan.entity_table` is
/// filled in as entities are created.
///
/// # Errors
///
/// Propagates any engine or adapter error; the run is aborted at the first one.
pub fn execute(plan: &mut ExecutionPlan, engine: &mut impl EngineAdapter) -> Result<RunSummary> {
    let collector_meta = engine.start(COLLECTOR_NAME, &plan.launch_plan.collector)?;
    let (monitor_type, monitor_meta) = collector_meta
        .models
        .iter()
        .find(|(_, m)| m.public)
        .ok_or_else(|| {
            Error::Engine(format!(
                "collector `{}` exposes no public model",
                plan.launch_plan.collector
            ))
        })?;
    let mut monitor_params = Params::new();
    if monitor_meta.params.contains(&OUTPUT_FILE_PARAM) {
        monitor_params.insert(OUTPUT_FILE_PARAM.to_string(), plan.results.clone().into());
    }
    let monitors = engine.create(COLLECTOR_NAME, monitor_type, 1, &monitor_params)?;
    plan.entity_table.insert(COLLECTOR_NAME.to_string(), monitors);

    for model in &plan.launch_plan.models {
        engine.start(&model.name, &model.reference)?;
        let handles = engine.create(&model.name, &model.model_type, 1, &model.parameters)?;
        plan.entity_table.insert(model.name.clone(), handles);
    }

    for link in &plan.connection_plan {
        let src = first_entity(plan, &link.source.model)?;
        let dest = first_entity(plan, &link.dest.model)?;
        engine.connect(
            src,
            dest,
            &[(link.source.attr.clone(), link.dest.attr.clone())],
        )?;
    }

    let monitor = first_entity(plan, COLLECTOR_NAME)?;
    for item in &plan.monitor_plan {
        let src = first_entity(plan, &item.source.model)?;
        engine.connect(
            src,
            monitor,
            &[(item.source.attr.clone(), item.dest_attr().to_string())],
        )?;
    }

    info!(
        connections = plan.connection_plan.len(),
        monitored = plan.monitor_plan.len(),
        until = plan.step_count,
        "simulators wired"
    );
    engine.run(plan.step_count)
}

fn first_entity<'p>(plan: &'p ExecutionPlan, model: &str) -> Result<&'p EntityHandle> {
    plan.entity_table
        .get(model)
        .and_then(|handles| handles.first())
        .ok_or_else(|| Error::UnknownModelReference {
            model: model.to_string(),
            field: "entity_table".to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScenarioConfig;
    use crate::models::types::Meta;
    use crate::models::{adder, collector};

    /// Records the calls the runner makes.
    #[derive(Default)]
    struct Recorder {
        calls: Vec<String>,
    }

    impl EngineAdapter for Recorder {
        fn start(&mut self, sim_id: &str, reference: &str) -> Result<Meta> {
            self.calls.push(format!("start {sim_id} {reference}"));
            Ok(if sim_id == COLLECTOR_NAME {
                collector::META
            } else {
                adder::META
            })
        }

        fn create(
            &mut self,
            sim_id: &str,
            model_type: &str,
            count: usize,
            params: &Params,
        ) -> Result<Vec<EntityHandle>> {
            self.calls
                .push(format!("create {sim_id} {model_type} {count} {}", params.len()));
            Ok(vec![EntityHandle {
                sim_id: sim_id.to_string(),
                eid: "e0".to_string(),
                model_type: model_type.to_string(),
            }])
        }

        fn connect(
            &mut self,
            src: &EntityHandle,
            dest: &EntityHandle,
            attrs: &[(String, String)],
        ) -> Result<()> {
            let (a, b) = &attrs[0];
            self.calls
                .push(format!("connect {}.{a} {}.{b}", src.full_id(), dest.full_id()));
            Ok(())
        }

        fn run(&mut self, until: u64) -> Result<RunSummary> {
            self.calls.push(format!("run {until}"));
            Ok(RunSummary {
                until,
                ..RunSummary::default()
            })
        }
    }

    #[test]
    fn replays_launch_connect_and_run_in_order() {
        let yaml = r#"
scenario:
  start_time: '2012-01-01 00:00:00'
  end_time: '2012-01-01 01:00:00'
models:
  - {name: A, type: Adder}
  - {name: B, type: Adder}
connections:
  - {from: A.out1, to: B.in1}
monitor:
  items: [B.out1]
"#;
        let config = ScenarioConfig::from_yaml_str(yaml).expect("parses");
        let mut plan = crate::plan::compile(&config).expect("compiles");
        let mut engine = Recorder::default();
        let summary = execute(&mut plan, &mut engine).expect("runs");

        assert_eq!(summary.until, 4);
        assert_eq!(
            engine.calls,
            vec![
                "start Collector illuminator.models:Collector",
                "create Collector Monitor 1 1",
                "start A illuminator.models:Adder",
                "create A Adder 1 0",
                "start B illuminator.models:Adder",
                "create B Adder 1 0",
                "connect A.e0.out1 B.e0.in1",
                "connect B.e0.out1 Collector.e0.out1",
                "run 4",
            ]
        );
        assert_eq!(plan.entity_table.len(), 3);
    }
}
