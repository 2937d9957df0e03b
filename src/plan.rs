//! Compilation of a scenario into an execution plan.
//!
//! The compiler is pure: it reads a [`ScenarioConfig`], consults the model
//! [`Registry`] for capability descriptors, and either returns a complete
//! [`ExecutionPlan`] or the first configuration error it finds.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::Serialize;
use tracing::{debug, info};

use crate::config::{self, COLLECTOR_NAME, Params, ScenarioConfig};
use crate::error::{Error, Result};
use crate::models::registry::{COLLECTOR_TYPE, Registry};
use crate::sim::clock::{SimClock, format_timestamp, parse_timestamp, step_count};

/// A `<model>.<attribute>` reference.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct AttrRef {
    pub model: String,
    pub attr: String,
}

impl AttrRef {
    /// Splits `value` into model and attribute.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedConnection`] unless `value` has exactly two
    /// non-empty dot-separated tokens.
    ///
    /// # Examples
    ///
    /// ```
    /// use illuminator::plan::AttrRef;
    ///
    /// let r = AttrRef::parse("PV.p_kw", "monitor.items[0]").unwrap();
    /// assert_eq!((r.model.as_str(), r.attr.as_str()), ("PV", "p_kw"));
    /// assert!(AttrRef::parse("PV.p.kw", "monitor.items[0]").is_err());
    /// ```
    pub fn parse(value: &str, field: &str) -> Result<Self> {
        let malformed = || Error::MalformedConnection {
            value: value.to_string(),
            field: field.to_string(),
        };
        let mut tokens = value.split('.');
        let (Some(model), Some(attr), None) = (tokens.next(), tokens.next(), tokens.next()) else {
            return Err(malformed());
        };
        let (model, attr) = (model.trim(), attr.trim());
        if model.is_empty() || attr.is_empty() {
            return Err(malformed());
        }
        Ok(Self {
            model: model.to_string(),
            attr: attr.to_string(),
        })
    }
}

impl fmt::Display for AttrRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.model, self.attr)
    }
}

/// A data link from one model attribute to another.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Link {
    pub source: AttrRef,
    pub dest: AttrRef,
}

/// An attribute observed by the collector.
///
/// The collector-side attribute always carries the source attribute's name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonitorLink {
    pub source: AttrRef,
    dest_attr: String,
}

impl MonitorLink {
    pub fn new(source: AttrRef) -> Self {
        let dest_attr = source.attr.clone();
        Self { source, dest_attr }
    }

    /// Attribute name on the collector side.
    pub fn dest_attr(&self) -> &str {
        &self.dest_attr
    }
}

/// How to start one declared model.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelLaunch {
    pub name: String,
    /// Implementation reference, `<namespace>:<type>`.
    pub reference: String,
    pub model_type: String,
    pub parameters: Params,
}

/// Every simulator the run needs, collector first.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LaunchPlan {
    /// Implementation reference of the results collector.
    pub collector: String,
    /// Declared models in scenario order.
    pub models: Vec<ModelLaunch>,
}

impl LaunchPlan {
    /// `(name, reference)` pairs, starting with the collector.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &str)> {
        std::iter::once((COLLECTOR_NAME, self.collector.as_str())).chain(
            self.models
                .iter()
                .map(|m| (m.name.as_str(), m.reference.as_str())),
        )
    }
}

/// An entity created by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntityHandle {
    /// Simulator that owns the entity.
    pub sim_id: String,
    pub eid: String,
    pub model_type: String,
}

impl EntityHandle {
    /// Globally unique id, `<sim_id>.<eid>`.
    pub fn full_id(&self) -> String {
        format!("{}.{}", self.sim_id, self.eid)
    }
}

/// Everything needed to run a scenario.
///
/// `entity_table` is empty after compilation and is filled in while the
/// engine creates entities. It is ignored by equality and serialization.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionPlan {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scenario_name: Option<String>,
    pub launch_plan: LaunchPlan,
    #[serde(skip)]
    pub entity_table: BTreeMap<String, Vec<EntityHandle>>,
    pub connection_plan: Vec<Link>,
    pub monitor_plan: Vec<MonitorLink>,
    pub start_time: String,
    pub end_time: String,
    pub time_resolution: u64,
    pub step_count: u64,
    /// Destination of the collected results.
    pub results: String,
    #[serde(skip)]
    clock: SimClock,
}

impl PartialEq for ExecutionPlan {
    fn eq(&self, other: &Self) -> bool {
        self.scenario_name == other.scenario_name
            && self.launch_plan == other.launch_plan
            && self.connection_plan == other.connection_plan
            && self.monitor_plan == other.monitor_plan
            && self.start_time == other.start_time
            && self.end_time == other.end_time
            && self.time_resolution == other.time_resolution
            && self.step_count == other.step_count
            && self.results == other.results
    }
}

impl ExecutionPlan {
    /// Step-to-timestamp mapping of this run.
    pub fn clock(&self) -> SimClock {
        self.clock
    }

    /// Timestamp at which the run stops.
    pub fn simulated_end(&self) -> String {
        self.clock.label(self.step_count)
    }
}

/// Turns scenarios into execution plans.
#[derive(Debug, Clone)]
pub struct Compiler<'r> {
    registry: &'r Registry,
    collector: Option<String>,
}

impl<'r> Compiler<'r> {
    pub fn new(registry: &'r Registry) -> Self {
        Self {
            registry,
            collector: None,
        }
    }

    /// Uses `reference` instead of the built-in collector.
    pub fn with_collector(mut self, reference: impl Into<String>) -> Self {
        self.collector = Some(reference.into());
        self
    }

    /// Compiles `config` into an [`ExecutionPlan`].
    ///
    /// Defaults are applied first, so passing an already defaulted config
    /// gives the same result.
    ///
    /// # Errors
    ///
    /// * [`Error::UnknownModelType`] - a type tag or the collector reference is not registered
    /// * [`Error::UnsupportedModelParameters`] - a required parameter is missing or an unknown one is given
    /// * [`Error::UnknownAttribute`] - declared inputs/outputs the model does not expose
    /// * [`Error::MalformedConnection`] - a reference is not `<model>.<attribute>`
    /// * [`Error::UnknownModelReference`] - a reference names an undeclared model
    /// * [`Error::SchemaValidation`] - a timestamp is malformed
    /// * [`Error::InvalidTimeRange`] - `end_time` is not after `start_time`, or the resolution is 0
    pub fn compile(&self, config: &ScenarioConfig) -> Result<ExecutionPlan> {
        let config = config::apply_defaults(config);
        let scenario = &config.scenario;

        let launch_plan = self.launch_plan(&config)?;
        let declared: BTreeSet<&str> = launch_plan.models.iter().map(|m| m.name.as_str()).collect();

        let mut connection_plan = Vec::with_capacity(config.connections.len());
        for (i, conn) in config.connections.iter().enumerate() {
            let source = model_ref(&conn.from, &format!("connections[{i}].from"), &declared)?;
            let dest = model_ref(&conn.to, &format!("connections[{i}].to"), &declared)?;
            connection_plan.push(Link { source, dest });
        }

        let mut monitor_plan = Vec::with_capacity(config.monitor.items.len());
        for (i, item) in config.monitor.items.iter().enumerate() {
            let source = model_ref(item, &format!("monitor.items[{i}]"), &declared)?;
            monitor_plan.push(MonitorLink::new(source));
        }

        let start = parse_timestamp("scenario.start_time", &scenario.start_time)?;
        let end = parse_timestamp("scenario.end_time", &scenario.end_time)?;
        let time_resolution = scenario
            .time_resolution
            .unwrap_or(config::DEFAULT_TIME_RESOLUTION);
        let steps = step_count(start, end, time_resolution)?;

        let plan = ExecutionPlan {
            scenario_name: scenario.name.clone(),
            launch_plan,
            entity_table: BTreeMap::new(),
            connection_plan,
            monitor_plan,
            start_time: format_timestamp(start),
            end_time: format_timestamp(end),
            time_resolution,
            step_count: steps,
            results: scenario
                .results
                .clone()
                .unwrap_or_else(|| config::DEFAULT_RESULTS.to_string()),
            clock: SimClock::new(start, time_resolution),
        };
        info!(
            models = plan.launch_plan.models.len(),
            connections = plan.connection_plan.len(),
            monitored = plan.monitor_plan.len(),
            steps = plan.step_count,
            "compiled execution plan"
        );
        Ok(plan)
    }

    fn launch_plan(&self, config: &ScenarioConfig) -> Result<LaunchPlan> {
        let collector = match &self.collector {
            Some(reference) => {
                self.registry.resolve(reference)?;
                reference.clone()
            }
            None => self.registry.reference_for(COLLECTOR_TYPE)?,
        };

        let mut models = Vec::with_capacity(config.models.len());
        for spec in &config.models {
            let reference = self.registry.reference_for(&spec.model_type)?;
            let entry = self.registry.resolve(&reference)?;
            let meta = entry
                .meta
                .public_model(&spec.model_type)
                .map_err(|_| Error::UnknownModelType {
                    name: spec.model_type.clone(),
                    available: self.registry.references().collect::<Vec<_>>().join(", "),
                })?;

            let unsupported = |reason: String| Error::UnsupportedModelParameters {
                model: spec.name.clone(),
                model_type: spec.model_type.clone(),
                reason,
            };
            if let Some(missing) = meta.required.iter().find(|p| !spec.parameters.contains_key(**p)) {
                return Err(unsupported(format!("missing required parameter `{missing}`")));
            }
            if let Some(extra) = spec.parameters.keys().find(|k| !meta.params.contains(&k.as_str())) {
                return Err(unsupported(format!(
                    "unsupported parameter `{extra}` (accepted: {})",
                    meta.params.join(", ")
                )));
            }

            let declared_inputs = spec.inputs.iter().flat_map(|m| m.keys()).map(|a| (a, true));
            let declared_outputs = spec.outputs.iter().flat_map(|m| m.keys()).map(|a| (a, false));
            for (attr, is_input) in declared_inputs.chain(declared_outputs) {
                let exposed = if is_input {
                    meta.has_input(attr)
                } else {
                    meta.has_output(attr)
                };
                if !exposed {
                    return Err(Error::UnknownAttribute {
                        model: spec.name.clone(),
                        attr: attr.clone(),
                    });
                }
            }

            debug!(model = %spec.name, %reference, "resolved model");
            models.push(ModelLaunch {
                name: spec.name.clone(),
                reference,
                model_type: spec.model_type.clone(),
                parameters: spec.parameters.clone(),
            });
        }
        Ok(LaunchPlan { collector, models })
    }
}

/// Compiles `config` against the built-in models.
///
/// # Errors
///
/// See [`Compiler::compile`].
pub fn compile(config: &ScenarioConfig) -> Result<ExecutionPlan> {
    let registry = Registry::with_builtin_models();
    Compiler::new(&registry).compile(config)
}

fn model_ref(value: &str, field: &str, declared: &BTreeSet<&str>) -> Result<AttrRef> {
    let r = AttrRef::parse(value, field)?;
    if !declared.contains(r.model.as_str()) {
        return Err(Error::UnknownModelReference {
            model: r.model,
            field: field.to_string(),
        });
    }
    Ok(r)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScenarioConfig;

    fn scenario(body: &str) -> ScenarioConfig {
        let yaml = format!(
            "scenario:\n  start_time: '2012-01-01 00:00:00'\n  end_time: '2012-01-01 01:00:00'\n{body}"
        );
        ScenarioConfig::from_yaml_str(&yaml).expect("scenario parses")
    }

    const ADDERS: &str = "models:\n  - {name: A, type: Adder}\n  - {name: B, type: Adder}\n";

    #[test]
    fn launch_plan_uses_namespaced_references() {
        let plan = compile(&scenario(ADDERS)).expect("compiles");
        let entries: Vec<_> = plan.launch_plan.entries().collect();
        assert_eq!(
            entries,
            vec![
                ("Collector", "illuminator.models:Collector"),
                ("A", "illuminator.models:Adder"),
                ("B", "illuminator.models:Adder"),
            ]
        );
    }

    #[test]
    fn collector_override_replaces_builtin() {
        let registry = Registry::with_builtin_models();
        let plan = Compiler::new(&registry)
            .with_collector("illuminator.models:Adder")
            .compile(&scenario(ADDERS))
            .expect("compiles");
        assert_eq!(plan.launch_plan.collector, "illuminator.models:Adder");

        let err = Compiler::new(&registry)
            .with_collector("external:Monitor")
            .compile(&scenario(ADDERS));
        assert!(matches!(err, Err(Error::UnknownModelType { .. })));
    }

    #[test]
    fn unknown_type_is_rejected() {
        let err = compile(&scenario("models:\n  - {name: T, type: Turbine}\n"));
        assert!(matches!(err, Err(Error::UnknownModelType { .. })));
    }

    #[test]
    fn undeclared_parameter_is_rejected() {
        let err = compile(&scenario(
            "models:\n  - name: A\n    type: Adder\n    parameters: {in3: 1}\n",
        ));
        assert!(matches!(err, Err(Error::UnsupportedModelParameters { .. })));
    }

    #[test]
    fn declared_attribute_must_exist() {
        let err = compile(&scenario(
            "models:\n  - name: A\n    type: Adder\n    outputs: {out2: null}\n",
        ));
        assert!(matches!(err, Err(Error::UnknownAttribute { ref attr, .. }) if attr == "out2"));
    }

    #[test]
    fn declared_input_must_be_an_input() {
        let err = compile(&scenario(
            "models:\n  - name: A\n    type: Adder\n    inputs: {out1: 0}\n",
        ));
        assert!(matches!(err, Err(Error::UnknownAttribute { ref attr, .. }) if attr == "out1"));
    }

    #[test]
    fn malformed_connection_names_field() {
        let body = format!("{ADDERS}connections:\n  - {{from: A.out1, to: B}}\n");
        let err = compile(&scenario(&body));
        assert!(
            matches!(err, Err(Error::MalformedConnection { ref field, .. }) if field == "connections[0].to")
        );
    }

    #[test]
    fn monitor_edges_keep_attribute_names() {
        let body = format!("{ADDERS}monitor:\n  items: [A.out1, B.in2]\n");
        let plan = compile(&scenario(&body)).expect("compiles");
        assert_eq!(plan.monitor_plan[0].dest_attr(), "out1");
        assert_eq!(plan.monitor_plan[1].dest_attr(), "in2");
    }

    #[test]
    fn unknown_monitor_model_is_rejected() {
        let body = format!("{ADDERS}monitor:\n  items: [C.out1]\n");
        let err = compile(&scenario(&body));
        assert!(
            matches!(err, Err(Error::UnknownModelReference { ref model, .. }) if model == "C")
        );
    }

    #[test]
    fn plan_serializes_without_entity_table() {
        let mut plan = compile(&scenario(ADDERS)).expect("compiles");
        plan.entity_table.insert("A".into(), Vec::new());
        let json = serde_json::to_value(&plan).expect("serializes");
        assert!(json.get("entity_table").is_none());
        assert_eq!(json["step_count"], 4);
        assert_eq!(json["results"], "./out.csv");
    }

    #[test]
    fn simulated_end_is_start_plus_steps() {
        let plan = compile(&scenario(ADDERS)).expect("compiles");
        assert_eq!(plan.simulated_end(), "2012-01-01 01:00:00");
    }
}
