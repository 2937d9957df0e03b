//! Lifecycle contract shared by all model adapters.

use std::collections::BTreeMap;

use chrono::{NaiveDateTime, Timelike};
use rand::{Rng, rngs::StdRng};
use serde::Serialize;

use crate::config::Params;
use crate::error::AdapterError;

/// Entity identifier, unique within one simulator instance.
pub type EntityId = String;

/// Value carried by every attribute exchanged between simulators.
pub type AttrValue = f64;

/// Inputs for one step: destination entity -> attribute -> source full id -> value.
pub type Inputs = BTreeMap<EntityId, BTreeMap<String, BTreeMap<String, AttrValue>>>;

/// Attribute names requested per entity in [`Simulator::get_data`].
pub type OutputRequest = BTreeMap<EntityId, Vec<String>>;

/// Attribute values returned per entity from [`Simulator::get_data`].
pub type OutputData = BTreeMap<EntityId, BTreeMap<String, AttrValue>>;

/// How a simulator wants to be scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SimulatorKind {
    /// Self-schedules every step; inputs are the latest available values.
    TimeBased,
    /// Stepped only when new input arrives.
    EventBased,
    /// Self-schedules and is also stepped on new input.
    Hybrid,
}

/// Capability descriptor of one model type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelMeta {
    /// Whether entities of this type may be created from a scenario.
    pub public: bool,
    /// Every parameter `create` accepts.
    pub params: &'static [&'static str],
    /// Parameters that must be present.
    pub required: &'static [&'static str],
    /// Attributes that accept values from upstream.
    pub inputs: &'static [&'static str],
    /// Attributes served by `get_data`; may repeat an input the model echoes.
    pub outputs: &'static [&'static str],
    /// Any input name is accepted (collectors).
    pub any_inputs: bool,
    /// Output names are only known at runtime (data files).
    pub any_outputs: bool,
}

impl ModelMeta {
    /// Returns `true` if `attr` may be the destination of a link.
    pub fn has_input(&self, attr: &str) -> bool {
        self.any_inputs || self.inputs.contains(&attr)
    }

    /// Returns `true` if `attr` may be the source of a link.
    pub fn has_output(&self, attr: &str) -> bool {
        self.any_outputs || self.outputs.contains(&attr)
    }
}

/// Capability descriptor of a simulator: its scheduling kind and model types.
///
/// Returned by [`Simulator::init`] and fixed for the simulator's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Meta {
    pub kind: SimulatorKind,
    pub models: &'static [(&'static str, ModelMeta)],
}

impl Meta {
    /// Looks up a model type by name.
    pub fn model(&self, name: &str) -> Option<&ModelMeta> {
        self.models
            .iter()
            .find_map(|(n, m)| if *n == name { Some(m) } else { None })
    }

    /// Looks up a public model type, failing with [`AdapterError::UnknownModel`].
    pub fn public_model(&self, name: &str) -> Result<&ModelMeta, AdapterError> {
        self.model(name)
            .filter(|m| m.public)
            .ok_or_else(|| AdapterError::UnknownModel(name.to_string()))
    }
}

/// Entity created by [`Simulator::create`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntityDescriptor {
    pub eid: EntityId,
    #[serde(rename = "type")]
    pub model_type: String,
}

/// Trait implemented by every model adapter driven by the engine.
///
/// The engine calls `init` once, `create` one or more times, then `step`
/// repeatedly, interleaved with `get_data` queries, and finally `finalize`.
/// Each call runs to completion; adapters keep no references into `inputs`.
pub trait Simulator {
    /// Stores the step length in seconds and returns the capability descriptor.
    fn init(&mut self, sid: &str, time_resolution: u64) -> Result<Meta, AdapterError>;

    /// Instantiates `count` entities of `model_type`.
    ///
    /// # Arguments
    ///
    /// * `count` - Number of entities to create
    /// * `model_type` - A public model type from the descriptor
    /// * `start` - Timestamp of simulation step 0
    /// * `params` - Model parameters from the scenario
    fn create(
        &mut self,
        count: usize,
        model_type: &str,
        start: NaiveDateTime,
        params: &Params,
    ) -> Result<Vec<EntityDescriptor>, AdapterError>;

    /// Applies `inputs`, advances every entity, and caches its outputs.
    ///
    /// Returns the next step at which this simulator wants to run, or `None`
    /// to wait for new input.
    fn step(
        &mut self,
        time: u64,
        inputs: &Inputs,
        max_advance: u64,
    ) -> Result<Option<u64>, AdapterError>;

    /// Returns the most recently cached value of each requested attribute.
    fn get_data(&self, requested: &OutputRequest) -> Result<OutputData, AdapterError>;

    /// Called once after the last step.
    fn finalize(&mut self) -> Result<(), AdapterError> {
        Ok(())
    }
}

/// Reduces the values delivered to a single-valued input.
///
/// Returns `None` when nothing arrived and fails when more than one source
/// delivered a value.
pub fn single_value(
    eid: &str,
    attr: &str,
    values: &BTreeMap<String, AttrValue>,
) -> Result<Option<AttrValue>, AdapterError> {
    match values.len() {
        0 => Ok(None),
        1 => Ok(values.values().next().copied()),
        count => Err(AdapterError::MultipleInputValues {
            eid: eid.to_string(),
            attr: attr.to_string(),
            count,
        }),
    }
}

/// Reads cached outputs for the requested attributes.
///
/// An attribute that was never cached, including every attribute of an
/// entity that has not been stepped, yields [`AdapterError::NoData`].
pub fn read_cache(
    cache: &BTreeMap<EntityId, BTreeMap<String, AttrValue>>,
    requested: &OutputRequest,
) -> Result<OutputData, AdapterError> {
    let mut data = OutputData::new();
    for (eid, attrs) in requested {
        let cached = cache.get(eid);
        let entry = data.entry(eid.clone()).or_default();
        for attr in attrs {
            let value = cached.and_then(|c| c.get(attr)).ok_or_else(|| AdapterError::NoData {
                eid: eid.clone(),
                attr: attr.clone(),
            })?;
            entry.insert(attr.clone(), *value);
        }
    }
    Ok(data)
}

/// Numeric parameter with a fallback.
pub fn param_f64(params: &Params, name: &str, default: f64) -> Result<f64, AdapterError> {
    match params.get(name) {
        None => Ok(default),
        Some(v) => v.as_f64().ok_or_else(|| AdapterError::InvalidParameter {
            name: name.to_string(),
            message: "expected a number".to_string(),
        }),
    }
}

/// Non-negative integer parameter with a fallback.
pub fn param_u64(params: &Params, name: &str, default: u64) -> Result<u64, AdapterError> {
    match params.get(name) {
        None => Ok(default),
        Some(v) => v.as_u64().ok_or_else(|| AdapterError::InvalidParameter {
            name: name.to_string(),
            message: "expected a non-negative integer".to_string(),
        }),
    }
}

/// String parameter that must be present.
pub fn require_str<'a>(params: &'a Params, name: &str) -> Result<&'a str, AdapterError> {
    let value = params
        .get(name)
        .ok_or_else(|| AdapterError::MissingParameter(name.to_string()))?;
    value.as_str().ok_or_else(|| AdapterError::InvalidParameter {
        name: name.to_string(),
        message: "expected a string".to_string(),
    })
}

/// Hour of day in `[0, 24)` including the fractional part.
pub fn hour_of_day(ts: NaiveDateTime) -> f64 {
    ts.num_seconds_from_midnight() as f64 / 3600.0
}

/// Gaussian noise with mean 0 via the Box-Muller transform.
pub fn gaussian_noise(rng: &mut StdRng, std_dev: f64) -> f64 {
    if std_dev <= 0.0 {
        return 0.0;
    }

    let u1: f64 = rng.random::<f64>().clamp(1e-9, 1.0);
    let u2: f64 = rng.random::<f64>();
    let z0 = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
    z0 * std_dev
}
