use std::collections::BTreeMap;

use chrono::NaiveDateTime;

use crate::config::Params;
use crate::error::AdapterError;
use crate::models::types::{
    AttrValue, EntityDescriptor, EntityId, Inputs, Meta, ModelMeta, OutputData, OutputRequest,
    Simulator, SimulatorKind, param_f64, read_cache, single_value,
};
use crate::sim::clock::SimClock;

/// Higher heating value of hydrogen (kWh/kg).
const H2_HHV_KWH_PER_KG: f64 = 39.4;

pub const META: Meta = Meta {
    kind: SimulatorKind::EventBased,
    models: &[(
        "Electrolyser",
        ModelMeta {
            public: true,
            params: &["eff", "rated_power", "ramp_rate", "term_eff"],
            required: &[],
            inputs: &["flow2e"],
            outputs: &["flow2e", "h2_gen", "q_product", "e_consume"],
            any_inputs: false,
            any_outputs: false,
        },
    )],
};

/// Physical electrolyser stack.
///
/// Power drawn is bounded by the rated power and, between consecutive
/// steps, by the ramp rate (fraction of rated power per step).
#[derive(Debug, Clone)]
pub struct ElectrolyserModel {
    /// Electrical-to-hydrogen efficiency (0..1].
    pub eff: f64,
    /// Maximum electrical input (kW).
    pub rated_power: f64,
    /// Maximum power change per step as a fraction of `rated_power`.
    pub ramp_rate: f64,
    /// Fraction of the waste heat that is recovered (0..1).
    pub term_eff: f64,
    /// Power drawn during the previous step (kW).
    power_kw: f64,
}

/// Outputs of one electrolyser step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ElectrolyserOutput {
    /// Power offered to the stack (kW).
    pub flow2e: f64,
    /// Hydrogen produced (kg).
    pub h2_gen: f64,
    /// Recovered heat (kWh).
    pub q_product: f64,
    /// Electrical energy consumed (kWh).
    pub e_consume: f64,
}

impl ElectrolyserModel {
    /// Builds a stack from scenario parameters.
    pub fn from_params(params: &Params) -> Result<Self, AdapterError> {
        let eff = param_f64(params, "eff", 0.7)?;
        let rated_power = param_f64(params, "rated_power", 100.0)?;
        let ramp_rate = param_f64(params, "ramp_rate", 1.0)?;
        let term_eff = param_f64(params, "term_eff", 0.0)?;

        if !(eff > 0.0 && eff <= 1.0) {
            return Err(invalid("eff", "must be in (0, 1]"));
        }
        if rated_power <= 0.0 {
            return Err(invalid("rated_power", "must be > 0"));
        }
        if ramp_rate <= 0.0 {
            return Err(invalid("ramp_rate", "must be > 0"));
        }
        if !(0.0..=1.0).contains(&term_eff) {
            return Err(invalid("term_eff", "must be in [0, 1]"));
        }

        Ok(Self {
            eff,
            rated_power,
            ramp_rate,
            term_eff,
            power_kw: 0.0,
        })
    }

    /// Runs the stack for `dt_hours` on `flow2e` kW of offered power.
    pub fn run(&mut self, flow2e: f64, dt_hours: f64) -> ElectrolyserOutput {
        let ramp_kw = self.ramp_rate * self.rated_power;
        let target = flow2e.clamp(0.0, self.rated_power);
        let power = target.clamp(self.power_kw - ramp_kw, self.power_kw + ramp_kw);
        self.power_kw = power;

        let e_consume = power * dt_hours;
        ElectrolyserOutput {
            flow2e,
            h2_gen: e_consume * self.eff / H2_HHV_KWH_PER_KG,
            q_product: e_consume * (1.0 - self.eff) * self.term_eff,
            e_consume,
        }
    }
}

fn invalid(name: &str, message: &str) -> AdapterError {
    AdapterError::InvalidParameter {
        name: name.to_string(),
        message: message.to_string(),
    }
}

/// Event-based adapter around [`ElectrolyserModel`].
///
/// Only entities that receive `flow2e` in a step are advanced; the adapter
/// never schedules itself.
#[derive(Debug, Default)]
pub struct Electrolyser {
    time_resolution: Option<u64>,
    clock: Option<SimClock>,
    entities: BTreeMap<EntityId, ElectrolyserModel>,
    cache: BTreeMap<EntityId, BTreeMap<String, AttrValue>>,
}

impl Electrolyser {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Simulator for Electrolyser {
    fn init(&mut self, _sid: &str, time_resolution: u64) -> Result<Meta, AdapterError> {
        self.time_resolution = Some(time_resolution);
        Ok(META)
    }

    fn create(
        &mut self,
        count: usize,
        model_type: &str,
        start: NaiveDateTime,
        params: &Params,
    ) -> Result<Vec<EntityDescriptor>, AdapterError> {
        let resolution = self.time_resolution.ok_or(AdapterError::NotInitialized)?;
        META.public_model(model_type)?;
        self.clock = Some(SimClock::new(start, resolution));
        let model = ElectrolyserModel::from_params(params)?;

        let mut created = Vec::with_capacity(count);
        for _ in 0..count {
            let eid = format!("electrolyser_{}", self.entities.len());
            self.entities.insert(eid.clone(), model.clone());
            created.push(EntityDescriptor {
                eid,
                model_type: model_type.to_string(),
            });
        }
        Ok(created)
    }

    fn step(
        &mut self,
        _time: u64,
        inputs: &Inputs,
        _max_advance: u64,
    ) -> Result<Option<u64>, AdapterError> {
        let dt_hours = self.clock.ok_or(AdapterError::NotInitialized)?.dt_hours();

        for (eid, attrs) in inputs {
            let model = self
                .entities
                .get_mut(eid)
                .ok_or_else(|| AdapterError::UnknownEntity(eid.clone()))?;
            let Some(values) = attrs.get("flow2e") else {
                continue;
            };
            let Some(flow2e) = single_value(eid, "flow2e", values)? else {
                continue;
            };

            let out = model.run(flow2e, dt_hours);
            let cached = self.cache.entry(eid.clone()).or_default();
            cached.insert("flow2e".to_string(), out.flow2e);
            cached.insert("h2_gen".to_string(), out.h2_gen);
            cached.insert("q_product".to_string(), out.q_product);
            cached.insert("e_consume".to_string(), out.e_consume);
        }
        Ok(None)
    }

    fn get_data(&self, requested: &OutputRequest) -> Result<OutputData, AdapterError> {
        read_cache(&self.cache, requested)
    }
}
