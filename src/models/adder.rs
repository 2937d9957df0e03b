use std::collections::BTreeMap;

use chrono::NaiveDateTime;

use crate::config::Params;
use crate::error::AdapterError;
use crate::models::types::{
    AttrValue, EntityDescriptor, EntityId, Inputs, Meta, ModelMeta, OutputData, OutputRequest,
    Simulator, SimulatorKind, param_f64, param_u64, read_cache, single_value,
};

pub const META: Meta = Meta {
    kind: SimulatorKind::TimeBased,
    models: &[(
        "Adder",
        ModelMeta {
            public: true,
            params: &["in1", "in2", "step_size"],
            required: &[],
            inputs: &["in1", "in2"],
            outputs: &["in1", "in2", "out1"],
            any_inputs: false,
            any_outputs: false,
        },
    )],
};

/// Current inputs of one adder entity.
#[derive(Debug, Clone, Copy)]
struct AdderState {
    in1: AttrValue,
    in2: AttrValue,
}

/// Example model that adds its two inputs.
///
/// Each input takes exactly one value per step; two sources feeding the same
/// input abort the run with [`AdapterError::MultipleInputValues`].
#[derive(Debug, Default)]
pub struct Adder {
    initialized: bool,
    step_size: u64,
    entities: BTreeMap<EntityId, AdderState>,
    cache: BTreeMap<EntityId, BTreeMap<String, AttrValue>>,
}

impl Adder {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Simulator for Adder {
    fn init(&mut self, _sid: &str, _time_resolution: u64) -> Result<Meta, AdapterError> {
        self.initialized = true;
        self.step_size = 1;
        Ok(META)
    }

    fn create(
        &mut self,
        count: usize,
        model_type: &str,
        _start: NaiveDateTime,
        params: &Params,
    ) -> Result<Vec<EntityDescriptor>, AdapterError> {
        if !self.initialized {
            return Err(AdapterError::NotInitialized);
        }
        META.public_model(model_type)?;

        let state = AdderState {
            in1: param_f64(params, "in1", 10.0)?,
            in2: param_f64(params, "in2", 20.0)?,
        };
        self.step_size = param_u64(params, "step_size", 1)?.max(1);

        let mut created = Vec::with_capacity(count);
        for _ in 0..count {
            let eid = format!("adder_{}", self.entities.len());
            self.entities.insert(eid.clone(), state);
            created.push(EntityDescriptor {
                eid,
                model_type: model_type.to_string(),
            });
        }
        Ok(created)
    }

    fn step(
        &mut self,
        time: u64,
        inputs: &Inputs,
        _max_advance: u64,
    ) -> Result<Option<u64>, AdapterError> {
        for (eid, attrs) in inputs {
            let state = self
                .entities
                .get_mut(eid)
                .ok_or_else(|| AdapterError::UnknownEntity(eid.clone()))?;
            for (attr, values) in attrs {
                let Some(value) = single_value(eid, attr, values)? else {
                    continue;
                };
                match attr.as_str() {
                    "in1" => state.in1 = value,
                    "in2" => state.in2 = value,
                    _ => {
                        return Err(AdapterError::UnknownAttribute {
                            eid: eid.clone(),
                            attr: attr.clone(),
                        });
                    }
                }
            }
        }

        for (eid, state) in &self.entities {
            let out = self.cache.entry(eid.clone()).or_default();
            out.insert("in1".to_string(), state.in1);
            out.insert("in2".to_string(), state.in2);
            out.insert("out1".to_string(), state.in1 + state.in2);
        }

        Ok(Some(time + self.step_size))
    }

    fn get_data(&self, requested: &OutputRequest) -> Result<OutputData, AdapterError> {
        read_cache(&self.cache, requested)
    }
}
