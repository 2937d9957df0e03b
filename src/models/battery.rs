use std::collections::BTreeMap;

use chrono::NaiveDateTime;

use crate::config::Params;
use crate::error::AdapterError;
use crate::models::types::{
    AttrValue, EntityDescriptor, EntityId, Inputs, Meta, ModelMeta, OutputData, OutputRequest,
    Simulator, SimulatorKind, param_f64, read_cache, single_value,
};
use crate::sim::clock::SimClock;

pub const META: Meta = Meta {
    kind: SimulatorKind::Hybrid,
    models: &[(
        "Battery",
        ModelMeta {
            public: true,
            params: &[
                "capacity_kwh",
                "initial_soc",
                "max_charge_kw",
                "max_discharge_kw",
                "eta_charge",
                "eta_discharge",
            ],
            required: &["capacity_kwh"],
            inputs: &["p_set_kw"],
            outputs: &["p_set_kw", "p_kw", "soc"],
            any_inputs: false,
            any_outputs: false,
        },
    )],
};

/// Battery storage that tracks its state of charge.
///
/// # Power Flow Convention (Feeder)
/// - Positive power: charging (load on the feeder)
/// - Negative power: discharging (generation on the feeder)
#[derive(Debug, Clone)]
pub struct Storage {
    /// Usable capacity (kWh).
    pub capacity_kwh: f64,
    /// State of charge (0..1).
    pub soc: f64,
    /// Maximum charging power (kW).
    pub max_charge_kw: f64,
    /// Maximum discharging power (kW).
    pub max_discharge_kw: f64,
    /// Charging efficiency (0..1].
    pub eta_c: f64,
    /// Discharging efficiency (0..1].
    pub eta_d: f64,
}

impl Storage {
    /// Builds a battery from scenario parameters.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::InvalidParameter`] for a non-positive capacity,
    /// an initial state of charge outside `0..=1`, negative power limits, or
    /// efficiencies outside `(0, 1]`.
    pub fn from_params(params: &Params) -> Result<Self, AdapterError> {
        let capacity_kwh = param_f64(params, "capacity_kwh", 0.0)?;
        let soc = param_f64(params, "initial_soc", 0.5)?;
        let max_charge_kw = param_f64(params, "max_charge_kw", capacity_kwh)?;
        let max_discharge_kw = param_f64(params, "max_discharge_kw", capacity_kwh)?;
        let eta_c = param_f64(params, "eta_charge", 0.95)?;
        let eta_d = param_f64(params, "eta_discharge", 0.95)?;

        let check = |ok: bool, name: &str, message: &str| {
            if ok {
                Ok(())
            } else {
                Err(AdapterError::InvalidParameter {
                    name: name.to_string(),
                    message: message.to_string(),
                })
            }
        };
        check(capacity_kwh > 0.0, "capacity_kwh", "must be > 0")?;
        check((0.0..=1.0).contains(&soc), "initial_soc", "must be in [0, 1]")?;
        check(max_charge_kw >= 0.0, "max_charge_kw", "must be >= 0")?;
        check(max_discharge_kw >= 0.0, "max_discharge_kw", "must be >= 0")?;
        check(eta_c > 0.0 && eta_c <= 1.0, "eta_charge", "must be in (0, 1]")?;
        check(eta_d > 0.0 && eta_d <= 1.0, "eta_discharge", "must be in (0, 1]")?;

        Ok(Self {
            capacity_kwh,
            soc,
            max_charge_kw,
            max_discharge_kw,
            eta_c,
            eta_d,
        })
    }

    /// Applies a setpoint for `dt_hours` and returns the power actually drawn.
    ///
    /// The setpoint is limited by the power ratings, then by the energy that
    /// fits into (or is left in) the battery.
    pub fn apply(&mut self, setpoint_kw: f64, dt_hours: f64) -> f64 {
        let cmd_kw = if setpoint_kw >= 0.0 {
            setpoint_kw.min(self.max_charge_kw)
        } else {
            setpoint_kw.max(-self.max_discharge_kw)
        };

        if cmd_kw > 0.0 {
            let headroom_kwh = (1.0 - self.soc) * self.capacity_kwh / self.eta_c;
            let actual_kw = cmd_kw.min((headroom_kwh / dt_hours).max(0.0));
            self.soc += actual_kw * dt_hours * self.eta_c / self.capacity_kwh;
            self.soc = self.soc.clamp(0.0, 1.0);
            actual_kw
        } else if cmd_kw < 0.0 {
            let available_kwh = self.soc * self.capacity_kwh * self.eta_d;
            let actual_kw = (-cmd_kw).min((available_kwh / dt_hours).max(0.0));
            self.soc -= actual_kw * dt_hours / (self.capacity_kwh * self.eta_d);
            self.soc = self.soc.clamp(0.0, 1.0);
            -actual_kw
        } else {
            0.0
        }
    }
}

/// Hybrid adapter around [`Storage`].
///
/// The last received `p_set_kw` is held until a new one arrives.
#[derive(Debug, Default)]
pub struct Battery {
    time_resolution: Option<u64>,
    clock: Option<SimClock>,
    entities: BTreeMap<EntityId, (Storage, f64)>,
    cache: BTreeMap<EntityId, BTreeMap<String, AttrValue>>,
}

impl Battery {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Simulator for Battery {
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
        if !params.contains_key("capacity_kwh") {
            return Err(AdapterError::MissingParameter("capacity_kwh".to_string()));
        }
        let storage = Storage::from_params(params)?;

        let mut created = Vec::with_capacity(count);
        for _ in 0..count {
            let eid = format!("battery_{}", self.entities.len());
            self.entities.insert(eid.clone(), (storage.clone(), 0.0));
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
        let dt_hours = self.clock.ok_or(AdapterError::NotInitialized)?.dt_hours();

        for (eid, (storage, setpoint)) in &mut self.entities {
            if let Some(values) = inputs.get(eid).and_then(|attrs| attrs.get("p_set_kw")) {
                if let Some(v) = single_value(eid, "p_set_kw", values)? {
                    *setpoint = v;
                }
            }
            let kw = storage.apply(*setpoint, dt_hours);
            let out = self.cache.entry(eid.clone()).or_default();
            out.insert("p_set_kw".to_string(), *setpoint);
            out.insert("p_kw".to_string(), kw);
            out.insert("soc".to_string(), storage.soc);
        }
        Ok(Some(time + 1))
    }

    fn get_data(&self, requested: &OutputRequest) -> Result<OutputData, AdapterError> {
        read_cache(&self.cache, requested)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn storage(soc: f64) -> Storage {
        let params: Params = [
            ("capacity_kwh", 10.0),
            ("initial_soc", soc),
            ("max_charge_kw", 5.0),
            ("max_discharge_kw", 5.0),
            ("eta_charge", 1.0),
            ("eta_discharge", 1.0),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), serde_yaml::Value::from(v)))
        .collect();
        Storage::from_params(&params).expect("valid params")
    }

    #[test]
    fn charge_is_limited_by_rating() {
        let mut b = storage(0.5);
        assert_eq!(b.apply(10.0, 0.25), 5.0);
    }

    #[test]
    fn discharge_is_limited_by_rating() {
        let mut b = storage(0.5);
        assert_eq!(b.apply(-10.0, 0.25), -5.0);
    }

    #[test]
    fn discharge_is_limited_by_stored_energy() {
        // 1 kWh left over a quarter hour allows at most 4 kW
        let mut b = storage(0.1);
        let kw = b.apply(-5.0, 0.25);
        assert!((kw + 4.0).abs() < 1e-9);
        assert!(b.soc < 1e-9);
    }

    #[test]
    fn full_battery_refuses_charge() {
        let mut b = storage(1.0);
        assert_eq!(b.apply(3.0, 0.25), 0.0);
        assert_eq!(b.soc, 1.0);
    }

    #[test]
    fn invalid_soc_is_an_error() {
        let mut params = Params::new();
        params.insert("capacity_kwh".into(), serde_yaml::Value::from(10.0));
        params.insert("initial_soc".into(), serde_yaml::Value::from(1.2));
        let err = Storage::from_params(&params).expect_err("soc above 1");
        assert!(matches!(err, AdapterError::InvalidParameter { ref name, .. } if name == "initial_soc"));
    }

    #[test]
    fn setpoint_is_held_between_inputs() {
        let start = crate::sim::clock::parse_timestamp("s", "2012-01-01 00:00:00")
            .expect("valid timestamp");
        let mut sim = Battery::new();
        sim.init("Battery", 3600).expect("init");
        let mut params = Params::new();
        params.insert("capacity_kwh".into(), serde_yaml::Value::from(10.0));
        params.insert("eta_charge".into(), serde_yaml::Value::from(1.0));
        sim.create(1, "Battery", start, &params).expect("create");

        let mut inputs = Inputs::new();
        inputs
            .entry("battery_0".into())
            .or_default()
            .insert("p_set_kw".into(), [("Ctrl.c_0".to_string(), 1.0)].into());
        sim.step(0, &inputs, 10).expect("step");
        sim.step(1, &Inputs::new(), 10).expect("step");

        let mut req = OutputRequest::new();
        req.insert("battery_0".into(), vec!["p_kw".into(), "soc".into()]);
        let data = sim.get_data(&req).expect("data");
        assert_eq!(data["battery_0"]["p_kw"], 1.0);
        assert!((data["battery_0"]["soc"] - 0.7).abs() < 1e-9);
    }
}
