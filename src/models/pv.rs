use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use rand::{SeedableRng, rngs::StdRng};

use crate::config::Params;
use crate::error::AdapterError;
use crate::models::types::{
    AttrValue, EntityDescriptor, EntityId, Inputs, Meta, ModelMeta, OutputData, OutputRequest,
    Simulator, SimulatorKind, gaussian_noise, hour_of_day, param_f64, param_u64, read_cache,
    single_value,
};
use crate::sim::clock::SimClock;

/// Irradiance at which a panel delivers its peak rating (W/m2).
const STC_IRRADIANCE_WM2: f64 = 1000.0;

pub const META: Meta = Meta {
    kind: SimulatorKind::Hybrid,
    models: &[(
        "PV",
        ModelMeta {
            public: true,
            params: &["kw_peak", "sunrise_hour", "sunset_hour", "noise_std", "seed"],
            required: &["kw_peak"],
            inputs: &["g_wm2"],
            outputs: &["g_wm2", "p_kw"],
            any_inputs: false,
            any_outputs: false,
        },
    )],
};

/// A photovoltaic array.
///
/// Without measured irradiance the array follows a half-sine profile between
/// sunrise and sunset. Output uses feeder convention: generation is negative.
#[derive(Debug, Clone)]
pub struct PvArray {
    /// Output under standard test conditions (kW).
    pub kw_peak: f64,
    /// Hour of day generation starts (inclusive).
    pub sunrise_hour: f64,
    /// Hour of day generation stops (exclusive).
    pub sunset_hour: f64,
    /// Relative noise applied to the clear-sky profile.
    pub noise_std: f64,
    rng: StdRng,
}

impl PvArray {
    /// Creates an array.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::InvalidParameter`] unless
    /// `0 <= sunrise_hour < sunset_hour <= 24`.
    pub fn new(
        kw_peak: f64,
        sunrise_hour: f64,
        sunset_hour: f64,
        noise_std: f64,
        seed: u64,
    ) -> Result<Self, AdapterError> {
        if !(0.0 <= sunrise_hour && sunrise_hour < sunset_hour && sunset_hour <= 24.0) {
            return Err(AdapterError::InvalidParameter {
                name: "sunset_hour".to_string(),
                message: format!(
                    "daylight window {sunrise_hour}..{sunset_hour} must lie within 0..24"
                ),
            });
        }
        Ok(Self {
            kw_peak: kw_peak.max(0.0),
            sunrise_hour,
            sunset_hour,
            noise_std: noise_std.max(0.0),
            rng: StdRng::seed_from_u64(seed),
        })
    }

    /// Fraction of peak output at `hour`, 0 outside daylight.
    pub fn daylight_frac(&self, hour: f64) -> f64 {
        if hour < self.sunrise_hour || hour >= self.sunset_hour {
            return 0.0;
        }
        let x = (hour - self.sunrise_hour) / (self.sunset_hour - self.sunrise_hour);
        (std::f64::consts::PI * x).sin().max(0.0)
    }

    /// Noise-free irradiance the profile assumes at `hour`.
    pub fn clear_sky_wm2(&self, hour: f64) -> f64 {
        STC_IRRADIANCE_WM2 * self.daylight_frac(hour)
    }

    /// Clear-sky output at `hour` with noise.
    pub fn profile_kw(&mut self, hour: f64) -> f64 {
        let frac = self.daylight_frac(hour);
        if frac <= 0.0 {
            return 0.0;
        }
        let noise_mult = 1.0 + gaussian_noise(&mut self.rng, self.noise_std);
        -(self.kw_peak * frac * noise_mult).max(0.0)
    }

    /// Output for a measured irradiance.
    pub fn irradiance_kw(&self, g_wm2: f64) -> f64 {
        -(self.kw_peak * g_wm2.max(0.0) / STC_IRRADIANCE_WM2)
    }
}

/// Hybrid adapter around [`PvArray`]: self-schedules every step and uses
/// `g_wm2` when a weather source delivers it.
///
/// Every step publishes `g_wm2`, either the measured value or the clear-sky
/// irradiance the profile used.
#[derive(Debug, Default)]
pub struct Pv {
    time_resolution: Option<u64>,
    clock: Option<SimClock>,
    entities: BTreeMap<EntityId, PvArray>,
    cache: BTreeMap<EntityId, BTreeMap<String, AttrValue>>,
}

impl Pv {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Simulator for Pv {
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

        if !params.contains_key("kw_peak") {
            return Err(AdapterError::MissingParameter("kw_peak".to_string()));
        }
        let kw_peak = param_f64(params, "kw_peak", 0.0)?;
        let sunrise = param_f64(params, "sunrise_hour", 6.0)?;
        let sunset = param_f64(params, "sunset_hour", 18.0)?;
        let noise_std = param_f64(params, "noise_std", 0.0)?;
        let seed = param_u64(params, "seed", 42)?;

        let mut created = Vec::with_capacity(count);
        for _ in 0..count {
            let n = self.entities.len();
            let eid = format!("pv_{n}");
            let array = PvArray::new(kw_peak, sunrise, sunset, noise_std, seed + n as u64)?;
            self.entities.insert(eid.clone(), array);
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
        let clock = self.clock.ok_or(AdapterError::NotInitialized)?;
        let hour = clock.timestamp_at(time).map(hour_of_day).unwrap_or(0.0);

        for (eid, array) in &mut self.entities {
            let measured = match inputs.get(eid).and_then(|attrs| attrs.get("g_wm2")) {
                Some(values) => single_value(eid, "g_wm2", values)?,
                None => None,
            };
            let (g, kw) = match measured {
                Some(g) => (g, array.irradiance_kw(g)),
                None => (array.clear_sky_wm2(hour), array.profile_kw(hour)),
            };
            let out = self.cache.entry(eid.clone()).or_default();
            out.insert("g_wm2".to_string(), g);
            out.insert("p_kw".to_string(), kw);
        }
        Ok(Some(time + 1))
    }

    fn get_data(&self, requested: &OutputRequest) -> Result<OutputData, AdapterError> {
        read_cache(&self.cache, requested)
    }
}
