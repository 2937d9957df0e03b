use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use rand::{SeedableRng, rngs::StdRng};

use crate::config::Params;
use crate::error::AdapterError;
use crate::models::types::{
    AttrValue, EntityDescriptor, EntityId, Inputs, Meta, ModelMeta, OutputData, OutputRequest,
    Simulator, SimulatorKind, gaussian_noise, hour_of_day, param_f64, param_u64, read_cache,
};
use crate::sim::clock::SimClock;

pub const META: Meta = Meta {
    kind: SimulatorKind::TimeBased,
    models: &[(
        "Load",
        ModelMeta {
            public: true,
            params: &["base_kw", "amp_kw", "phase_rad", "noise_std", "seed"],
            required: &[],
            inputs: &[],
            outputs: &["p_kw"],
            any_inputs: false,
            any_outputs: false,
        },
    )],
};

/// Household demand with a daily sinusoidal pattern.
///
/// # Examples
///
/// ```
/// use illuminator::models::load::DailyLoad;
///
/// let mut load = DailyLoad::new(1.0, 0.5, 0.0, 0.0, 42);
/// // sin(0) at midnight leaves only the baseline
/// assert!((load.demand_kw(0.0) - 1.0).abs() < 1e-9);
/// ```
#[derive(Debug, Clone)]
pub struct DailyLoad {
    /// Baseline consumption (kW).
    pub base_kw: f64,
    /// Amplitude of the daily variation (kW).
    pub amp_kw: f64,
    /// Phase offset of the daily pattern (rad).
    pub phase_rad: f64,
    /// Standard deviation of the Gaussian noise (kW).
    pub noise_std: f64,
    rng: StdRng,
}

impl DailyLoad {
    /// Creates a load profile.
    ///
    /// # Arguments
    ///
    /// * `base_kw` - Average consumption in kW
    /// * `amp_kw` - Amplitude of the daily variation in kW
    /// * `phase_rad` - Phase offset in radians
    /// * `noise_std` - Noise standard deviation in kW (negative values are clamped to 0)
    /// * `seed` - Seed for reproducible noise
    pub fn new(base_kw: f64, amp_kw: f64, phase_rad: f64, noise_std: f64, seed: u64) -> Self {
        Self {
            base_kw,
            amp_kw,
            phase_rad,
            noise_std: noise_std.max(0.0),
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Demand at `hour` (0..24). Never negative.
    pub fn demand_kw(&mut self, hour: f64) -> f64 {
        let angle = 2.0 * std::f64::consts::PI * (hour / 24.0) + self.phase_rad;
        let noise = gaussian_noise(&mut self.rng, self.noise_std);
        (self.base_kw + self.amp_kw * angle.sin() + noise).max(0.0)
    }
}

/// Time-based adapter around [`DailyLoad`], advancing one step at a time.
#[derive(Debug, Default)]
pub struct Load {
    time_resolution: Option<u64>,
    clock: Option<SimClock>,
    entities: BTreeMap<EntityId, DailyLoad>,
    cache: BTreeMap<EntityId, BTreeMap<String, AttrValue>>,
}

impl Load {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Simulator for Load {
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

        let base_kw = param_f64(params, "base_kw", 1.0)?;
        let amp_kw = param_f64(params, "amp_kw", 0.5)?;
        let phase_rad = param_f64(params, "phase_rad", 0.0)?;
        let noise_std = param_f64(params, "noise_std", 0.0)?;
        let seed = param_u64(params, "seed", 42)?;

        let mut created = Vec::with_capacity(count);
        for _ in 0..count {
            let n = self.entities.len();
            let eid = format!("load_{n}");
            let profile = DailyLoad::new(base_kw, amp_kw, phase_rad, noise_std, seed + n as u64);
            self.entities.insert(eid.clone(), profile);
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
        _inputs: &Inputs,
        _max_advance: u64,
    ) -> Result<Option<u64>, AdapterError> {
        let clock = self.clock.ok_or(AdapterError::NotInitialized)?;
        let hour = clock.timestamp_at(time).map(hour_of_day).unwrap_or(0.0);

        for (eid, profile) in &mut self.entities {
            let kw = profile.demand_kw(hour);
            self.cache
                .entry(eid.clone())
                .or_default()
                .insert("p_kw".to_string(), kw);
        }
        Ok(Some(time + 1))
    }

    fn get_data(&self, requested: &OutputRequest) -> Result<OutputData, AdapterError> {
        read_cache(&self.cache, requested)
    }
}
