//! Replays time series from a CSV data file.
//!
//! File layout: an optional first line holding only a model name, a header
//! line `Date,<attr>,...`, then one row per timestamp. Every column after the
//! first must be numeric.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::NaiveDateTime;
use tracing::debug;

use crate::config::Params;
use crate::error::AdapterError;
use crate::models::types::{
    AttrValue, EntityDescriptor, EntityId, Inputs, Meta, ModelMeta, OutputData, OutputRequest,
    Simulator, SimulatorKind, read_cache, require_str,
};
use crate::sim::clock::{SimClock, TIMESTAMP_FORMAT, format_timestamp};

pub const META: Meta = Meta {
    kind: SimulatorKind::TimeBased,
    models: &[(
        "CSV",
        ModelMeta {
            public: true,
            params: &["start", "datafile"],
            required: &["start", "datafile"],
            inputs: &[],
            outputs: &[],
            any_inputs: false,
            any_outputs: true,
        },
    )],
};

/// Parsed contents of a data file.
#[derive(Debug, Clone, PartialEq)]
pub struct DataTable {
    pub columns: Vec<String>,
    pub rows: BTreeMap<NaiveDateTime, Vec<f64>>,
}

impl DataTable {
    /// Reads a data file from disk.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Io`] if the file cannot be opened and
    /// [`AdapterError::DataFile`] if its contents are malformed.
    pub fn read(path: &Path) -> Result<Self, AdapterError> {
        let reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_path(path)
            .map_err(|e| AdapterError::Io(format!("{}: {e}", path.display())))?;
        Self::from_reader(reader)
    }

    /// Parses a data table from any CSV reader configured without headers.
    pub fn from_reader<R: std::io::Read>(mut reader: csv::Reader<R>) -> Result<Self, AdapterError> {
        let mut columns: Option<Vec<String>> = None;
        let mut rows = BTreeMap::new();

        for (line, record) in reader.records().enumerate() {
            let record = record.map_err(|e| AdapterError::DataFile(e.to_string()))?;
            let Some(cols) = &columns else {
                // model-name line
                if record.len() == 1 && line == 0 {
                    continue;
                }
                if record.len() < 2 {
                    return Err(AdapterError::DataFile(
                        "header needs a date column and at least one attribute".to_string(),
                    ));
                }
                columns = Some(record.iter().skip(1).map(str::to_string).collect());
                continue;
            };

            let raw_ts = record.get(0).unwrap_or_default();
            let ts = NaiveDateTime::parse_from_str(raw_ts, TIMESTAMP_FORMAT).map_err(|e| {
                AdapterError::DataFile(format!("line {}: bad timestamp \"{raw_ts}\" ({e})", line + 1))
            })?;
            if record.len() != cols.len() + 1 {
                return Err(AdapterError::DataFile(format!(
                    "line {}: expected {} values, found {}",
                    line + 1,
                    cols.len(),
                    record.len().saturating_sub(1)
                )));
            }
            let values = record
                .iter()
                .skip(1)
                .map(|v| {
                    v.parse::<f64>().map_err(|_| {
                        AdapterError::DataFile(format!("line {}: \"{v}\" is not a number", line + 1))
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            rows.insert(ts, values);
        }

        let columns =
            columns.ok_or_else(|| AdapterError::DataFile("data file has no header".to_string()))?;
        Ok(Self { columns, rows })
    }
}

/// Time-based adapter that emits one data row per step.
#[derive(Debug, Default)]
pub struct CsvReader {
    time_resolution: Option<u64>,
    clock: Option<SimClock>,
    entities: BTreeMap<EntityId, DataTable>,
    cache: BTreeMap<EntityId, BTreeMap<String, AttrValue>>,
}

impl CsvReader {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Simulator for CsvReader {
    fn init(&mut self, _sid: &str, time_resolution: u64) -> Result<Meta, AdapterError> {
        self.time_resolution = Some(time_resolution);
        Ok(META)
    }

    fn create(
        &mut self,
        count: usize,
        model_type: &str,
        _start: NaiveDateTime,
        params: &Params,
    ) -> Result<Vec<EntityDescriptor>, AdapterError> {
        let resolution = self.time_resolution.ok_or(AdapterError::NotInitialized)?;
        META.public_model(model_type)?;

        let raw_start = require_str(params, "start")?;
        let start = NaiveDateTime::parse_from_str(raw_start.trim(), TIMESTAMP_FORMAT).map_err(
            |e| AdapterError::InvalidParameter {
                name: "start".to_string(),
                message: format!("\"{raw_start}\" is not a timestamp ({e})"),
            },
        )?;
        let datafile = require_str(params, "datafile")?;
        let table = DataTable::read(Path::new(datafile))?;
        debug!(
            datafile,
            rows = table.rows.len(),
            columns = ?table.columns,
            "loaded data file"
        );
        self.clock = Some(SimClock::new(start, resolution));

        let mut created = Vec::with_capacity(count);
        for _ in 0..count {
            let eid = format!("csv_{}", self.entities.len());
            self.entities.insert(eid.clone(), table.clone());
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
        let ts = clock
            .timestamp_at(time)
            .ok_or_else(|| AdapterError::DataFile(format!("step {time} is out of range")))?;

        for (eid, table) in &self.entities {
            let row = table.rows.get(&ts).ok_or_else(|| {
                AdapterError::DataFile(format!("no row for {}", format_timestamp(ts)))
            })?;
            let out = self.cache.entry(eid.clone()).or_default();
            for (col, value) in table.columns.iter().zip(row) {
                out.insert(col.clone(), *value);
            }
        }
        Ok(Some(time + 1))
    }

    fn get_data(&self, requested: &OutputRequest) -> Result<OutputData, AdapterError> {
        read_cache(&self.cache, requested)
    }
}
