//! Monitor that records every attribute connected to it and writes them to
//! the results file when the run ends.

use std::path::PathBuf;

use chrono::NaiveDateTime;
use tracing::{info, warn};

use crate::config::{DEFAULT_RESULTS, Params};
use crate::error::AdapterError;
use crate::io::export::{ResultsTable, export_csv};
use crate::models::types::{
    EntityDescriptor, Inputs, Meta, ModelMeta, OutputData, OutputRequest, Simulator,
    SimulatorKind,
};
use crate::sim::clock::SimClock;

pub const META: Meta = Meta {
    kind: SimulatorKind::EventBased,
    models: &[(
        "Monitor",
        ModelMeta {
            public: true,
            params: &["output_file"],
            required: &[],
            inputs: &[],
            outputs: &[],
            any_inputs: true,
            any_outputs: false,
        },
    )],
};

/// Event-based results collector.
///
/// Values arriving as `<attr>` from entity `<model>.<eid>` are stored in the
/// column `<model>.<attr>`.
#[derive(Debug, Default)]
pub struct Collector {
    time_resolution: Option<u64>,
    eid: Option<String>,
    output_file: PathBuf,
    table: Option<ResultsTable>,
}

impl Collector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Values recorded so far, once the monitor entity exists.
    pub fn table(&self) -> Option<&ResultsTable> {
        self.table.as_ref()
    }
}

impl Simulator for Collector {
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
        if count != 1 || self.eid.is_some() {
            return Err(AdapterError::InvalidParameter {
                name: "num".to_string(),
                message: "only one monitor entity can be created".to_string(),
            });
        }

        self.output_file = match params.get("output_file") {
            None => PathBuf::from(DEFAULT_RESULTS),
            Some(v) => v
                .as_str()
                .map(PathBuf::from)
                .ok_or_else(|| AdapterError::InvalidParameter {
                    name: "output_file".to_string(),
                    message: "expected a path".to_string(),
                })?,
        };
        self.table = Some(ResultsTable::new(SimClock::new(start, resolution)));

        let eid = "monitor".to_string();
        self.eid = Some(eid.clone());
        Ok(vec![EntityDescriptor {
            eid,
            model_type: model_type.to_string(),
        }])
    }

    fn step(
        &mut self,
        time: u64,
        inputs: &Inputs,
        _max_advance: u64,
    ) -> Result<Option<u64>, AdapterError> {
        let table = self.table.as_mut().ok_or(AdapterError::NotInitialized)?;
        for (eid, attrs) in inputs {
            if self.eid.as_deref() != Some(eid.as_str()) {
                return Err(AdapterError::UnknownEntity(eid.clone()));
            }
            for (attr, sources) in attrs {
                for (source, value) in sources {
                    let model = source.split('.').next().unwrap_or(source);
                    table.record(time, &format!("{model}.{attr}"), *value);
                }
            }
        }
        Ok(None)
    }

    fn get_data(&self, requested: &OutputRequest) -> Result<OutputData, AdapterError> {
        match requested.keys().next() {
            None => Ok(OutputData::new()),
            Some(eid) => Err(AdapterError::UnknownEntity(eid.clone())),
        }
    }

    fn finalize(&mut self) -> Result<(), AdapterError> {
        let Some(table) = &self.table else {
            return Ok(());
        };
        if table.is_empty() {
            warn!(path = %self.output_file.display(), "no monitored values were recorded");
        }
        export_csv(table, &self.output_file)
            .map_err(|e| AdapterError::Io(format!("{}: {e}", self.output_file.display())))?;
        info!(
            path = %self.output_file.display(),
            rows = table.len(),
            "results written"
        );
        Ok(())
    }
}
