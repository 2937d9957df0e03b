//! Scenario configuration: loading, validation, and default values.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::schema;

/// Time resolution applied when a scenario omits one (15 minutes).
pub const DEFAULT_TIME_RESOLUTION: u64 = 900;
/// Results destination applied when a scenario omits one.
pub const DEFAULT_RESULTS: &str = "./out.csv";
/// Launch-plan name of the results collector; no model may use it.
pub const COLLECTOR_NAME: &str = "Collector";

/// Free-form model parameter value as written in the scenario.
pub type ParamValue = serde_yaml::Value;
/// Model parameters keyed by name.
pub type Params = BTreeMap<String, ParamValue>;

/// Root of a parsed scenario file.
///
/// Build it with [`load`] (or the `from_*` constructors), then pass it
/// through [`apply_defaults`] before compiling.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ScenarioConfig {
    /// Simulation window and output settings.
    pub scenario: Scenario,
    /// Declared models, in launch order.
    pub models: Vec<ModelSpec>,
    /// Data links between model attributes.
    #[serde(default)]
    pub connections: Vec<ConnectionSpec>,
    /// Attributes recorded by the results collector.
    #[serde(default)]
    pub monitor: MonitorSpec,
}

/// The `scenario` section.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Scenario {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Start timestamp (`YYYY-MM-DD HH:MM:SS`).
    pub start_time: String,
    /// End timestamp (`YYYY-MM-DD HH:MM:SS`).
    pub end_time: String,
    /// Seconds per simulation step.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_resolution: Option<u64>,
    /// Destination of the collected results.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub results: Option<String>,
}

/// One entry of the `models` section.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ModelSpec {
    /// Unique model name within the scenario.
    pub name: String,
    /// Type tag resolved through the model registry.
    #[serde(rename = "type")]
    pub model_type: String,
    #[serde(default)]
    pub parameters: Params,
    /// Declared input attributes (values are informational).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inputs: Option<BTreeMap<String, ParamValue>>,
    /// Declared output attributes (values are informational).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outputs: Option<BTreeMap<String, ParamValue>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub states: Option<BTreeMap<String, ParamValue>>,
}

/// One entry of the `connections` section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ConnectionSpec {
    /// Source as `<model>.<attribute>`.
    pub from: String,
    /// Destination as `<model>.<attribute>`.
    pub to: String,
}

/// The `monitor` section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct MonitorSpec {
    /// Observed attributes as `<model>.<attribute>`.
    #[serde(default)]
    pub items: Vec<String>,
}

/// Loads and validates a scenario file.
///
/// Files ending in `.toml` are read as TOML; everything else as YAML.
///
/// # Errors
///
/// Returns [`Error::Io`] if the file cannot be read, [`Error::ConfigFormat`]
/// if it cannot be parsed, and [`Error::SchemaValidation`] if it does not
/// match the scenario schema.
pub fn load(path: &Path) -> Result<ScenarioConfig> {
    ScenarioConfig::from_file(path)
}

/// Returns a copy of `config` with omitted optional fields set to their defaults.
///
/// Only absence is checked: a present value is kept as-is, even `0`.
pub fn apply_defaults(config: &ScenarioConfig) -> ScenarioConfig {
    let mut out = config.clone();
    let s = &mut out.scenario;
    if s.time_resolution.is_none() {
        s.time_resolution = Some(DEFAULT_TIME_RESOLUTION);
    }
    if s.results.is_none() {
        s.results = Some(DEFAULT_RESULTS.to_string());
    }
    out
}

/// Replaces TOML datetimes with `YYYY-MM-DD HH:MM:SS` strings.
///
/// Datetimes carrying an offset or lacking a date or time keep TOML's own
/// formatting, which timestamp parsing at compile time then rejects.
fn datetimes_as_strings(value: toml::Value) -> toml::Value {
    match value {
        toml::Value::Datetime(dt) => toml::Value::String(match (dt.date, dt.time, dt.offset) {
            (Some(date), Some(time), None) => format!("{date} {time}"),
            _ => dt.to_string(),
        }),
        toml::Value::Array(items) => {
            toml::Value::Array(items.into_iter().map(datetimes_as_strings).collect())
        }
        toml::Value::Table(table) => toml::Value::Table(
            table
                .into_iter()
                .map(|(k, v)| (k, datetimes_as_strings(v)))
                .collect(),
        ),
        other => other,
    }
}

impl ScenarioConfig {
    /// Reads a scenario from disk, choosing the parser from the file extension.
    ///
    /// # Errors
    ///
    /// See [`load`].
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), "read scenario file");
        match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => Self::from_toml_str(&content),
            _ => Self::from_yaml_str(&content),
        }
    }

    /// Parses and validates a scenario from YAML text.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigFormat`] or [`Error::SchemaValidation`].
    pub fn from_yaml_str(s: &str) -> Result<Self> {
        let doc: serde_yaml::Value =
            serde_yaml::from_str(s).map_err(|e| Error::ConfigFormat(e.to_string()))?;
        Self::from_document(doc)
    }

    /// Parses and validates a scenario from TOML text.
    ///
    /// Unquoted TOML datetimes (`start_time = 2012-01-01 00:00:00`) are read
    /// as timestamp strings.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigFormat`] or [`Error::SchemaValidation`].
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let value: toml::Value = toml::from_str(s).map_err(|e| Error::ConfigFormat(e.to_string()))?;
        let doc = serde_yaml::to_value(datetimes_as_strings(value))
            .map_err(|e| Error::ConfigFormat(e.to_string()))?;
        Self::from_document(doc)
    }

    fn from_document(doc: serde_yaml::Value) -> Result<Self> {
        schema::validate(&doc)?;
        let config: Self =
            serde_yaml::from_value(doc).map_err(|e| Error::schema("$", e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks constraints that span several fields.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SchemaValidation`] naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        if self.scenario.time_resolution == Some(0) {
            return Err(Error::schema("scenario.time_resolution", "must be > 0"));
        }
        if self.models.is_empty() {
            return Err(Error::schema("models", "at least one model is required"));
        }

        let mut seen = BTreeSet::new();
        for (i, model) in self.models.iter().enumerate() {
            let field = format!("models[{i}].name");
            if model.name.is_empty() {
                return Err(Error::schema(field, "must not be empty"));
            }
            if model.name == COLLECTOR_NAME {
                return Err(Error::schema(
                    field,
                    format!("\"{COLLECTOR_NAME}\" is reserved for the results collector"),
                ));
            }
            if !seen.insert(model.name.as_str()) {
                return Err(Error::schema(
                    field,
                    format!("duplicate model name \"{}\"", model.name),
                ));
            }
        }
        Ok(())
    }

    /// Returns the model with the given name.
    pub fn model(&self, name: &str) -> Option<&ModelSpec> {
        self.models.iter().find(|m| m.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCENARIO: &str = r#"
scenario:
  start_time: '2012-01-01 00:00:00'
  end_time: '2012-01-01 01:00:00'
models:
  - name: CSVB
    type: CSV
    parameters:
      start: '2012-01-01 00:00:00'
      datafile: tests/data.csv
  - name: PV
    type: PV
    inputs: {g_wm2: null}
    outputs: {p_kw: null}
connections:
  - from: CSVB.G_Gh
    to: PV.g_wm2
monitor:
  items:
    - PV.p_kw
"#;

    fn parsed() -> ScenarioConfig {
        ScenarioConfig::from_yaml_str(SCENARIO).expect("scenario should parse")
    }

    #[test]
    fn valid_yaml_parses() {
        let cfg = parsed();
        assert_eq!(cfg.models.len(), 2);
        assert_eq!(cfg.models[0].model_type, "CSV");
        assert_eq!(cfg.connections[0].from, "CSVB.G_Gh");
        assert_eq!(cfg.monitor.items, vec!["PV.p_kw".to_string()]);
        assert_eq!(cfg.scenario.time_resolution, None);
    }

    #[test]
    fn unparsable_yaml_is_format_error() {
        let err = ScenarioConfig::from_yaml_str("scenario: [unclosed").expect_err("must fail");
        assert!(matches!(err, Error::ConfigFormat(_)));
    }

    #[test]
    fn missing_models_is_schema_error() {
        let yaml = "scenario: {start_time: a, end_time: b}\n";
        let err = ScenarioConfig::from_yaml_str(yaml).expect_err("must fail");
        assert!(matches!(err, Error::SchemaValidation { ref field, .. } if field == "models"));
    }

    #[test]
    fn duplicate_model_names_are_rejected() {
        let yaml = r#"
scenario: {start_time: a, end_time: b}
models:
  - {name: A, type: Adder}
  - {name: A, type: Adder}
"#;
        let err = ScenarioConfig::from_yaml_str(yaml).expect_err("must fail");
        assert!(
            matches!(err, Error::SchemaValidation { ref field, .. } if field == "models[1].name")
        );
    }

    #[test]
    fn collector_name_is_reserved() {
        let yaml = "scenario: {start_time: a, end_time: b}\nmodels:\n  - {name: Collector, type: Adder}\n";
        assert!(ScenarioConfig::from_yaml_str(yaml).is_err());
    }

    #[test]
    fn toml_scenario_parses() {
        let toml = r#"
[scenario]
start_time = "2012-01-01 00:00:00"
end_time = "2012-01-02 00:00:00"
time_resolution = 3600

[[models]]
name = "A"
type = "Adder"

[models.parameters]
in1 = 2

[monitor]
items = ["A.out1"]
"#;
        let cfg = ScenarioConfig::from_toml_str(toml).expect("toml should parse");
        assert_eq!(cfg.scenario.time_resolution, Some(3600));
        assert_eq!(cfg.models[0].parameters.get("in1").and_then(|v| v.as_i64()), Some(2));
    }

    #[test]
    fn unquoted_toml_datetimes_are_timestamps() {
        let toml = r#"
[scenario]
start_time = 2012-01-01 00:00:00
end_time = 2012-01-01T06:00:00

[[models]]
name = "A"
type = "Adder"
"#;
        let cfg = ScenarioConfig::from_toml_str(toml).expect("toml should parse");
        assert_eq!(cfg.scenario.start_time, "2012-01-01 00:00:00");
        assert_eq!(cfg.scenario.end_time, "2012-01-01 06:00:00");
    }

    #[test]
    fn toml_datetime_with_offset_fails_to_compile() {
        let toml = r#"
[scenario]
start_time = 2012-01-01T00:00:00Z
end_time = "2012-01-01 06:00:00"

[[models]]
name = "A"
type = "Adder"
"#;
        let cfg = ScenarioConfig::from_toml_str(toml).expect("toml should parse");
        assert_eq!(cfg.scenario.start_time, "2012-01-01T00:00:00Z");
        let err = crate::plan::compile(&cfg).expect_err("offsets are not scenario timestamps");
        assert!(
            matches!(err, Error::SchemaValidation { ref field, .. } if field == "scenario.start_time"),
            "got {err:?}"
        );
    }

    #[test]
    fn defaults_fill_absent_fields() {
        let cfg = apply_defaults(&parsed());
        assert_eq!(cfg.scenario.time_resolution, Some(DEFAULT_TIME_RESOLUTION));
        assert_eq!(cfg.scenario.results.as_deref(), Some(DEFAULT_RESULTS));
    }

    #[test]
    fn defaults_never_overwrite_present_values() {
        let mut cfg = parsed();
        cfg.scenario.time_resolution = Some(0);
        cfg.scenario.results = Some(String::new());
        let out = apply_defaults(&cfg);
        assert_eq!(out.scenario.time_resolution, Some(0));
        assert_eq!(out.scenario.results.as_deref(), Some(""));
    }

    #[test]
    fn defaults_are_idempotent_and_pure() {
        let original = parsed();
        let once = apply_defaults(&original);
        let twice = apply_defaults(&once);
        assert_eq!(once, twice);
        assert_eq!(original.scenario.results, None, "input must not be mutated");
    }
}
