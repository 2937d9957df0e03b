//! Structural schema for scenario documents.
//!
//! The schema is checked against the generic YAML document before it is
//! converted into typed records, so every failure can name the offending
//! field path (e.g. `models[1].type`).

use serde_yaml::{Mapping, Value};

use crate::error::{Error, Result};

/// Shape a value must have.
enum Kind {
    Str,
    PositiveInt,
    /// Free-form mapping with string keys.
    AnyMap,
    Record(&'static [Field]),
    SeqOf(&'static Kind),
}

struct Field {
    key: &'static str,
    required: bool,
    kind: Kind,
}

const fn required(key: &'static str, kind: Kind) -> Field {
    Field {
        key,
        required: true,
        kind,
    }
}

const fn optional(key: &'static str, kind: Kind) -> Field {
    Field {
        key,
        required: false,
        kind,
    }
}

const SCENARIO: &[Field] = &[
    optional("name", Kind::Str),
    required("start_time", Kind::Str),
    required("end_time", Kind::Str),
    optional("time_resolution", Kind::PositiveInt),
    optional("results", Kind::Str),
];

const MODEL: &[Field] = &[
    required("name", Kind::Str),
    required("type", Kind::Str),
    optional("parameters", Kind::AnyMap),
    optional("inputs", Kind::AnyMap),
    optional("outputs", Kind::AnyMap),
    optional("states", Kind::AnyMap),
];

const CONNECTION: &[Field] = &[required("from", Kind::Str), required("to", Kind::Str)];

const MONITOR: &[Field] = &[required("items", Kind::SeqOf(&Kind::Str))];

const ROOT: &[Field] = &[
    required("scenario", Kind::Record(SCENARIO)),
    required("models", Kind::SeqOf(&Kind::Record(MODEL))),
    optional("connections", Kind::SeqOf(&Kind::Record(CONNECTION))),
    optional("monitor", Kind::Record(MONITOR)),
];

/// Validates a scenario document against the fixed scenario schema.
///
/// # Errors
///
/// Returns [`Error::SchemaValidation`] for the first field that is missing,
/// mistyped, or unknown.
pub fn validate(doc: &Value) -> Result<()> {
    check_record(doc, "", ROOT)
}

fn check(value: &Value, path: &str, kind: &Kind) -> Result<()> {
    match kind {
        Kind::Str => match value {
            Value::String(_) => Ok(()),
            _ => Err(Error::schema(path, format!("expected a string, got {}", describe(value)))),
        },
        Kind::PositiveInt => match value.as_u64() {
            Some(n) if n > 0 => Ok(()),
            _ => Err(Error::schema(
                path,
                format!("expected a positive integer, got {}", describe(value)),
            )),
        },
        Kind::AnyMap => {
            let map = as_mapping(value, path)?;
            for key in map.keys() {
                if !key.is_string() {
                    return Err(Error::schema(path, "mapping keys must be strings"));
                }
            }
            Ok(())
        }
        Kind::Record(fields) => check_record(value, path, fields),
        Kind::SeqOf(item) => {
            let Value::Sequence(items) = value else {
                return Err(Error::schema(
                    path,
                    format!("expected a sequence, got {}", describe(value)),
                ));
            };
            for (i, v) in items.iter().enumerate() {
                check(v, &format!("{path}[{i}]"), item)?;
            }
            Ok(())
        }
    }
}

fn check_record(value: &Value, path: &str, fields: &[Field]) -> Result<()> {
    let map = as_mapping(value, if path.is_empty() { "$" } else { path })?;

    for key in map.keys() {
        let Some(name) = key.as_str() else {
            return Err(Error::schema(join(path, "?"), "mapping keys must be strings"));
        };
        if !fields.iter().any(|f| f.key == name) {
            return Err(Error::schema(join(path, name), "unknown field"));
        }
    }

    for field in fields {
        let field_path = join(path, field.key);
        match map.get(field.key) {
            // An explicit `null` counts as absent for optional fields.
            None | Some(Value::Null) if !field.required => {}
            None | Some(Value::Null) => {
                return Err(Error::schema(field_path, "missing required field"));
            }
            Some(v) => check(v, &field_path, &field.kind)?,
        }
    }
    Ok(())
}

fn as_mapping<'a>(value: &'a Value, path: &str) -> Result<&'a Mapping> {
    value.as_mapping().ok_or_else(|| {
        Error::schema(path, format!("expected a mapping, got {}", describe(value)))
    })
}

fn join(parent: &str, key: &str) -> String {
    if parent.is_empty() {
        key.to_string()
    } else {
        format!("{parent}.{key}")
    }
}

fn describe(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Sequence(_) => "a sequence",
        Value::Mapping(_) => "a mapping",
        Value::Tagged(_) => "a tagged value",
    }
}

#[cfg(test)]
mod tests {
    use super::validate;
    use crate::error::Error;

    fn field_of(yaml: &str) -> String {
        let doc: serde_yaml::Value = serde_yaml::from_str(yaml).expect("test yaml parses");
        match validate(&doc) {
            Err(Error::SchemaValidation { field, .. }) => field,
            other => panic!("expected schema error, got {other:?}"),
        }
    }

    const VALID: &str = r#"
scenario:
  start_time: '2012-01-01 00:00:00'
  end_time: '2012-01-01 01:00:00'
models:
  - name: A
    type: Adder
    parameters: {in1: 1}
connections:
  - {from: A.out1, to: A.in1}
monitor:
  items: [A.out1]
"#;

    #[test]
    fn accepts_valid_document() {
        let doc: serde_yaml::Value = serde_yaml::from_str(VALID).expect("test yaml parses");
        assert!(validate(&doc).is_ok());
    }

    #[test]
    fn missing_start_time_reports_path() {
        let yaml = "scenario: {end_time: '2012-01-01 01:00:00'}\nmodels: []\n";
        assert_eq!(field_of(yaml), "scenario.start_time");
    }

    #[test]
    fn mistyped_model_type_reports_index() {
        let yaml = r#"
scenario: {start_time: a, end_time: b}
models:
  - {name: A, type: Adder}
  - {name: B, type: 3}
"#;
        assert_eq!(field_of(yaml), "models[1].type");
    }

    #[test]
    fn zero_time_resolution_is_rejected() {
        let yaml = "scenario: {start_time: a, end_time: b, time_resolution: 0}\nmodels: []\n";
        assert_eq!(field_of(yaml), "scenario.time_resolution");
    }

    #[test]
    fn unknown_field_is_rejected() {
        let yaml = "scenario: {start_time: a, end_time: b, bogus: 1}\nmodels: []\n";
        assert_eq!(field_of(yaml), "scenario.bogus");
    }

    #[test]
    fn monitor_items_must_be_strings() {
        let yaml = "scenario: {start_time: a, end_time: b}\nmodels: []\nmonitor: {items: [A.x, 4]}\n";
        assert_eq!(field_of(yaml), "monitor.items[1]");
    }

    #[test]
    fn root_must_be_mapping() {
        assert_eq!(field_of("- 1\n- 2\n"), "$");
    }
}
