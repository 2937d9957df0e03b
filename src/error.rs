//! Error types for scenario loading, plan compilation, and execution.

use std::path::PathBuf;

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors raised while turning a scenario into a plan or running that plan.
///
/// Every variant is terminal: nothing in the crate retries, and no partial
/// plan is ever returned alongside an error.
#[derive(Debug, Error)]
pub enum Error {
    /// The scenario file could not be read.
    #[error("cannot read \"{}\": {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The scenario file is not a parseable YAML/TOML document.
    #[error("config format error: {0}")]
    ConfigFormat(String),

    /// The document is structurally invalid.
    #[error("schema validation error at `{field}`: {message}")]
    SchemaValidation { field: String, message: String },

    /// A connection or monitor item names a model that is not declared.
    #[error("unknown model `{model}` referenced at `{field}`")]
    UnknownModelReference { model: String, field: String },

    /// A `<model>.<attribute>` string does not split into exactly two tokens.
    #[error("malformed reference \"{value}\" at `{field}`: expected `<model>.<attribute>`")]
    MalformedConnection { value: String, field: String },

    /// The scenario window does not produce a valid step count.
    #[error("invalid time range: {0}")]
    InvalidTimeRange(String),

    /// A model's parameters do not match what its implementation accepts.
    #[error("model `{model}` ({model_type}): {reason}")]
    UnsupportedModelParameters {
        model: String,
        model_type: String,
        reason: String,
    },

    /// No implementation is registered for a type tag or reference.
    #[error("unknown model type `{name}` (available: {available})")]
    UnknownModelType { name: String, available: String },

    /// An attribute is not exposed by the model it is attached to.
    #[error("model `{model}` has no attribute `{attr}`")]
    UnknownAttribute { model: String, attr: String },

    /// The dataflow between simulators contains a cycle.
    #[error("cyclic dataflow through simulator `{0}`")]
    CyclicDataflow(String),

    /// The engine detected a violation of the scheduling contract.
    #[error("engine error: {0}")]
    Engine(String),

    /// A model adapter failed during a lifecycle call.
    #[error("simulator `{sim}` failed: {source}")]
    Adapter {
        sim: String,
        #[source]
        source: AdapterError,
    },

    #[error("cannot serialize execution plan: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn schema(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SchemaValidation {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Errors raised by model adapters from inside `init`/`create`/`step`/`get_data`.
#[derive(Debug, Error, PartialEq)]
pub enum AdapterError {
    #[error("simulator used before init()")]
    NotInitialized,

    #[error("model type `{0}` is not a public model of this simulator")]
    UnknownModel(String),

    #[error("missing parameter `{0}`")]
    MissingParameter(String),

    #[error("invalid parameter `{name}`: {message}")]
    InvalidParameter { name: String, message: String },

    #[error("unknown entity `{0}`")]
    UnknownEntity(String),

    #[error("entity `{eid}` has no attribute `{attr}`")]
    UnknownAttribute { eid: String, attr: String },

    /// `get_data` was called for an attribute before any step cached it.
    #[error("attribute `{attr}` of entity `{eid}` has no value yet")]
    NoData { eid: String, attr: String },

    #[error("{count} values delivered to single-valued input `{attr}` of entity `{eid}`")]
    MultipleInputValues {
        eid: String,
        attr: String,
        count: usize,
    },

    #[error("data file error: {0}")]
    DataFile(String),

    #[error("i/o error: {0}")]
    Io(String),
}
