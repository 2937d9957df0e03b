//! Model adapters driven by the engine, and the registry that names them.

/// Example model adding two inputs.
pub mod adder;
/// Battery storage with state-of-charge tracking.
pub mod battery;
/// Results collector writing the monitored attributes to CSV.
pub mod collector;
/// Time series replay from CSV data files.
pub mod csv_reader;
/// Hydrogen electrolyser stack.
pub mod electrolyser;
/// Household demand profile.
pub mod load;
/// Photovoltaic generation.
pub mod pv;
pub mod registry;
pub mod types;

pub use registry::{IMPLEMENTATION_NAMESPACE, Registry};
pub use types::{EntityDescriptor, Meta, ModelMeta, Simulator, SimulatorKind};
