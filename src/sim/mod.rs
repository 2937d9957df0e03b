/// Mapping between timestamps and simulation steps.
pub mod clock;
/// In-process engine driving the model adapters.
pub mod world;

pub use clock::SimClock;
pub use world::{EngineAdapter, World};
