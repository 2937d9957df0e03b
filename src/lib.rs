//! Scenario-driven co-simulation of energy systems.
//!
//! A YAML scenario is loaded and validated ([`config`]), compiled into an
//! [`plan::ExecutionPlan`] against the model [`models::Registry`], and run by
//! the in-process engine in [`sim::world`] through [`runner::execute`].

pub mod cli;
pub mod config;
pub mod error;
pub mod io;
pub mod models;
pub mod plan;
pub mod reporting;
pub mod runner;
mod schema;
/// Simulation clock and engine.
pub mod sim;

pub use config::{ScenarioConfig, apply_defaults, load};
pub use error::{AdapterError, Error, Result};
pub use plan::{Compiler, ExecutionPlan, compile};
