//! Lookup table from scenario type tags to model adapter implementations.

use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::models::types::{Meta, Simulator};
use crate::models::{adder, battery, collector, csv_reader, electrolyser, load, pv};

/// Namespace prefixed to every built-in implementation reference.
pub const IMPLEMENTATION_NAMESPACE: &str = "illuminator.models";

/// Type tag of the built-in results collector.
pub const COLLECTOR_TYPE: &str = "Collector";

/// Creates a fresh, uninitialized simulator.
pub type Factory = fn() -> Box<dyn Simulator>;

/// A registered implementation.
#[derive(Debug, Clone, Copy)]
pub struct RegistryEntry {
    /// Capability descriptor, known before the simulator is started.
    pub meta: Meta,
    pub factory: Factory,
}

/// Maps implementation references (`<namespace>:<type>`) to implementations.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    entries: BTreeMap<String, RegistryEntry>,
}

impl Registry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding every model shipped with the crate.
    pub fn with_builtin_models() -> Self {
        let mut registry = Self::new();
        registry.register("Adder", adder::META, || Box::new(adder::Adder::new()));
        registry.register("Battery", battery::META, || Box::new(battery::Battery::new()));
        registry.register("CSV", csv_reader::META, || {
            Box::new(csv_reader::CsvReader::new())
        });
        registry.register(COLLECTOR_TYPE, collector::META, || {
            Box::new(collector::Collector::new())
        });
        registry.register("Electrolyser", electrolyser::META, || {
            Box::new(electrolyser::Electrolyser::new())
        });
        registry.register("Load", load::META, || Box::new(load::Load::new()));
        registry.register("PV", pv::META, || Box::new(pv::Pv::new()));
        registry
    }

    /// Registers `type_tag` under the crate namespace, replacing any earlier entry.
    pub fn register(&mut self, type_tag: &str, meta: Meta, factory: Factory) {
        self.entries
            .insert(reference_for(type_tag), RegistryEntry { meta, factory });
    }

    /// Resolves a type tag to its implementation reference.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownModelType`] if nothing is registered for `type_tag`.
    pub fn reference_for(&self, type_tag: &str) -> Result<String> {
        let reference = reference_for(type_tag);
        self.resolve(&reference)?;
        Ok(reference)
    }

    /// Looks up a registered implementation by reference.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownModelType`] listing the registered references.
    pub fn resolve(&self, reference: &str) -> Result<&RegistryEntry> {
        self.entries
            .get(reference)
            .ok_or_else(|| Error::UnknownModelType {
                name: reference.to_string(),
                available: self.available(),
            })
    }

    /// Creates an uninitialized simulator for `reference`.
    pub fn instantiate(&self, reference: &str) -> Result<Box<dyn Simulator>> {
        Ok((self.resolve(reference)?.factory)())
    }

    /// Registered references in sorted order.
    pub fn references(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    fn available(&self) -> String {
        self.references().collect::<Vec<_>>().join(", ")
    }
}

/// Builds the implementation reference for a type tag.
///
/// ```
/// assert_eq!(
///     illuminator::models::registry::reference_for("Adder"),
///     "illuminator.models:Adder"
/// );
/// ```
pub fn reference_for(type_tag: &str) -> String {
    format!("{IMPLEMENTATION_NAMESPACE}:{type_tag}")
}
