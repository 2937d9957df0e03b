//! In-process co-simulation engine.
//!
//! A [`World`] owns every started simulator, the entities they created and
//! the data links between them, and advances them in discrete time.

use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use tracing::{debug, info, warn};

use crate::config::Params;
use crate::error::{AdapterError, Error, Result};
use crate::models::registry::Registry;
use crate::models::types::{Inputs, Meta, OutputRequest, Simulator, SimulatorKind};
use crate::plan::EntityHandle;
use crate::reporting::RunSummary;

/// Operations an engine offers to the runner.
pub trait EngineAdapter {
    /// Starts a simulator named `sim_id` from an implementation reference.
    fn start(&mut self, sim_id: &str, reference: &str) -> Result<Meta>;

    /// Creates `count` entities of `model_type` in a started simulator.
    fn create(
        &mut self,
        sim_id: &str,
        model_type: &str,
        count: usize,
        params: &Params,
    ) -> Result<Vec<EntityHandle>>;

    /// Links attributes of `src` to attributes of `dest`, as `(src_attr, dest_attr)` pairs.
    fn connect(
        &mut self,
        src: &EntityHandle,
        dest: &EntityHandle,
        attrs: &[(String, String)],
    ) -> Result<()>;

    /// Runs every simulator up to, but not including, step `until`.
    fn run(&mut self, until: u64) -> Result<RunSummary>;
}

/// One started simulator.
struct SimSlot {
    sim_id: String,
    sim: Box<dyn Simulator>,
    meta: Meta,
    /// Entity id -> model type.
    entities: BTreeMap<String, String>,
    next_step: Option<u64>,
    stepped: bool,
}

impl SimSlot {
    fn adapter_err(&self, source: AdapterError) -> Error {
        Error::Adapter {
            sim: self.sim_id.clone(),
            source,
        }
    }
}

/// A data link between two entities.
#[derive(Debug, Clone)]
struct Edge {
    src: usize,
    src_eid: String,
    dest: usize,
    dest_eid: String,
    attrs: Vec<(String, String)>,
}

/// Single-threaded engine running simulators from a [`Registry`].
///
/// At each time `t` (the earliest pending self-scheduled step) the simulators
/// due at `t` are stepped in dataflow order, so every simulator sees the
/// outputs its upstream neighbours produced for the same `t`. Event-based and
/// hybrid simulators are additionally stepped whenever an upstream simulator
/// stepped at `t`.
pub struct World<'r> {
    registry: &'r Registry,
    start: NaiveDateTime,
    time_resolution: u64,
    sims: Vec<SimSlot>,
    index: BTreeMap<String, usize>,
    edges: Vec<Edge>,
}

impl<'r> World<'r> {
    pub fn new(registry: &'r Registry, start: NaiveDateTime, time_resolution: u64) -> Self {
        Self {
            registry,
            start,
            time_resolution,
            sims: Vec::new(),
            index: BTreeMap::new(),
            edges: Vec::new(),
        }
    }

    fn slot(&self, sim_id: &str) -> Result<usize> {
        self.index
            .get(sim_id)
            .copied()
            .ok_or_else(|| Error::Engine(format!("simulator `{sim_id}` was never started")))
    }

    fn entity_slot(&self, handle: &EntityHandle) -> Result<usize> {
        let idx = self.slot(&handle.sim_id)?;
        if !self.sims[idx].entities.contains_key(&handle.eid) {
            return Err(Error::Engine(format!("unknown entity `{}`", handle.full_id())));
        }
        Ok(idx)
    }

    /// Checks that `attr` is an output of `handle` (`as_input == false`) or
    /// one of its inputs.
    fn check_attr(
        &self,
        idx: usize,
        handle: &EntityHandle,
        attr: &str,
        as_input: bool,
    ) -> Result<()> {
        let slot = &self.sims[idx];
        let exposed = slot.meta.model(&handle.model_type).is_some_and(|m| {
            if as_input {
                m.has_input(attr)
            } else {
                m.has_output(attr)
            }
        });
        if exposed {
            Ok(())
        } else {
            Err(Error::UnknownAttribute {
                model: slot.sim_id.clone(),
                attr: attr.to_string(),
            })
        }
    }

    /// Simulator indices in dataflow order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CyclicDataflow`] if the links form a cycle.
    fn dataflow_order(&self) -> Result<Vec<usize>> {
        let mut graph: DiGraph<usize, ()> = DiGraph::new();
        let nodes: Vec<NodeIndex> = (0..self.sims.len()).map(|i| graph.add_node(i)).collect();
        for edge in &self.edges {
            graph.update_edge(nodes[edge.src], nodes[edge.dest], ());
        }
        toposort(&graph, None)
            .map(|order| order.into_iter().map(|n| graph[n]).collect())
            .map_err(|cycle| {
                Error::CyclicDataflow(self.sims[graph[cycle.node_id()]].sim_id.clone())
            })
    }

    /// Collects the inputs of simulator `idx` from its upstream neighbours.
    ///
    /// Only sources that have stepped are queried. With `fresh_only`, sources
    /// that did not step at the current time are skipped as well.
    fn gather_inputs(&self, idx: usize, stepped_now: &[bool], fresh_only: bool) -> Result<Inputs> {
        let mut inputs = Inputs::new();
        for edge in self.edges.iter().filter(|e| e.dest == idx) {
            let src = &self.sims[edge.src];
            if !src.stepped || (fresh_only && !stepped_now[edge.src]) {
                continue;
            }
            let mut request = OutputRequest::new();
            request.insert(
                edge.src_eid.clone(),
                edge.attrs.iter().map(|(a, _)| a.clone()).collect(),
            );
            let data = src.sim.get_data(&request).map_err(|e| src.adapter_err(e))?;
            let Some(values) = data.get(&edge.src_eid) else {
                continue;
            };

            let source_id = format!("{}.{}", src.sim_id, edge.src_eid);
            let dest = inputs.entry(edge.dest_eid.clone()).or_default();
            for (src_attr, dest_attr) in &edge.attrs {
                if let Some(value) = values.get(src_attr) {
                    dest.entry(dest_attr.clone())
                        .or_default()
                        .insert(source_id.clone(), *value);
                }
            }
        }
        Ok(inputs)
    }

    fn finalize_all(&mut self) -> Result<()> {
        let mut first_err = None;
        for slot in &mut self.sims {
            if let Err(e) = slot.sim.finalize() {
                warn!(sim = %slot.sim_id, error = %e, "finalize failed");
                if first_err.is_none() {
                    first_err = Some(Error::Adapter {
                        sim: slot.sim_id.clone(),
                        source: e,
                    });
                }
            }
        }
        first_err.map_or(Ok(()), Err)
    }
}

impl EngineAdapter for World<'_> {
    fn start(&mut self, sim_id: &str, reference: &str) -> Result<Meta> {
        if self.index.contains_key(sim_id) {
            return Err(Error::Engine(format!("simulator `{sim_id}` started twice")));
        }
        let mut sim = self.registry.instantiate(reference)?;
        let meta = sim
            .init(sim_id, self.time_resolution)
            .map_err(|source| Error::Adapter {
                sim: sim_id.to_string(),
                source,
            })?;
        let next_step = match meta.kind {
            SimulatorKind::EventBased => None,
            SimulatorKind::TimeBased | SimulatorKind::Hybrid => Some(0),
        };
        debug!(sim = sim_id, reference, kind = ?meta.kind, "started simulator");

        self.index.insert(sim_id.to_string(), self.sims.len());
        self.sims.push(SimSlot {
            sim_id: sim_id.to_string(),
            sim,
            meta,
            entities: BTreeMap::new(),
            next_step,
            stepped: false,
        });
        Ok(meta)
    }

    fn create(
        &mut self,
        sim_id: &str,
        model_type: &str,
        count: usize,
        params: &Params,
    ) -> Result<Vec<EntityHandle>> {
        let idx = self.slot(sim_id)?;
        let start = self.start;
        let slot = &mut self.sims[idx];
        let created = slot
            .sim
            .create(count, model_type, start, params)
            .map_err(|source| Error::Adapter {
                sim: sim_id.to_string(),
                source,
            })?;

        let mut handles = Vec::with_capacity(created.len());
        for entity in created {
            slot.entities
                .insert(entity.eid.clone(), entity.model_type.clone());
            handles.push(EntityHandle {
                sim_id: sim_id.to_string(),
                eid: entity.eid,
                model_type: entity.model_type,
            });
        }
        debug!(sim = sim_id, model_type, count = handles.len(), "created entities");
        Ok(handles)
    }

    fn connect(
        &mut self,
        src: &EntityHandle,
        dest: &EntityHandle,
        attrs: &[(String, String)],
    ) -> Result<()> {
        let src_idx = self.entity_slot(src)?;
        let dest_idx = self.entity_slot(dest)?;
        if src_idx == dest_idx {
            return Err(Error::CyclicDataflow(src.sim_id.clone()));
        }
        for (src_attr, dest_attr) in attrs {
            self.check_attr(src_idx, src, src_attr, false)?;
            self.check_attr(dest_idx, dest, dest_attr, true)?;
        }

        debug!(from = %src.full_id(), to = %dest.full_id(), ?attrs, "connected");
        self.edges.push(Edge {
            src: src_idx,
            src_eid: src.eid.clone(),
            dest: dest_idx,
            dest_eid: dest.eid.clone(),
            attrs: attrs.to_vec(),
        });
        Ok(())
    }

    fn run(&mut self, until: u64) -> Result<RunSummary> {
        let order = self.dataflow_order()?;
        info!(simulators = self.sims.len(), until, "starting run");

        let mut summary = RunSummary {
            until,
            simulators: self.sims.len(),
            ..RunSummary::default()
        };

        while let Some(t) = self
            .sims
            .iter()
            .filter_map(|s| s.next_step)
            .filter(|&n| n < until)
            .min()
        {
            let mut stepped_now = vec![false; self.sims.len()];
            for &idx in &order {
                let slot = &self.sims[idx];
                let due = slot.next_step == Some(t);
                let reactive = slot.meta.kind != SimulatorKind::TimeBased
                    && self
                        .edges
                        .iter()
                        .any(|e| e.dest == idx && stepped_now[e.src]);
                if !due && !reactive {
                    continue;
                }

                let event_based = slot.meta.kind == SimulatorKind::EventBased;
                let inputs = self.gather_inputs(idx, &stepped_now, event_based)?;

                let slot = &mut self.sims[idx];
                let next = slot
                    .sim
                    .step(t, &inputs, until)
                    .map_err(|e| slot.adapter_err(e))?;
                match next {
                    Some(n) if n <= t => {
                        return Err(Error::Engine(format!(
                            "simulator `{}` asked to be stepped at {n}, which is not after {t}",
                            slot.sim_id
                        )));
                    }
                    // a reactive step must not drop a pending self-scheduled time
                    None if !due && slot.next_step.is_some_and(|p| p > t) => {}
                    _ => slot.next_step = next,
                }
                slot.stepped = true;
                stepped_now[idx] = true;
                summary.sim_steps += 1;
            }
            summary.last_time = Some(t);
        }

        self.finalize_all()?;
        info!(
            sim_steps = summary.sim_steps,
            last_time = ?summary.last_time,
            "run finished"
        );
        Ok(summary)
    }
}
