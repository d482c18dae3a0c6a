//! Deterministic, seeded test bed for the transfer engines.

pub mod engine;
pub mod link;
pub mod scenario_runner;
pub mod trace;

pub use engine::{Simulation, SimulationOutcome};
pub use link::{LinkCounters, LinkEventSummary, NodeId, SimEndpoint, SimLink};
pub use trace::SimulationReport;
