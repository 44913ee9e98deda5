pub mod engine;
pub mod scenario_runner;
pub mod trace;

pub use engine::{LinkEventSummary, Simulator};
pub use trace::{EntityStats, SimulationReport};
