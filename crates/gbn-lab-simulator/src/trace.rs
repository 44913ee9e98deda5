use gbn_lab_abstract::{Entity, SimConfig};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

use crate::engine::LinkEventSummary;

/// Per-entity counters collected by the simulator.
#[derive(Debug, Clone, Default, Serialize)]
pub struct EntityStats {
    /// Payloads handed to this entity's application, in delivery order.
    pub delivered: Vec<Vec<u8>>,
    pub frames_sent: u32,
    pub data_frames_sent: u32,
    pub acks_sent: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    pub config: SimConfig,
    pub duration_ms: u64,
    /// The run hit `max_time` with events still pending.
    pub truncated: bool,
    pub entities: BTreeMap<Entity, EntityStats>,
    pub metrics: HashMap<String, Vec<(u64, f64)>>,
    pub link_events: Vec<LinkEventSummary>,
}

impl SimulationReport {
    pub fn stats(&self, entity: Entity) -> Option<&EntityStats> {
        self.entities.get(&entity)
    }

    pub fn delivered(&self, entity: Entity) -> &[Vec<u8>] {
        self.entities
            .get(&entity)
            .map(|stats| stats.delivered.as_slice())
            .unwrap_or_default()
    }
}
