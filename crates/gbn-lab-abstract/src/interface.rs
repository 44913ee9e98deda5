use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// One side of the simulated connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Entity {
    A,
    B,
}

impl Entity {
    pub fn peer(&self) -> Self {
        match self {
            Entity::A => Entity::B,
            Entity::B => Entity::A,
        }
    }
}

/// The capability provided by the network/timer simulator to a host.
/// Every call names the calling entity so one simulator can serve both sides.
pub trait NetworkContext {
    /// Hand in-order application data up to the local application.
    fn pass_to_application_layer(&mut self, entity: Entity, payload: Bytes);

    /// Put a frame on the simulated wire. It may be lost, corrupted,
    /// duplicated or reordered before the peer sees it.
    fn pass_to_network_layer(&mut self, entity: Entity, frame: Bytes);

    /// Arm the entity's single retransmission timer.
    /// Starting an armed timer resets it; the remaining time is not preserved.
    fn start_timer(&mut self, entity: Entity, interval_ms: u64);

    /// Disarm the entity's timer. No-op when it is not running.
    fn stop_timer(&mut self, entity: Entity);

    /// Log a message to the simulator's debug output.
    fn log(&mut self, message: &str);

    /// Get current simulation time in ms
    fn now(&self) -> u64;

    /// Record a numeric metric (e.g. window base) for the trace report.
    fn record_metric(&mut self, _name: &str, _value: f64) {
        // Default no-op so non-recording contexts don't need to care.
    }
}

/// The interface a reliable-transfer host exposes to the simulator.
pub trait ReliableHost {
    /// Which side of the connection this host plays.
    fn entity(&self) -> Entity;

    /// Called when the application wants `payload` sent reliably.
    fn receive_from_application_layer(&mut self, ctx: &mut dyn NetworkContext, payload: Bytes);

    /// Called when a frame arrives from the network. The frame may be corrupt.
    fn receive_from_network_layer(&mut self, ctx: &mut dyn NetworkContext, frame: Bytes);

    /// Called when this host's retransmission timer expires.
    fn timer_interrupt(&mut self, ctx: &mut dyn NetworkContext);
}
