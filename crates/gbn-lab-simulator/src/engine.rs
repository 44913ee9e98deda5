use crate::trace::{EntityStats, SimulationReport};
use anyhow::{Result, ensure};
use bytes::Bytes;
use gbn_lab_abstract::{Entity, NetworkContext, Packet, ReliableHost, SimConfig};
use rand::Rng;
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BinaryHeap, HashMap};
use tracing::{debug, info, warn};

#[derive(Debug)]
pub enum EventType {
    FrameArrival { to: Entity, frame: Bytes },
    TimerExpiry { entity: Entity, generation: u64 },
    AppSend { entity: Entity, data: Bytes },
}

#[derive(Debug)]
struct Event {
    time: u64,
    event_type: EventType,
    id: u64, // Unique ID to differentiate events at same time
}

// Custom Ord for Min-Heap (smallest time pops first)
impl PartialEq for Event {
    fn eq(&self, other: &Self) -> bool {
        self.time == other.time && self.id == other.id
    }
}

impl Eq for Event {}

impl PartialOrd for Event {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Event {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse comparison for time: smallest time is Greater in BinaryHeap
        other
            .time
            .cmp(&self.time)
            .then_with(|| other.id.cmp(&self.id))
    }
}

/// A compact textual summary of important link-layer events.
#[derive(Debug, Clone, Serialize)]
pub struct LinkEventSummary {
    pub time: u64,
    pub description: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TimerAction {
    Start(u64),
    Stop,
}

/// Actions buffered during a host call, applied once it returns.
#[derive(Default)]
struct ActionBuffer {
    outgoing_frames: Vec<Bytes>,
    timer_actions: Vec<TimerAction>,
    logs: Vec<String>,
    delivered_data: Vec<Bytes>,
    metrics: Vec<(String, f64)>,
}

/// Context implementation passed to a host for the duration of one call.
struct ScopedContext<'a> {
    entity: Entity,
    buffer: &'a mut ActionBuffer,
    now: u64,
}

impl ScopedContext<'_> {
    fn check_entity(&self, entity: Entity) {
        if entity != self.entity {
            warn!(
                "host {:?} issued a call on behalf of {:?}; attributing it to {:?}",
                self.entity, entity, self.entity
            );
        }
    }
}

impl NetworkContext for ScopedContext<'_> {
    fn pass_to_application_layer(&mut self, entity: Entity, payload: Bytes) {
        self.check_entity(entity);
        self.buffer.delivered_data.push(payload);
    }

    fn pass_to_network_layer(&mut self, entity: Entity, frame: Bytes) {
        self.check_entity(entity);
        self.buffer.outgoing_frames.push(frame);
    }

    fn start_timer(&mut self, entity: Entity, interval_ms: u64) {
        self.check_entity(entity);
        self.buffer.timer_actions.push(TimerAction::Start(interval_ms));
    }

    fn stop_timer(&mut self, entity: Entity) {
        self.check_entity(entity);
        self.buffer.timer_actions.push(TimerAction::Stop);
    }

    fn log(&mut self, message: &str) {
        self.buffer.logs.push(message.to_string());
    }

    fn now(&self) -> u64 {
        self.now
    }

    fn record_metric(&mut self, name: &str, value: f64) {
        self.buffer.metrics.push((name.to_string(), value));
    }
}

/// The single retransmission timer of one entity.
/// Bumping `generation` invalidates any expiry already queued.
#[derive(Debug, Default, Clone, Copy)]
struct TimerSlot {
    generation: u64,
    armed: bool,
}

pub struct Simulator {
    time: u64,
    event_queue: BinaryHeap<Event>,
    event_id_counter: u64,
    truncated: bool,

    config: SimConfig,
    rng: rand::rngs::StdRng,

    pub host_a: Box<dyn ReliableHost>,
    pub host_b: Box<dyn ReliableHost>,

    pub stats: BTreeMap<Entity, EntityStats>,

    /// Time series recorded via `NetworkContext::record_metric`.
    /// Key: "<entity>.<metric>" (e.g. "A.window_base"), Value: Vec<(time_ms, value)>
    pub metrics: HashMap<String, Vec<(u64, f64)>>,

    // Deterministic fault injection: drop first data frame from entity with given seq
    drop_data_once: Vec<(Entity, u32)>,
    // Deterministic fault injection: drop first ACK from entity with given ack number
    drop_ack_once: Vec<(Entity, u32)>,

    /// Timeline of link events (drops, corruptions, sends, deliveries).
    pub link_events: Vec<LinkEventSummary>,

    timers: HashMap<Entity, TimerSlot>,
}

impl Simulator {
    pub fn new(
        config: SimConfig,
        host_a: Box<dyn ReliableHost>,
        host_b: Box<dyn ReliableHost>,
    ) -> Result<Self> {
        use rand::SeedableRng;
        config.validate()?;
        ensure!(
            host_a.entity() == Entity::A && host_b.entity() == Entity::B,
            "hosts must be given in A, B order (got {:?}, {:?})",
            host_a.entity(),
            host_b.entity()
        );
        let rng = rand::rngs::StdRng::seed_from_u64(config.seed);

        Ok(Self {
            time: 0,
            event_queue: BinaryHeap::new(),
            event_id_counter: 0,
            truncated: false,
            config,
            rng,
            host_a,
            host_b,
            stats: BTreeMap::from([
                (Entity::A, EntityStats::default()),
                (Entity::B, EntityStats::default()),
            ]),
            metrics: HashMap::new(),
            drop_data_once: Vec::new(),
            drop_ack_once: Vec::new(),
            link_events: Vec::new(),
            timers: HashMap::new(),
        })
    }

    /// Register a deterministic fault: drop the first data frame `entity` sends with `seq`.
    pub fn add_drop_data_once(&mut self, entity: Entity, seq: u32) {
        self.drop_data_once.push((entity, seq));
    }

    /// Register a deterministic fault: drop the first ACK `entity` sends for `ack`.
    pub fn add_drop_ack_once(&mut self, entity: Entity, ack: u32) {
        self.drop_ack_once.push((entity, ack));
    }

    /// Return a slice of (time_ms, value) samples for a named metric, if present.
    pub fn metric_series(&self, name: &str) -> Option<&[(u64, f64)]> {
        self.metrics.get(name).map(|v| v.as_slice())
    }

    pub fn delivered(&self, entity: Entity) -> &[Vec<u8>] {
        self.stats
            .get(&entity)
            .map(|stats| stats.delivered.as_slice())
            .unwrap_or_default()
    }

    fn push_event(&mut self, time: u64, event_type: EventType) {
        self.event_queue.push(Event {
            time,
            event_type,
            id: self.event_id_counter,
        });
        self.event_id_counter += 1;
    }

    pub fn schedule_app_send(&mut self, time: u64, entity: Entity, data: impl Into<Bytes>) {
        self.push_event(
            time,
            EventType::AppSend {
                entity,
                data: data.into(),
            },
        );
    }

    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    /// Process the next event. Returns true if an event was processed, false
    /// if the queue is empty or `max_time` has been reached.
    pub fn step(&mut self) -> bool {
        let event = match self.event_queue.pop() {
            Some(e) => e,
            None => return false,
        };

        // Check if a timer event is still current by comparing generations
        if let EventType::TimerExpiry { entity, generation } = &event.event_type {
            let slot = self.timers.entry(*entity).or_default();
            if !slot.armed || slot.generation != *generation {
                debug!("Skipping stale timer event for {:?}", entity);
                return true; // Event processed (by being ignored)
            }
        }

        if let Some(limit) = self.config.max_time
            && event.time > limit
        {
            debug!(
                "Stopping at max_time={} with {} events pending",
                limit,
                self.event_queue.len() + 1
            );
            self.event_queue.clear();
            self.truncated = true;
            return false;
        }

        self.time = event.time;
        debug!("Processing event at {}: {:?}", self.time, event.event_type);

        match event.event_type {
            EventType::FrameArrival { to, frame } => {
                self.dispatch(to, |host, ctx| host.receive_from_network_layer(ctx, frame));
            }
            EventType::TimerExpiry { entity, .. } => {
                self.timers.entry(entity).or_default().armed = false;
                self.dispatch(entity, |host, ctx| host.timer_interrupt(ctx));
            }
            EventType::AppSend { entity, data } => {
                self.dispatch(entity, |host, ctx| {
                    host.receive_from_application_layer(ctx, data)
                });
            }
        }
        true
    }

    fn dispatch(
        &mut self,
        entity: Entity,
        call: impl FnOnce(&mut dyn ReliableHost, &mut dyn NetworkContext),
    ) {
        let mut buffer = ActionBuffer::default();
        {
            let mut ctx = ScopedContext {
                entity,
                buffer: &mut buffer,
                now: self.time,
            };
            let host = match entity {
                Entity::A => self.host_a.as_mut(),
                Entity::B => self.host_b.as_mut(),
            };
            call(host, &mut ctx);
        }
        self.process_actions(entity, buffer);
    }

    /// Produce a serializable snapshot of the current simulation state.
    pub fn export_report(&self) -> SimulationReport {
        SimulationReport {
            config: self.config.clone(),
            duration_ms: self.time,
            truncated: self.truncated,
            entities: self.stats.clone(),
            metrics: self.metrics.clone(),
            link_events: self.link_events.clone(),
        }
    }

    pub fn run_until_complete(&mut self) {
        while self.step() {}
    }

    fn link_event(&mut self, description: String) {
        self.link_events.push(LinkEventSummary {
            time: self.time,
            description,
        });
    }

    fn apply_timer_action(&mut self, entity: Entity, action: TimerAction) {
        let slot = self.timers.entry(entity).or_default();
        match action {
            TimerAction::Start(delay) => {
                if slot.armed {
                    warn!("[{:?}] start_timer while timer running; resetting", entity);
                }
                slot.generation += 1;
                slot.armed = true;
                let generation = slot.generation;
                self.push_event(
                    self.time + delay,
                    EventType::TimerExpiry { entity, generation },
                );
            }
            TimerAction::Stop => {
                if slot.armed {
                    slot.generation += 1;
                    slot.armed = false;
                }
            }
        }
    }

    fn process_actions(&mut self, source: Entity, buffer: ActionBuffer) {
        // First, fold metrics into simulator-wide store
        for (name, value) in buffer.metrics {
            self.metrics
                .entry(format!("{source:?}.{name}"))
                .or_default()
                .push((self.time, value));
        }

        for log in buffer.logs {
            info!("[{:?}] {}", source, log);
        }

        for data in buffer.delivered_data {
            info!("[{:?}] DELIVERED DATA: {} bytes", source, data.len());
            self.link_event(format!(
                "[{:?}] DELIVERED {} bytes to application",
                source,
                data.len()
            ));
            self.stats
                .entry(source)
                .or_default()
                .delivered
                .push(data.to_vec());
        }

        for action in buffer.timer_actions {
            self.apply_timer_action(source, action);
        }

        for frame in buffer.outgoing_frames {
            self.transmit(source, frame);
        }
    }

    /// Channel model: deterministic drops, then random loss, corruption,
    /// duplication and latency.
    fn transmit(&mut self, source: Entity, mut frame: Bytes) {
        let target = source.peer();
        let packet = Packet::decode(&frame).ok();
        let label = match &packet {
            Some(Packet::Data { seq_num, .. }) => format!("DATA seq={seq_num}"),
            Some(Packet::Ack { seq_num, .. }) => format!("ACK ack={seq_num}"),
            None => format!("FRAME len={}", frame.len()),
        };

        let stats = self.stats.entry(source).or_default();
        stats.frames_sent += 1;
        match &packet {
            Some(Packet::Data { .. }) => stats.data_frames_sent += 1,
            Some(Packet::Ack { .. }) => stats.acks_sent += 1,
            None => {}
        }

        let rule = match &packet {
            Some(Packet::Data { seq_num, .. }) => self
                .drop_data_once
                .iter()
                .position(|&(entity, seq)| entity == source && seq == *seq_num)
                .map(|pos| self.drop_data_once.remove(pos)),
            Some(Packet::Ack { seq_num, .. }) => self
                .drop_ack_once
                .iter()
                .position(|&(entity, ack)| entity == source && ack == *seq_num)
                .map(|pos| self.drop_ack_once.remove(pos)),
            None => None,
        };
        if rule.is_some() {
            self.link_event(format!(
                "[{source:?}->{target:?}] DROP (deterministic) {label}"
            ));
            debug!("Deterministically dropping {} from {:?}", label, source);
            return;
        }

        // 1. Check Loss
        if self.rng.random::<f64>() < self.config.loss_rate {
            self.link_event(format!("[{source:?}->{target:?}] DROP (random loss) {label}"));
            debug!("Frame lost in channel");
            return;
        }

        // 2. Check Corruption
        if self.rng.random::<f64>() < self.config.corrupt_rate && !frame.is_empty() {
            let index = self.rng.random_range(0..frame.len());
            let mask: u8 = self.rng.random_range(1..=u8::MAX);
            let mut raw = frame.to_vec();
            raw[index] ^= mask;
            frame = Bytes::from(raw);
            self.link_event(format!(
                "[{source:?}->{target:?}] CORRUPT {label} (byte {index} ^ {mask:#04x})"
            ));
            debug!("Frame corrupted in channel");
        }

        // 3. Check Duplication
        let copies = if self.rng.random::<f64>() < self.config.duplicate_rate {
            self.link_event(format!("[{source:?}->{target:?}] DUP {label}"));
            2
        } else {
            1
        };

        // 4. Latency per copy, which also reorders frames
        for _ in 0..copies {
            let latency = self
                .rng
                .random_range(self.config.min_latency..=self.config.max_latency);
            self.link_event(format!(
                "[{source:?}->{target:?}] SEND {label} (latency={latency}ms)"
            ));
            self.push_event(
                self.time + latency,
                EventType::FrameArrival {
                    to: target,
                    frame: frame.clone(),
                },
            );
        }
    }
}
