use crate::config::{HostConfig, SimConfig};
use crate::interface::Entity;
use serde::Deserialize;

#[derive(Deserialize, Debug, Clone)]
pub struct TestScenario {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub config: SimConfigOverride,
    #[serde(default)]
    pub host: HostConfigOverride,
    pub actions: Vec<TestAction>,
    #[serde(default)]
    pub assertions: Vec<TestAssertion>,
}

impl TestScenario {
    /// Default channel settings with this scenario's overrides applied.
    pub fn sim_config(&self) -> SimConfig {
        let mut config = SimConfig::default();
        self.config.apply_to(&mut config);
        config
    }

    /// Default host settings with this scenario's overrides applied.
    pub fn host_config(&self) -> HostConfig {
        let mut config = HostConfig::default();
        self.host.apply_to(&mut config);
        config
    }
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct SimConfigOverride {
    pub loss_rate: Option<f64>,
    pub corrupt_rate: Option<f64>,
    pub duplicate_rate: Option<f64>,
    pub min_latency: Option<u64>,
    pub max_latency: Option<u64>,
    pub seed: Option<u64>,
    pub max_time: Option<u64>,
}

impl SimConfigOverride {
    pub fn apply_to(&self, config: &mut SimConfig) {
        if let Some(v) = self.loss_rate {
            config.loss_rate = v;
        }
        if let Some(v) = self.corrupt_rate {
            config.corrupt_rate = v;
        }
        if let Some(v) = self.duplicate_rate {
            config.duplicate_rate = v;
        }
        if let Some(v) = self.min_latency {
            config.min_latency = v;
        }
        if let Some(v) = self.max_latency {
            config.max_latency = v;
        }
        if let Some(v) = self.seed {
            config.seed = v;
        }
        if let Some(v) = self.max_time {
            config.max_time = Some(v);
        }
    }
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct HostConfigOverride {
    pub window_size: Option<u32>,
    pub timer_interval: Option<u64>,
}

impl HostConfigOverride {
    pub fn apply_to(&self, config: &mut HostConfig) {
        if let Some(v) = self.window_size {
            config.window_size = v;
        }
        if let Some(v) = self.timer_interval {
            config.timer_interval = v;
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TestAction {
    /// The application on `entity` sends data at a specific time
    AppSend {
        time: u64,
        entity: Entity,
        data: String,
    },
    /// Deterministically drop the first data frame sent by `entity` with given seq number
    DropNextData { entity: Entity, seq: u32 },
    /// Deterministically drop the first ACK sent by `entity` with given ack number
    DropNextAck { entity: Entity, ack: u32 },
}

#[derive(Deserialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TestAssertion {
    /// Assert that specific data was delivered to the application on `entity`
    DataDelivered { entity: Entity, data: String },
    /// Assert that `entity` received exactly these messages, in this order
    DeliveredInOrder {
        entity: Entity,
        messages: Vec<String>,
    },
    /// Assert that the total number of frames sent by `entity` is within range
    PacketCount {
        entity: Entity,
        min: u32,
        max: Option<u32>,
    },
    /// Assert that simulation finishes within time
    MaxDuration { ms: u64 },
}
