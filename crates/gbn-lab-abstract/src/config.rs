use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("{name} must be within [0, 1], got {value}")]
    Probability { name: &'static str, value: f64 },
    #[error("min_latency ({min}) is greater than max_latency ({max})")]
    LatencyRange { min: u64, max: u64 },
    #[error("window_size must be at least 1")]
    EmptyWindow,
    #[error("timer_interval must be at least 1 ms")]
    ZeroTimer,
}

/// Channel behaviour of the simulated network.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimConfig {
    pub loss_rate: f64,
    pub corrupt_rate: f64,
    pub duplicate_rate: f64,
    pub min_latency: u64,
    pub max_latency: u64,
    pub seed: u64,
    /// Stop the simulation once the clock passes this many ms.
    pub max_time: Option<u64>,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            loss_rate: 0.0,
            corrupt_rate: 0.0,
            duplicate_rate: 0.0,
            min_latency: 10,
            max_latency: 100,
            seed: 0,
            max_time: None,
        }
    }
}

impl SimConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("loss_rate", self.loss_rate),
            ("corrupt_rate", self.corrupt_rate),
            ("duplicate_rate", self.duplicate_rate),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::Probability { name, value });
            }
        }
        if self.min_latency > self.max_latency {
            return Err(ConfigError::LatencyRange {
                min: self.min_latency,
                max: self.max_latency,
            });
        }
        Ok(())
    }
}

/// Parameters of a single GBN host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostConfig {
    pub window_size: u32,
    /// Retransmission timeout in ms.
    pub timer_interval: u64,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            window_size: 4,
            timer_interval: 1000,
        }
    }
}

impl HostConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window_size == 0 {
            return Err(ConfigError::EmptyWindow);
        }
        if self.timer_interval == 0 {
            return Err(ConfigError::ZeroTimer);
        }
        Ok(())
    }
}
