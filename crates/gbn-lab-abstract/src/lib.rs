pub mod config;
pub mod interface;
pub mod packet;
pub mod scenario;

pub use interface::{Entity, NetworkContext, ReliableHost};
pub use packet::{DecodeError, NO_ACK, Packet, PacketType};

pub use config::{ConfigError, HostConfig, SimConfig};
pub use scenario::{HostConfigOverride, SimConfigOverride, TestAction, TestAssertion, TestScenario};
