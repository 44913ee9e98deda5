//! Go-Back-N reliable data transfer host.
//! Provides [`GbnHost`] and helpers to build a connected A/B pair.

pub mod host;
mod window;

pub use host::GbnHost;
pub use window::UnackedRing;

use gbn_lab_abstract::{ConfigError, Entity, HostConfig, ReliableHost};

pub fn gbn_host(entity: Entity, config: HostConfig) -> Result<Box<dyn ReliableHost>, ConfigError> {
    Ok(Box::new(GbnHost::new(entity, config)?))
}

/// Both ends of a connection sharing one configuration.
pub fn gbn_pair(
    config: HostConfig,
) -> Result<(Box<dyn ReliableHost>, Box<dyn ReliableHost>), ConfigError> {
    Ok((gbn_host(Entity::A, config)?, gbn_host(Entity::B, config)?))
}
