use iprs_network_primitives::config::{SwarmConfig, DEFAULT_PORT};

pub const DEFAULT_LOG_DIRECTIVES: &str = "iprs=info,iprs_=info";

/// Where an advertising node listens when neither flags nor the config file
/// say otherwise.
pub fn serving_swarm() -> SwarmConfig {
    SwarmConfig::all_interfaces(DEFAULT_PORT)
}

/// Lookups only dial out.
pub const fn dialing_swarm() -> SwarmConfig {
    SwarmConfig::new(Vec::new())
}
