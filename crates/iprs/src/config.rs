use std::fs::read_to_string;

use camino::Utf8Path;
use eyre::{Result as EyreResult, WrapErr};
use iprs_network_primitives::config::{BootstrapConfig, DiscoveryConfig, SwarmConfig};
use iprs_node::LookupConfig;
use serde::{Deserialize, Serialize};

/// Optional TOML file behind `--config`. Every section may be left out.
#[derive(Debug, Default, Deserialize, Serialize)]
#[non_exhaustive]
pub struct ConfigFile {
    /// Falls back to a per-command default when absent.
    #[serde(default)]
    pub swarm: Option<SwarmConfig>,

    #[serde(default)]
    pub bootstrap: BootstrapConfig,

    #[serde(default)]
    pub discovery: DiscoveryConfig,

    #[serde(default)]
    pub lookup: LookupConfig,
}

impl ConfigFile {
    pub fn load(path: &Utf8Path) -> EyreResult<Self> {
        let content = read_to_string(path)
            .wrap_err_with(|| format!("failed to read configuration from {path:?}"))?;

        toml::from_str(&content)
            .wrap_err_with(|| format!("failed to parse configuration from {path:?}"))
    }
}
