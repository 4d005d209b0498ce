mod file;

use std::path::PathBuf;
use std::time::Duration;

use ipnetwork::IpNetwork;

use crate::error::ConfigError;
use crate::keys::KeyLayout;

/// Values given on the command line (or their environment variables),
/// taking precedence over the config file
#[derive(Debug, Default)]
pub struct Overrides {
    pub node_name: Option<String>,
    pub poll_interval: Option<u16>,
}

/// Parse a TOML config file and return a ServerConfig
pub fn from_file(path: &str, overrides: Overrides) -> Result<ServerConfig, ConfigError> {
    let spec = file::ServerConfigSpec::from_file(path)?;
    ServerConfig::from_spec(spec, overrides)
}

#[derive(Debug)]
pub struct ServerConfig {
    pub node_name: String,
    pub address_block: IpNetwork,
    pub poll_interval: u16,
    pub pool_poll_interval: u16,
    pub layout: KeyLayout,
    pub peering_path: PathBuf,
    pub pools_path: PathBuf,
}

impl ServerConfig {
    fn from_spec(spec: file::ServerConfigSpec, overrides: Overrides) -> Result<Self, ConfigError> {
        let node_name = overrides
            .node_name
            .or(spec.node_name)
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty())
            .ok_or_else(|| ConfigError::Invalid("node_name is required".to_string()))?;
        if node_name.contains('/') {
            return Err(ConfigError::Invalid(format!(
                "node_name '{}' may not contain '/'",
                node_name
            )));
        }
        let poll_interval = overrides.poll_interval.unwrap_or(spec.poll_interval);
        let pool_poll_interval = spec.pool_poll_interval.unwrap_or(poll_interval);
        if poll_interval == 0 || pool_poll_interval == 0 {
            return Err(ConfigError::Invalid(
                "Poll intervals must be at least 1 second".to_string(),
            ));
        }

        Ok(Self {
            node_name,
            address_block: spec.address_block,
            poll_interval,
            pool_poll_interval,
            layout: KeyLayout::new(&spec.layout.global_prefix, &spec.layout.nodes_prefix),
            peering_path: spec.source.peering_path,
            pools_path: spec.source.pools_path,
        })
    }

    pub fn poll_period(&self) -> Duration {
        Duration::from_secs(self.poll_interval.into())
    }

    pub fn pool_poll_period(&self) -> Duration {
        Duration::from_secs(self.pool_poll_interval.into())
    }
}
