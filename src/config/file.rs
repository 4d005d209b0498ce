use std::fs::File;
use std::io::Read;
use std::path::PathBuf;

use ipnetwork::IpNetwork;
use serde::Deserialize;

use crate::error::ConfigError;
use crate::keys::KeyLayout;

struct Defaults {}

impl Defaults {
    fn poll_interval() -> u16 {
        5
    }

    fn peering_path() -> PathBuf {
        PathBuf::from("/var/lib/bgpd-sync/peering.json")
    }

    fn pools_path() -> PathBuf {
        PathBuf::from("/var/lib/bgpd-sync/pools.json")
    }
}

/// Config (toml) representation of the snapshot files
#[derive(Clone, Debug, Deserialize)]
pub(super) struct SourceConfigSpec {
    #[serde(default = "Defaults::peering_path")]
    pub(super) peering_path: PathBuf,
    #[serde(default = "Defaults::pools_path")]
    pub(super) pools_path: PathBuf,
}

impl Default for SourceConfigSpec {
    fn default() -> Self {
        Self {
            peering_path: Defaults::peering_path(),
            pools_path: Defaults::pools_path(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct ServerConfigSpec {
    // May also come from the command line
    pub(super) node_name: Option<String>,
    // Block advertised for this node's workloads
    pub(super) address_block: IpNetwork,
    // Seconds between peering config polls
    #[serde(default = "Defaults::poll_interval")]
    pub(super) poll_interval: u16,
    // Defaults to poll_interval
    pub(super) pool_poll_interval: Option<u16>,
    #[serde(default)]
    pub(super) layout: KeyLayout,
    #[serde(default)]
    pub(super) source: SourceConfigSpec,
}

impl ServerConfigSpec {
    pub(super) fn from_file(path: &str) -> Result<Self, ConfigError> {
        let mut contents = String::new();
        File::open(path)
            .and_then(|mut file| file.read_to_string(&mut contents))
            .map_err(|source| ConfigError::Io {
                path: path.to_string(),
                source,
            })?;
        let config: ServerConfigSpec =
            toml::from_str(&contents).map_err(|source| ConfigError::Parse {
                path: path.to_string(),
                source,
            })?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config() {
        let config = ServerConfigSpec::from_file("./demos/config.toml").unwrap();
        assert_eq!(config.node_name.as_deref(), Some("n0"));
        assert_eq!(config.address_block, "10.244.0.0/24".parse::<IpNetwork>().unwrap());
        assert_eq!(config.poll_interval, 5);
        assert_eq!(config.pool_poll_interval, Some(10));
        assert_eq!(config.layout.global_prefix, "/calico/bgp/v1/global");
        assert_eq!(config.source.pools_path, PathBuf::from("demos/pools.json"));
    }

    #[test]
    fn test_defaults() {
        let config: ServerConfigSpec = toml::from_str(r#"address_block = "fd00:1::/80""#).unwrap();
        assert_eq!(config.node_name, None);
        assert_eq!(config.poll_interval, 5);
        assert_eq!(config.pool_poll_interval, None);
        assert_eq!(config.layout, KeyLayout::default());
        assert_eq!(config.source.peering_path, Defaults::peering_path());
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            ServerConfigSpec::from_file("./demos/missing.toml"),
            Err(ConfigError::Io { .. })
        ));
    }
}
