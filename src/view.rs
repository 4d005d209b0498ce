use std::collections::BTreeSet;

use itertools::Itertools;
use log::{trace, warn};
use serde::Deserialize;

use crate::error::DataError;
use crate::keys::{IpVersion, KeyLayout};
use crate::neighbor::{parse_address, Neighbor, NeighborKind};
use crate::snapshot::Snapshot;
use crate::utils::parse_asn;

/// Resolves the AS number a node peers with
pub trait AsResolver {
    fn resolve_node_as(&self, node: &str) -> Result<u32, DataError>;
}

/// Snapshot-wide lookups needed to build neighbor sessions
pub trait NodeLookup: AsResolver {
    fn node_address(&self, node: &str, version: IpVersion) -> Option<&str>;
    /// Missing config means mesh is on
    fn mesh_enabled(&self) -> Result<bool, DataError>;
    /// Every other node's addresses as mesh neighbors, sorted by address
    fn mesh_neighbors(&self) -> Vec<Neighbor>;
}

#[derive(Debug, Deserialize)]
struct MeshSpec {
    enabled: bool,
}

/// Read-only view of one snapshot from the perspective of the local node
#[derive(Clone, Copy, Debug)]
pub struct ConfigView<'a> {
    layout: &'a KeyLayout,
    snapshot: &'a Snapshot,
    local_node: &'a str,
}

impl<'a> ConfigView<'a> {
    pub fn new(layout: &'a KeyLayout, snapshot: &'a Snapshot, local_node: &'a str) -> Self {
        Self {
            layout,
            snapshot,
            local_node,
        }
    }

    fn get(&self, key: &str) -> Option<&'a str> {
        self.snapshot.get(key).map(String::as_str)
    }

    /// Peers configured for every node
    pub fn global_neighbors(&self) -> Vec<Neighbor> {
        self.peers_under(&self.layout.global_peer_prefix(), NeighborKind::Global)
    }

    /// Peers configured only for the local node
    pub fn node_neighbors(&self) -> Vec<Neighbor> {
        self.peers_under(
            &self.layout.node_peer_prefix(self.local_node),
            NeighborKind::Node,
        )
    }

    /// Everything the local node should be peering with
    pub fn all_neighbors(&self) -> Result<Vec<Neighbor>, DataError> {
        let mut neighbors = Vec::new();
        if self.mesh_enabled()? {
            neighbors.extend(self.mesh_neighbors());
        }
        neighbors.extend(self.global_neighbors());
        neighbors.extend(self.node_neighbors());
        trace!("Derived neighbors: {:?}", neighbors);
        Ok(neighbors)
    }

    fn peers_under(&self, prefix: &str, kind: NeighborKind) -> Vec<Neighbor> {
        self.snapshot
            .iter()
            .filter(|(key, value)| key.starts_with(prefix) && !value.is_empty())
            .sorted_by(|a, b| a.0.cmp(b.0))
            .filter_map(|(key, value)| match Neighbor::from_peer_value(kind, key, value) {
                Ok(neighbor) => Some(neighbor),
                Err(err) => {
                    warn!("Skipping peer {}: {}", key, err);
                    None
                }
            })
            .collect()
    }

    fn mesh_nodes(&self) -> BTreeSet<&'a str> {
        let layout = self.layout;
        self.snapshot
            .keys()
            .filter_map(|key| {
                let node = layout.node_of(key)?;
                IpVersion::ALL
                    .iter()
                    .any(|v| *key == layout.node_address_key(node, *v))
                    .then(|| node)
            })
            .filter(|node| *node != self.local_node)
            .collect()
    }
}

impl<'a> AsResolver for ConfigView<'a> {
    fn resolve_node_as(&self, node: &str) -> Result<u32, DataError> {
        if let Some(asn) = self.get(&self.layout.node_as_key(node)).filter(|v| !v.is_empty()) {
            return parse_asn(asn);
        }
        match self.get(&self.layout.global_as_key()).filter(|v| !v.is_empty()) {
            Some(asn) => parse_asn(asn),
            None => Err(DataError::UnresolvedAsn(node.to_string())),
        }
    }
}

impl<'a> NodeLookup for ConfigView<'a> {
    fn node_address(&self, node: &str, version: IpVersion) -> Option<&str> {
        self.get(&self.layout.node_address_key(node, version))
    }

    fn mesh_enabled(&self) -> Result<bool, DataError> {
        let key = self.layout.mesh_key();
        match self.get(&key) {
            None => Ok(true),
            Some(value) => serde_json::from_str::<MeshSpec>(value)
                .map(|spec| spec.enabled)
                .map_err(|err| DataError::Malformed {
                    key,
                    reason: err.to_string(),
                }),
        }
    }

    fn mesh_neighbors(&self) -> Vec<Neighbor> {
        let mut neighbors = Vec::new();
        for node in self.mesh_nodes() {
            for version in IpVersion::ALL.iter() {
                let address = match self.node_address(node, *version) {
                    Some(address) if !address.is_empty() => address,
                    _ => continue,
                };
                let neighbor = parse_address(address).and_then(|address| {
                    let remote_as = self.resolve_node_as(node)?;
                    Ok(Neighbor::new(NeighborKind::Mesh, address, remote_as))
                });
                match neighbor {
                    Ok(neighbor) => neighbors.push(neighbor),
                    Err(err) => warn!("Skipping mesh peer {} ({}): {}", node, version, err),
                }
            }
        }
        neighbors.sort_by_key(|n| n.address);
        neighbors
    }
}
