use std::fmt;
use std::net::IpAddr;

use log::{debug, warn};
use serde::Deserialize;

use crate::error::DataError;
use crate::keys::{InterpretedKey, IpVersion};
use crate::snapshot::Change;
use crate::utils::{asn_to_dotted, parse_asn, underscore};
use crate::view::NodeLookup;

/// Where a neighbor config came from, used as the label prefix
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum NeighborKind {
    Mesh,
    Global,
    Node,
}

impl fmt::Display for NeighborKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let word = match self {
            NeighborKind::Mesh => "Mesh",
            NeighborKind::Global => "Global",
            NeighborKind::Node => "Node",
        };
        write!(f, "{}", word)
    }
}

/// Peering session descriptor handed to the session manager
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Neighbor {
    pub address: IpAddr,
    pub remote_as: u32,
    pub label: String,
}

impl Neighbor {
    pub fn new(kind: NeighborKind, address: IpAddr, remote_as: u32) -> Self {
        Self {
            address,
            remote_as,
            label: format!("{}_{}", kind, underscore(&address.to_string())),
        }
    }

    /// Build from a peer record value (`{"ip": "...", "as_num": ...}`)
    pub fn from_peer_value(kind: NeighborKind, key: &str, value: &str) -> Result<Self, DataError> {
        let spec: PeerSpec = serde_json::from_str(value).map_err(|err| DataError::Malformed {
            key: key.to_string(),
            reason: err.to_string(),
        })?;
        let address = parse_address(&spec.ip)?;
        let remote_as = match spec.as_num {
            AsNumberSpec::Number(asn) => asn,
            AsNumberSpec::Text(asn) => parse_asn(&asn)?,
        };
        Ok(Self::new(kind, address, remote_as))
    }
}

impl fmt::Display for Neighbor {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "<Neighbor {} AS{} {}>",
            self.address,
            asn_to_dotted(self.remote_as),
            self.label
        )
    }
}

#[derive(Debug, Deserialize)]
struct PeerSpec {
    ip: String,
    as_num: AsNumberSpec,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum AsNumberSpec {
    Number(u32),
    Text(String),
}

pub fn parse_address(value: &str) -> Result<IpAddr, DataError> {
    value
        .trim()
        .parse()
        .map_err(|_| DataError::InvalidAddress(value.to_string()))
}

/// A single change to apply to the session manager
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Op {
    Add(Neighbor),
    Remove(IpAddr),
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Op::Add(neighbor) => write!(f, "add {}", neighbor),
            Op::Remove(addr) => write!(f, "remove {}", addr),
        }
    }
}

/// Turns one changed key into session operations.
/// All operations for a key are computed before any is applied, so a data
/// error leaves that key's sessions untouched.
pub struct NeighborBuilder<'a, L: NodeLookup> {
    lookup: &'a L,
}

impl<'a, L: NodeLookup> NeighborBuilder<'a, L> {
    /// `lookup` must reflect the current (newest) snapshot
    pub fn new(lookup: &'a L) -> Self {
        Self { lookup }
    }

    /// `value` is the current value for Added/Updated keys and the last known
    /// value for Removed keys. `previous` is only used for updates.
    pub fn build(
        &self,
        action: Change,
        key: &str,
        interpreted: &InterpretedKey,
        value: &str,
        previous: Option<&str>,
    ) -> Result<Vec<Op>, DataError> {
        match interpreted {
            InterpretedKey::GlobalPeer => self.peer(NeighborKind::Global, action, key, value, previous),
            InterpretedKey::NodePeer(_) => self.peer(NeighborKind::Node, action, key, value, previous),
            InterpretedKey::NodeAddress(node, _) => self.node_address(action, node, value, previous),
            InterpretedKey::NodeAs(node) => self.node_as(node),
            InterpretedKey::MeshToggle => self.mesh_toggle(),
            InterpretedKey::GlobalAs | InterpretedKey::LocalIdentity => {
                warn!("{} change for {} can't be applied online", interpreted, key);
                Ok(vec![])
            }
            InterpretedKey::Unrecognized => {
                debug!("Unhandled key: {}", key);
                Ok(vec![])
            }
        }
    }

    fn peer(
        &self,
        kind: NeighborKind,
        action: Change,
        key: &str,
        value: &str,
        previous: Option<&str>,
    ) -> Result<Vec<Op>, DataError> {
        let mut ops = Vec::with_capacity(2);
        match action {
            Change::Removed => {
                if !value.is_empty() {
                    ops.push(Op::Remove(Neighbor::from_peer_value(kind, key, value)?.address));
                }
            }
            Change::Added | Change::Updated => {
                let new = if value.is_empty() {
                    None
                } else {
                    Some(Neighbor::from_peer_value(kind, key, value)?)
                };
                if action == Change::Updated {
                    if let Some(old) = previous.filter(|p| !p.is_empty()) {
                        match Neighbor::from_peer_value(kind, key, old) {
                            Ok(old) => ops.push(Op::Remove(old.address)),
                            Err(err) => warn!("Not removing stale peer for {}: {}", key, err),
                        }
                    }
                }
                ops.extend(new.map(Op::Add));
            }
        }
        Ok(ops)
    }

    fn node_address(
        &self,
        action: Change,
        node: &str,
        value: &str,
        previous: Option<&str>,
    ) -> Result<Vec<Op>, DataError> {
        let mut ops = Vec::with_capacity(2);
        match action {
            Change::Removed => {
                if !value.is_empty() {
                    ops.push(Op::Remove(parse_address(value)?));
                }
            }
            Change::Added | Change::Updated => {
                if action == Change::Updated {
                    if let Some(old) = previous.filter(|p| !p.is_empty()) {
                        match parse_address(old) {
                            Ok(old) => ops.push(Op::Remove(old)),
                            Err(err) => warn!("Not removing stale mesh peer for {}: {}", node, err),
                        }
                    }
                }
                if !value.is_empty() && self.lookup.mesh_enabled()? {
                    let address = parse_address(value)?;
                    let remote_as = self.lookup.resolve_node_as(node)?;
                    ops.push(Op::Add(Neighbor::new(NeighborKind::Mesh, address, remote_as)));
                }
            }
        }
        Ok(ops)
    }

    /// Re-peer every address of the node with its (re-resolved) AS
    fn node_as(&self, node: &str) -> Result<Vec<Op>, DataError> {
        let mesh = self.lookup.mesh_enabled()?;
        let mut ops = Vec::with_capacity(4);
        for version in IpVersion::ALL.iter() {
            let address = match self.lookup.node_address(node, *version) {
                Some(address) if !address.is_empty() => parse_address(address)?,
                _ => continue,
            };
            ops.push(Op::Remove(address));
            if mesh {
                let remote_as = self.lookup.resolve_node_as(node)?;
                ops.push(Op::Add(Neighbor::new(NeighborKind::Mesh, address, remote_as)));
            }
        }
        Ok(ops)
    }

    fn mesh_toggle(&self) -> Result<Vec<Op>, DataError> {
        let enabled = self.lookup.mesh_enabled()?;
        debug!("Node mesh is now {}", if enabled { "enabled" } else { "disabled" });
        let ops = self
            .lookup
            .mesh_neighbors()
            .into_iter()
            .map(|n| if enabled { Op::Add(n) } else { Op::Remove(n.address) })
            .collect();
        Ok(ops)
    }
}
