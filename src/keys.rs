use std::fmt;

use serde::{Deserialize, Serialize};

const PEER_SEGMENT_PREFIX: &str = "peer_";
const AS_NUM: &str = "as_num";
const NODE_MESH: &str = "node_mesh";
const IP_ADDR_V4: &str = "ip_addr_v4";
const IP_ADDR_V6: &str = "ip_addr_v6";
// <node>/<leaf>
const MIN_NODE_SEGMENTS: usize = 2;

struct Defaults {}

impl Defaults {
    fn global_prefix() -> String {
        String::from("/calico/bgp/v1/global")
    }

    fn nodes_prefix() -> String {
        String::from("/calico/bgp/v1/host")
    }
}

/// Where the global and per-node sections live in the flattened key space
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct KeyLayout {
    #[serde(default = "Defaults::global_prefix")]
    pub global_prefix: String,
    #[serde(default = "Defaults::nodes_prefix")]
    pub nodes_prefix: String,
}

impl Default for KeyLayout {
    fn default() -> Self {
        Self {
            global_prefix: Defaults::global_prefix(),
            nodes_prefix: Defaults::nodes_prefix(),
        }
    }
}

impl KeyLayout {
    pub fn new(global_prefix: &str, nodes_prefix: &str) -> Self {
        Self {
            global_prefix: global_prefix.trim_end_matches('/').to_string(),
            nodes_prefix: nodes_prefix.trim_end_matches('/').to_string(),
        }
    }

    pub fn global_as_key(&self) -> String {
        format!("{}/{}", self.global_prefix, AS_NUM)
    }

    pub fn mesh_key(&self) -> String {
        format!("{}/{}", self.global_prefix, NODE_MESH)
    }

    pub fn global_peer_prefix(&self) -> String {
        format!("{}/{}", self.global_prefix, PEER_SEGMENT_PREFIX)
    }

    pub fn node_root(&self, node: &str) -> String {
        format!("{}/{}", self.nodes_prefix, node)
    }

    pub fn node_peer_prefix(&self, node: &str) -> String {
        format!("{}/{}", self.node_root(node), PEER_SEGMENT_PREFIX)
    }

    pub fn node_as_key(&self, node: &str) -> String {
        format!("{}/{}", self.node_root(node), AS_NUM)
    }

    pub fn node_address_key(&self, node: &str, version: IpVersion) -> String {
        let leaf = match version {
            IpVersion::V4 => IP_ADDR_V4,
            IpVersion::V6 => IP_ADDR_V6,
        };
        format!("{}/{}", self.node_root(node), leaf)
    }

    /// Node id of a `<nodes>/<node>/<leaf>` key
    pub fn node_of<'k>(&self, key: &'k str) -> Option<&'k str> {
        let rest = key
            .strip_prefix(self.nodes_prefix.as_str())?
            .strip_prefix('/')?;
        let segments: Vec<&str> = rest.split('/').collect();
        if segments.len() < MIN_NODE_SEGMENTS {
            return None;
        }
        Some(segments[segments.len() - 2]).filter(|n| !n.is_empty())
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum IpVersion {
    V4,
    V6,
}

impl IpVersion {
    pub const ALL: [IpVersion; 2] = [IpVersion::V4, IpVersion::V6];
}

impl fmt::Display for IpVersion {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            IpVersion::V4 => write!(f, "IPv4"),
            IpVersion::V6 => write!(f, "IPv6"),
        }
    }
}

/// Semantic meaning of a flattened config key
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InterpretedKey {
    GlobalAs,
    MeshToggle,
    GlobalPeer,
    NodePeer(String),
    NodeAddress(String, IpVersion),
    NodeAs(String),
    /// Anything under the local node's own root (other than its peers)
    LocalIdentity,
    Unrecognized,
}

impl InterpretedKey {
    /// Changes to these keys can't be repaired online
    pub fn requires_restart(&self) -> bool {
        matches!(self, InterpretedKey::GlobalAs | InterpretedKey::LocalIdentity)
    }
}

impl fmt::Display for InterpretedKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use InterpretedKey::*;
        match self {
            GlobalAs => write!(f, "Global AS"),
            MeshToggle => write!(f, "Mesh toggle"),
            GlobalPeer => write!(f, "Global peer"),
            NodePeer(node) => write!(f, "Node peer ({})", node),
            NodeAddress(node, version) => write!(f, "Node {} address ({})", version, node),
            NodeAs(node) => write!(f, "Node AS ({})", node),
            LocalIdentity => write!(f, "Local identity"),
            Unrecognized => write!(f, "Unrecognized"),
        }
    }
}

type Classifier = fn(&KeyInterpreter, &str) -> Option<InterpretedKey>;

/// Classification rules, highest priority first.
/// Prefixes overlap, so the first rule that claims a key decides it.
const RULES: &[(&str, Classifier)] = &[
    ("global peer", global_peer),
    ("local node peer", local_node_peer),
    ("local node root", local_node_root),
    ("node config", node_config),
    ("global AS", global_as),
    ("mesh toggle", mesh_toggle),
];

fn global_peer(interpreter: &KeyInterpreter, key: &str) -> Option<InterpretedKey> {
    key.starts_with(&interpreter.global_peer_prefix)
        .then(|| InterpretedKey::GlobalPeer)
}

fn local_node_peer(interpreter: &KeyInterpreter, key: &str) -> Option<InterpretedKey> {
    key.starts_with(&interpreter.local_peer_prefix)
        .then(|| InterpretedKey::NodePeer(interpreter.node.clone()))
}

fn local_node_root(interpreter: &KeyInterpreter, key: &str) -> Option<InterpretedKey> {
    let root = interpreter.local_root.as_str();
    let claimed = match key.strip_prefix(root) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    };
    claimed.then(|| InterpretedKey::LocalIdentity)
}

fn node_config(interpreter: &KeyInterpreter, key: &str) -> Option<InterpretedKey> {
    let rest = key.strip_prefix(&interpreter.nodes_root)?;
    let segments: Vec<&str> = rest.split('/').collect();
    if segments.len() < MIN_NODE_SEGMENTS {
        return Some(InterpretedKey::Unrecognized);
    }
    let node = segments[segments.len() - 2];
    if node.is_empty() {
        return Some(InterpretedKey::Unrecognized);
    }
    let interpreted = match segments[segments.len() - 1] {
        IP_ADDR_V4 => InterpretedKey::NodeAddress(node.to_string(), IpVersion::V4),
        IP_ADDR_V6 => InterpretedKey::NodeAddress(node.to_string(), IpVersion::V6),
        AS_NUM => InterpretedKey::NodeAs(node.to_string()),
        _ => InterpretedKey::Unrecognized,
    };
    Some(interpreted)
}

fn global_as(interpreter: &KeyInterpreter, key: &str) -> Option<InterpretedKey> {
    (key == interpreter.global_as_key).then(|| InterpretedKey::GlobalAs)
}

fn mesh_toggle(interpreter: &KeyInterpreter, key: &str) -> Option<InterpretedKey> {
    (key == interpreter.mesh_key).then(|| InterpretedKey::MeshToggle)
}

/// Classifies keys relative to the local node. Prefixes are computed once.
#[derive(Clone, Debug)]
pub struct KeyInterpreter {
    node: String,
    global_peer_prefix: String,
    local_peer_prefix: String,
    local_root: String,
    nodes_root: String,
    global_as_key: String,
    mesh_key: String,
}

impl KeyInterpreter {
    pub fn new(layout: &KeyLayout, node: &str) -> Self {
        Self {
            node: node.to_string(),
            global_peer_prefix: layout.global_peer_prefix(),
            local_peer_prefix: layout.node_peer_prefix(node),
            local_root: layout.node_root(node),
            nodes_root: format!("{}/", layout.nodes_prefix),
            global_as_key: layout.global_as_key(),
            mesh_key: layout.mesh_key(),
        }
    }

    pub fn node(&self) -> &str {
        &self.node
    }

    pub fn interpret(&self, key: &str) -> InterpretedKey {
        RULES
            .iter()
            .find_map(|(_, rule)| rule(self, key))
            .unwrap_or(InterpretedKey::Unrecognized)
    }

    /// Name of the rule that claimed this key, if any
    pub fn matched_rule(&self, key: &str) -> Option<&'static str> {
        RULES
            .iter()
            .find(|(_, rule)| rule(self, key).is_some())
            .map(|(name, _)| *name)
    }
}
