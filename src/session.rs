use std::collections::HashMap;
use std::fmt;
use std::net::IpAddr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, info};
use tokio::sync::RwLock;

use crate::error::ApplyError;
use crate::neighbor::Neighbor;
use crate::utils::{asn_to_dotted, format_time_as_elapsed};

/// Peering session manager of the BGP speaker.
///
/// Both operations must be idempotent: adding a session for an address that
/// already has one, or removing an address that has none, is not an error.
/// Sessions are identified by remote address alone.
#[async_trait]
pub trait SessionManager: Send + Sync {
    async fn add_session(&self, neighbor: &Neighbor) -> Result<(), ApplyError>;
    async fn remove_session(&self, address: IpAddr) -> Result<(), ApplyError>;
}

#[derive(Clone, Debug)]
pub struct ConfiguredNeighbor {
    pub neighbor: Neighbor,
    pub configured_at: DateTime<Utc>,
}

impl fmt::Display for ConfiguredNeighbor {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} AS{} {} (configured {} ago)",
            self.neighbor.address,
            asn_to_dotted(self.neighbor.remote_as),
            self.neighbor.label,
            format_time_as_elapsed(self.configured_at),
        )
    }
}

/// In-memory neighbor configuration, keyed by remote address.
/// Stands in for the speaker's neighbor config when running stand-alone.
#[derive(Debug, Default)]
pub struct NeighborTable {
    neighbors: RwLock<HashMap<IpAddr, ConfiguredNeighbor>>,
}

impl NeighborTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.neighbors.read().await.len()
    }

    pub async fn get(&self, address: IpAddr) -> Option<Neighbor> {
        self.neighbors
            .read()
            .await
            .get(&address)
            .map(|c| c.neighbor.clone())
    }

    /// All configured neighbors, sorted by address
    pub async fn neighbors(&self) -> Vec<ConfiguredNeighbor> {
        let neighbors = self.neighbors.read().await;
        let mut output: Vec<_> = neighbors.values().cloned().collect();
        output.sort_by_key(|c| c.neighbor.address);
        output
    }
}

#[async_trait]
impl SessionManager for NeighborTable {
    async fn add_session(&self, neighbor: &Neighbor) -> Result<(), ApplyError> {
        let mut neighbors = self.neighbors.write().await;
        if let Some(existing) = neighbors.get(&neighbor.address) {
            debug!("{} already configured as {}", neighbor, existing.neighbor.label);
            return Ok(());
        }
        info!("Neighbor added: {}", neighbor);
        neighbors.insert(
            neighbor.address,
            ConfiguredNeighbor {
                neighbor: neighbor.clone(),
                configured_at: Utc::now(),
            },
        );
        Ok(())
    }

    async fn remove_session(&self, address: IpAddr) -> Result<(), ApplyError> {
        match self.neighbors.write().await.remove(&address) {
            Some(removed) => info!("Neighbor removed: {}", removed.neighbor),
            None => debug!("No neighbor configured for {}", address),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::neighbor::NeighborKind;

    fn neighbor(addr: &str, asn: u32) -> Neighbor {
        Neighbor::new(NeighborKind::Mesh, addr.parse().unwrap(), asn)
    }

    #[tokio::test]
    async fn test_add_is_idempotent() {
        let table = NeighborTable::new();
        let n = neighbor("10.0.0.5", 65001);
        table.add_session(&n).await.unwrap();
        table.add_session(&n).await.unwrap();
        assert_eq!(table.len().await, 1);
        assert_eq!(table.get(n.address).await, Some(n));
    }

    #[tokio::test]
    async fn test_identity_is_address() {
        let table = NeighborTable::new();
        table.add_session(&neighbor("10.0.0.5", 65001)).await.unwrap();
        // Same address, different AS: still the same session
        table.add_session(&neighbor("10.0.0.5", 65002)).await.unwrap();
        assert_eq!(table.get("10.0.0.5".parse().unwrap()).await.unwrap().remote_as, 65001);

        table.remove_session("10.0.0.5".parse().unwrap()).await.unwrap();
        table.remove_session("10.0.0.5".parse().unwrap()).await.unwrap();
        assert_eq!(table.len().await, 0);
    }

    #[tokio::test]
    async fn test_neighbors_sorted() {
        let table = NeighborTable::new();
        for addr in &["10.0.0.9", "fd00::1", "10.0.0.2"] {
            table.add_session(&neighbor(addr, 1)).await.unwrap();
        }
        let addrs: Vec<_> = table
            .neighbors()
            .await
            .into_iter()
            .map(|c| c.neighbor.address.to_string())
            .collect();
        assert_eq!(addrs, vec!["10.0.0.2", "10.0.0.9", "fd00::1"]);
    }
}
