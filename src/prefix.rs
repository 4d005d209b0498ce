use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use ipnetwork::IpNetwork;
use log::{debug, info};
use tokio::sync::RwLock;

use crate::error::ApplyError;
use crate::pool::{IpPool, PoolHandler};

/// Identity of the node this daemon runs on
pub trait LocalNode: Send + Sync {
    fn node_id(&self) -> &str;
    fn address_block(&self) -> IpNetwork;
}

/// Node identity fixed at startup from config
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StaticNode {
    node_id: String,
    address_block: IpNetwork,
}

impl StaticNode {
    pub fn new(node_id: &str, address_block: IpNetwork) -> Self {
        Self {
            node_id: node_id.to_string(),
            address_block,
        }
    }
}

impl LocalNode for StaticNode {
    fn node_id(&self) -> &str {
        &self.node_id
    }

    fn address_block(&self) -> IpNetwork {
        self.address_block
    }
}

/// Speaker-side prefix handling
#[async_trait]
pub trait RouteAdvertiser: Send + Sync {
    /// Merge `prefixes` into the speaker's local prefix set
    async fn update_prefix_set(&self, prefixes: &[IpNetwork]) -> Result<(), ApplyError>;
    /// Originate a route for `prefix`
    async fn advertise(&self, prefix: IpNetwork) -> Result<(), ApplyError>;
}

/// In-process prefix set and advertised routes
#[derive(Debug, Default)]
pub struct PrefixSet {
    prefixes: RwLock<BTreeSet<IpNetwork>>,
    advertised: RwLock<BTreeSet<IpNetwork>>,
}

impl PrefixSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn prefixes(&self) -> Vec<IpNetwork> {
        self.prefixes.read().await.iter().cloned().collect()
    }

    pub async fn advertised(&self) -> Vec<IpNetwork> {
        self.advertised.read().await.iter().cloned().collect()
    }
}

#[async_trait]
impl RouteAdvertiser for PrefixSet {
    async fn update_prefix_set(&self, prefixes: &[IpNetwork]) -> Result<(), ApplyError> {
        let mut set = self.prefixes.write().await;
        set.extend(prefixes.iter().cloned());
        debug!("Local prefix set now has {} entries", set.len());
        Ok(())
    }

    async fn advertise(&self, prefix: IpNetwork) -> Result<(), ApplyError> {
        if !self.prefixes.read().await.contains(&prefix) {
            return Err(ApplyError::Advertise(format!(
                "{} is not in the local prefix set",
                prefix
            )));
        }
        self.advertised.write().await.insert(prefix);
        Ok(())
    }
}

/// Announces the local node's address block, and pool prefixes as they appear
pub struct LocalPrefixPublisher {
    node: Arc<dyn LocalNode>,
    advertiser: Arc<dyn RouteAdvertiser>,
}

impl LocalPrefixPublisher {
    pub fn new(node: Arc<dyn LocalNode>, advertiser: Arc<dyn RouteAdvertiser>) -> Self {
        Self { node, advertiser }
    }

    /// Prefix set first, then the route, so the export policy already matches it
    pub async fn publish(&self) -> Result<IpNetwork, ApplyError> {
        let block = self.node.address_block();
        self.advertiser.update_prefix_set(&[block]).await?;
        self.advertiser.advertise(block).await?;
        info!("Advertised {} for node {}", block, self.node.node_id());
        Ok(block)
    }
}

#[async_trait]
impl PoolHandler for LocalPrefixPublisher {
    async fn pool_updated(&self, pool: &IpPool) -> Result<(), String> {
        self.advertiser
            .update_prefix_set(&[pool.cidr])
            .await
            .map_err(|err| err.to_string())
    }
}
