use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use ipnetwork::IpNetwork;
use itertools::Itertools;
use log::{debug, info, warn};
use serde::Deserialize;
use tokio::sync::RwLock;

use crate::cycle::{Cycle, CycleError, CycleOutcome, CycleReport, CycleState};
use crate::error::PoolError;
use crate::snapshot::{diff, Snapshot};
use crate::source::SnapshotSource;

/// Pool record as serialized in the datastore
#[derive(Debug, Deserialize)]
struct PoolSpec {
    #[serde(default)]
    cidr: String,
    #[serde(default)]
    ipip: Option<String>,
    #[serde(default)]
    ipip_mode: Option<String>,
    #[serde(default)]
    masquerade: bool,
    #[serde(default)]
    disabled: bool,
}

/// An address range and its routing attributes
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IpPool {
    pub cidr: IpNetwork,
    /// IPIP tunnel interface, if tunnelling is enabled for the pool
    pub ipip: Option<String>,
    pub ipip_mode: Option<String>,
    pub masquerade: bool,
    pub disabled: bool,
}

impl IpPool {
    pub fn parse(entry: &str) -> Result<Self, PoolError> {
        if entry.trim().is_empty() {
            return Err(PoolError::EmptyEntry);
        }
        let spec: PoolSpec = serde_json::from_str(entry).map_err(|source| PoolError::Malformed {
            entry: entry.to_string(),
            source,
        })?;
        if spec.cidr.trim().is_empty() {
            return Err(PoolError::EmptyCidr(entry.to_string()));
        }
        let cidr = spec
            .cidr
            .trim()
            .parse::<IpNetwork>()
            .map_err(|err| PoolError::InvalidCidr {
                cidr: spec.cidr.clone(),
                reason: err.to_string(),
            })?;
        Ok(Self {
            cidr,
            ipip: spec.ipip.filter(|s| !s.is_empty()),
            ipip_mode: spec.ipip_mode.filter(|s| !s.is_empty()),
            masquerade: spec.masquerade,
            disabled: spec.disabled,
        })
    }

    /// Is `prefix` entirely inside this pool
    pub fn contains(&self, prefix: IpNetwork) -> bool {
        self.cidr.is_ipv4() == prefix.is_ipv4()
            && prefix.prefix() >= self.cidr.prefix()
            && self.cidr.contains(prefix.network())
    }
}

impl fmt::Display for IpPool {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "<IpPool {}", self.cidr)?;
        if let Some(ipip) = &self.ipip {
            write!(f, " ipip={}", ipip)?;
        }
        if let Some(mode) = &self.ipip_mode {
            write!(f, " mode={}", mode)?;
        }
        if self.masquerade {
            write!(f, " masquerade")?;
        }
        if self.disabled {
            write!(f, " disabled")?;
        }
        write!(f, ">")
    }
}

/// Notified whenever a pool is added or its content changes.
/// Removals are not reported; consumers re-derive from `PoolCache::pools`.
#[async_trait]
pub trait PoolHandler: Send + Sync {
    async fn pool_updated(&self, pool: &IpPool) -> Result<(), String>;
}

/// Authoritative table of IP pools keyed by CIDR
pub struct PoolCache {
    pools: RwLock<BTreeMap<IpNetwork, IpPool>>,
    source: Arc<dyn SnapshotSource>,
    handler: Option<Arc<dyn PoolHandler>>,
}

impl PoolCache {
    pub fn new(source: Arc<dyn SnapshotSource>, handler: Option<Arc<dyn PoolHandler>>) -> Self {
        Self {
            pools: RwLock::new(BTreeMap::new()),
            source,
            handler,
        }
    }

    /// First pool containing `prefix`
    pub async fn match_pool(&self, prefix: IpNetwork) -> Option<IpPool> {
        let pools = self.pools.read().await;
        pools.values().find(|p| p.contains(prefix)).cloned()
    }

    pub async fn pools(&self) -> Vec<IpPool> {
        self.pools.read().await.values().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.pools.read().await.len()
    }

    /// Apply one serialized pool entry. Returns whether the table changed.
    pub async fn apply(&self, entry: &str, is_removal: bool) -> Result<bool, PoolError> {
        let pool = IpPool::parse(entry)?;
        debug!("Update IP pool cache: {} (removal={})", pool, is_removal);
        let previous = {
            let mut pools = self.pools.write().await;
            if is_removal {
                return Ok(pools.remove(&pool.cidr).is_some());
            }
            if pools.get(&pool.cidr) == Some(&pool) {
                return Ok(false);
            }
            pools.insert(pool.cidr, pool.clone())
        };
        // Lock is released while the handler runs
        if let Some(handler) = &self.handler {
            if let Err(reason) = handler.pool_updated(&pool).await {
                self.restore(&pool, previous).await;
                return Err(PoolError::Handler {
                    cidr: pool.cidr.to_string(),
                    reason,
                });
            }
        }
        Ok(true)
    }

    /// Undo a write whose handler failed, so the retry notifies again
    async fn restore(&self, pool: &IpPool, previous: Option<IpPool>) {
        let mut pools = self.pools.write().await;
        if pools.get(&pool.cidr) != Some(pool) {
            // Replaced meanwhile; the newer write wins
            return;
        }
        match previous {
            Some(old) => {
                pools.insert(pool.cidr, old);
            }
            None => {
                pools.remove(&pool.cidr);
            }
        }
    }

    /// Load every pool from a fresh snapshot, returning it as the first baseline
    pub async fn initialize(&self) -> Result<Snapshot, CycleError> {
        let snapshot = self.source.fetch_pool_snapshot().await?;
        for (key, entry) in snapshot.iter().sorted_by(|a, b| a.0.cmp(b.0)) {
            self.apply_logged(key, entry, false).await?;
        }
        info!("Loaded {} IP pools", self.len().await);
        Ok(snapshot)
    }

    /// One fetch/diff/apply pass of the pool config against `baseline`
    pub async fn run_pool_cycle(&self, baseline: &Snapshot) -> CycleOutcome {
        let mut cycle = Cycle::start("Pool");
        let current = match self.source.fetch_pool_snapshot().await {
            Ok(snapshot) => snapshot,
            Err(err) => return cycle.abort(err.into()),
        };

        cycle.update_state(CycleState::Diffing);
        let delta = diff(baseline, &current).sorted();
        let mut report = CycleReport::from_delta(&delta);
        if delta.is_empty() {
            return cycle.commit(current, report);
        }
        debug!("IP pool config changed: {}", delta);

        cycle.update_state(CycleState::Applying);
        let upserts = delta
            .added
            .iter()
            .chain(delta.updated.iter())
            .filter_map(|key| current.get(key).map(|entry| (key, entry, false)));
        let removals = delta
            .removed
            .iter()
            .filter_map(|key| baseline.get(key).map(|entry| (key, entry, true)));
        for (key, entry, is_removal) in upserts.chain(removals) {
            match self.apply_logged(key, entry, is_removal).await {
                Ok(Some(true)) => report.operations += 1,
                Ok(Some(false)) => (),
                Ok(None) => report.skipped += 1,
                Err(err) => return cycle.abort(err),
            }
        }
        info!("IP pool config reconciled: {}", report);
        cycle.commit(current, report)
    }

    /// Data errors are logged and reported as `None`; handler errors propagate
    async fn apply_logged(
        &self,
        key: &str,
        entry: &str,
        is_removal: bool,
    ) -> Result<Option<bool>, CycleError> {
        match self.apply(entry, is_removal).await {
            Ok(changed) => Ok(Some(changed)),
            Err(err) if err.is_data_error() => {
                warn!("Skipping IP pool {}: {}", key, err);
                Ok(None)
            }
            Err(err) => Err(err.into()),
        }
    }
}
