//! Test doubles for the external collaborators
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{ApplyError, SourceError};
use crate::neighbor::Neighbor;
use crate::session::{NeighborTable, SessionManager};
use crate::snapshot::Snapshot;
use crate::source::SnapshotSource;

/// Serves whatever snapshots the test last set
#[derive(Debug, Default)]
pub struct MemorySource {
    peering: Mutex<Snapshot>,
    pools: Mutex<Snapshot>,
    fail: AtomicBool,
}

impl MemorySource {
    pub fn new(peering: Snapshot) -> Self {
        Self {
            peering: Mutex::new(peering),
            ..Default::default()
        }
    }

    pub fn with_pools(pools: Snapshot) -> Self {
        Self {
            pools: Mutex::new(pools),
            ..Default::default()
        }
    }

    pub fn set(&self, peering: Snapshot) {
        *self.peering.lock().unwrap() = peering;
    }

    pub fn set_pools(&self, pools: Snapshot) {
        *self.pools.lock().unwrap() = pools;
    }

    /// Next fetch (of either stream) fails
    pub fn fail_next(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), SourceError> {
        if self.fail.swap(false, Ordering::SeqCst) {
            return Err(SourceError::Unavailable("datastore unreachable".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl SnapshotSource for MemorySource {
    async fn fetch_peering_snapshot(&self) -> Result<Snapshot, SourceError> {
        self.check()?;
        Ok(self.peering.lock().unwrap().clone())
    }

    async fn fetch_pool_snapshot(&self) -> Result<Snapshot, SourceError> {
        self.check()?;
        Ok(self.pools.lock().unwrap().clone())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Call {
    Add(Neighbor),
    Remove(IpAddr),
}

/// Records every call in order, backed by a real `NeighborTable`
#[derive(Debug, Default)]
pub struct RecordingSessions {
    calls: Mutex<Vec<Call>>,
    table: NeighborTable,
    fail_on: Mutex<Option<IpAddr>>,
}

impl RecordingSessions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    /// Any call for `address` fails until cleared
    pub fn fail_on(&self, address: IpAddr) {
        *self.fail_on.lock().unwrap() = Some(address);
    }

    pub fn clear_failure(&self) {
        *self.fail_on.lock().unwrap() = None;
    }

    fn should_fail(&self, address: IpAddr) -> bool {
        *self.fail_on.lock().unwrap() == Some(address)
    }

    pub async fn table_addresses(&self) -> Vec<String> {
        self.table
            .neighbors()
            .await
            .into_iter()
            .map(|c| c.neighbor.address.to_string())
            .collect()
    }

    pub async fn table_labels(&self) -> Vec<String> {
        self.table
            .neighbors()
            .await
            .into_iter()
            .map(|c| c.neighbor.label)
            .collect()
    }
}

#[async_trait]
impl SessionManager for RecordingSessions {
    async fn add_session(&self, neighbor: &Neighbor) -> Result<(), ApplyError> {
        if self.should_fail(neighbor.address) {
            return Err(ApplyError::Add {
                addr: neighbor.address,
                reason: "peer rejected".to_string(),
            });
        }
        self.calls.lock().unwrap().push(Call::Add(neighbor.clone()));
        self.table.add_session(neighbor).await
    }

    async fn remove_session(&self, address: IpAddr) -> Result<(), ApplyError> {
        if self.should_fail(address) {
            return Err(ApplyError::Remove {
                addr: address,
                reason: "peer rejected".to_string(),
            });
        }
        self.calls.lock().unwrap().push(Call::Remove(address));
        self.table.remove_session(address).await
    }
}
