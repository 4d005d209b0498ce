use std::path::{Path, PathBuf};

use async_trait::async_trait;
use log::trace;

use crate::error::SourceError;
use crate::snapshot::Snapshot;

/// Full re-read of the flattened configuration, every call
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    async fn fetch_peering_snapshot(&self) -> Result<Snapshot, SourceError>;
    async fn fetch_pool_snapshot(&self) -> Result<Snapshot, SourceError>;
}

/// Reads snapshots from JSON files holding a flat `{"key": "value"}` object.
/// Whatever exports the datastore rewrites these files; each poll sees the
/// latest complete copy.
#[derive(Clone, Debug)]
pub struct FileSource {
    peering_path: PathBuf,
    pools_path: PathBuf,
}

impl FileSource {
    pub fn new<P: Into<PathBuf>>(peering_path: P, pools_path: P) -> Self {
        Self {
            peering_path: peering_path.into(),
            pools_path: pools_path.into(),
        }
    }
}

pub async fn read_snapshot(path: &Path) -> Result<Snapshot, SourceError> {
    let display = path.display().to_string();
    let contents = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| SourceError::Io {
            path: display.clone(),
            source,
        })?;
    let snapshot: Snapshot =
        serde_json::from_str(&contents).map_err(|source| SourceError::Format {
            path: display.clone(),
            source,
        })?;
    trace!("Read {} keys from {}", snapshot.len(), display);
    Ok(snapshot)
}

#[async_trait]
impl SnapshotSource for FileSource {
    async fn fetch_peering_snapshot(&self) -> Result<Snapshot, SourceError> {
        read_snapshot(&self.peering_path).await
    }

    async fn fetch_pool_snapshot(&self) -> Result<Snapshot, SourceError> {
        read_snapshot(&self.pools_path).await
    }
}
