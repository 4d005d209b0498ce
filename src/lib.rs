pub mod cli;
pub mod config;
mod cycle;
mod error;
mod handler;
mod keys;
mod neighbor;
mod pool;
mod prefix;
mod reconcile;
mod session;
mod snapshot;
mod source;
#[cfg(test)]
mod testing;
mod utils;
mod view;

pub use config::ServerConfig;
pub use cycle::{CycleError, CycleOutcome, CycleReport, FatalReason};
pub use error::{ApplyError, ConfigError, DataError, PoolError, SourceError};
pub use handler::serve;
pub use keys::{InterpretedKey, IpVersion, KeyInterpreter, KeyLayout};
pub use neighbor::{Neighbor, NeighborKind};
pub use pool::{IpPool, PoolCache, PoolHandler};
pub use prefix::{LocalNode, LocalPrefixPublisher, PrefixSet, RouteAdvertiser, StaticNode};
pub use reconcile::PeeringReconciler;
pub use session::{ConfiguredNeighbor, NeighborTable, SessionManager};
pub use snapshot::{diff, Change, Delta, Snapshot};
pub use source::{FileSource, SnapshotSource};
pub use view::{AsResolver, ConfigView, NodeLookup};
