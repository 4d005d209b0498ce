use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info, trace, warn};
use tokio::signal;
use tokio::time::{interval, MissedTickBehavior};

use crate::config::ServerConfig;
use crate::cycle::{CycleOutcome, FatalReason};
use crate::pool::PoolCache;
use crate::prefix::{LocalPrefixPublisher, PrefixSet, StaticNode};
use crate::reconcile::PeeringReconciler;
use crate::session::NeighborTable;
use crate::snapshot::Snapshot;
use crate::source::{FileSource, SnapshotSource};

/// Load the initial peering and pool state, advertise the local block,
/// then poll both until Ctrl-C or a change that needs a restart.
pub async fn serve(config: ServerConfig) -> Result<(), Box<dyn Error>> {
    let source: Arc<dyn SnapshotSource> = Arc::new(FileSource::new(
        config.peering_path.clone(),
        config.pools_path.clone(),
    ));
    let sessions = Arc::new(NeighborTable::new());
    let prefixes = Arc::new(PrefixSet::new());
    let node = Arc::new(StaticNode::new(&config.node_name, config.address_block));
    let publisher = Arc::new(LocalPrefixPublisher::new(node, prefixes.clone()));

    let reconciler = PeeringReconciler::new(
        config.layout.clone(),
        &config.node_name,
        source.clone(),
        sessions.clone(),
    );
    let pools = Arc::new(PoolCache::new(source, Some(publisher.clone())));

    let peering_baseline = reconciler.initialize().await?;
    info!(
        "Configured {} neighbors for {}",
        sessions.len().await,
        config.node_name
    );
    let pool_baseline = pools.initialize().await?;
    publisher.publish().await?;

    let pool_task = tokio::spawn(poll_pools(
        pools,
        pool_baseline,
        config.pool_poll_period(),
    ));
    let result = tokio::select! {
        fatal = poll_peering(&reconciler, &sessions, peering_baseline, config.poll_period()) => {
            error!("{}", fatal);
            Err(Box::new(fatal) as Box<dyn Error>)
        },
        _ = signal::ctrl_c() => {
            info!("Stopping bgpd-sync...");
            Ok(())
        },
    };
    pool_task.abort();
    result
}

/// Runs peering cycles until one reports a fatal change
async fn poll_peering(
    reconciler: &PeeringReconciler,
    sessions: &NeighborTable,
    mut baseline: Snapshot,
    period: Duration,
) -> FatalReason {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // First tick fires immediately, right after initialization
    ticker.tick().await;
    loop {
        ticker.tick().await;
        match reconciler.run_cycle(&baseline).await {
            CycleOutcome::Completed {
                baseline: next,
                report,
            } => {
                if report.has_changes() {
                    for neighbor in sessions.neighbors().await {
                        debug!("  {}", neighbor);
                    }
                }
                baseline = next;
            }
            CycleOutcome::Aborted(err) => {
                warn!("Peering cycle aborted, retrying next interval: {}", err);
            }
            CycleOutcome::Fatal(reason) => return reason,
        }
    }
}

async fn poll_pools(pools: Arc<PoolCache>, mut baseline: Snapshot, period: Duration) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await;
    loop {
        ticker.tick().await;
        match pools.run_pool_cycle(&baseline).await {
            CycleOutcome::Completed {
                baseline: next,
                report,
            } => {
                if report.has_changes() {
                    for pool in pools.pools().await {
                        debug!("  {}", pool);
                    }
                } else {
                    trace!("IP pools unchanged");
                }
                baseline = next;
            }
            CycleOutcome::Aborted(err) => {
                warn!("Pool cycle aborted, retrying next interval: {}", err);
            }
            CycleOutcome::Fatal(reason) => {
                error!("Unexpected pool cycle result: {}", reason);
            }
        }
    }
}
