use std::sync::Arc;

use log::{debug, info, warn};

use crate::cycle::{Cycle, CycleError, CycleOutcome, CycleReport, CycleState, FatalReason};
use crate::error::ApplyError;
use crate::keys::{InterpretedKey, KeyInterpreter, KeyLayout};
use crate::neighbor::{NeighborBuilder, Op};
use crate::session::SessionManager;
use crate::snapshot::{diff, Change, Snapshot};
use crate::source::SnapshotSource;
use crate::view::ConfigView;

/// Keeps the session manager's neighbors in line with the peering config.
///
/// The reconciler holds no baseline of its own: the caller passes the last
/// committed snapshot in and keeps whatever a completed cycle hands back.
pub struct PeeringReconciler {
    layout: KeyLayout,
    interpreter: KeyInterpreter,
    source: Arc<dyn SnapshotSource>,
    sessions: Arc<dyn SessionManager>,
}

impl PeeringReconciler {
    pub fn new(
        layout: KeyLayout,
        node: &str,
        source: Arc<dyn SnapshotSource>,
        sessions: Arc<dyn SessionManager>,
    ) -> Self {
        let interpreter = KeyInterpreter::new(&layout, node);
        Self {
            layout,
            interpreter,
            source,
            sessions,
        }
    }

    pub fn node(&self) -> &str {
        self.interpreter.node()
    }

    /// Derive and add every neighbor from a fresh snapshot.
    /// Returns the snapshot to use as the first baseline.
    pub async fn initialize(&self) -> Result<Snapshot, CycleError> {
        let snapshot = self.source.fetch_peering_snapshot().await?;
        let view = ConfigView::new(&self.layout, &snapshot, self.node());
        let neighbors = view.all_neighbors()?;
        info!(
            "Initial sync for {}: {} keys, {} neighbors",
            self.node(),
            snapshot.len(),
            neighbors.len()
        );
        for neighbor in &neighbors {
            self.sessions.add_session(neighbor).await?;
        }
        Ok(snapshot)
    }

    /// One fetch/diff/apply pass against `baseline`
    pub async fn run_cycle(&self, baseline: &Snapshot) -> CycleOutcome {
        let mut cycle = Cycle::start("Peering");
        let current = match self.source.fetch_peering_snapshot().await {
            Ok(snapshot) => snapshot,
            Err(err) => return cycle.abort(err.into()),
        };

        cycle.update_state(CycleState::Diffing);
        let delta = diff(baseline, &current).sorted();
        let mut report = CycleReport::from_delta(&delta);
        if delta.is_empty() {
            return cycle.commit(current, report);
        }
        debug!("Peering config changed: {}", delta);

        let changes: Vec<(Change, &String, InterpretedKey)> = delta
            .changes()
            .map(|(change, key)| (change, key, self.interpreter.interpret(key)))
            .collect();
        if let Some(reason) = changes.iter().find_map(|(_, key, i)| fatal_reason(key, i)) {
            return CycleOutcome::Fatal(reason);
        }

        cycle.update_state(CycleState::Applying);
        let view = ConfigView::new(&self.layout, &current, self.node());
        let builder = NeighborBuilder::new(&view);
        for (change, key, interpreted) in changes.iter() {
            let (value, previous) = match change {
                Change::Added => (current.get(*key), None),
                Change::Updated => (current.get(*key), baseline.get(*key)),
                Change::Removed => (baseline.get(*key), None),
            };
            let value = value.map(String::as_str).unwrap_or_default();
            let previous = previous.map(String::as_str);
            let ops = match builder.build(*change, key, interpreted, value, previous) {
                Ok(ops) => ops,
                Err(err) => {
                    warn!("Skipping {} key {}: {}", change, key, err);
                    report.skipped += 1;
                    continue;
                }
            };
            for op in ops {
                debug!("{} {}: {}", change, key, op);
                if let Err(err) = self.apply(&op).await {
                    return cycle.abort(err.into());
                }
                report.operations += 1;
            }
        }
        info!("Peering config reconciled: {}", report);
        cycle.commit(current, report)
    }

    async fn apply(&self, op: &Op) -> Result<(), ApplyError> {
        match op {
            Op::Add(neighbor) => self.sessions.add_session(neighbor).await,
            Op::Remove(address) => self.sessions.remove_session(*address).await,
        }
    }
}

fn fatal_reason(key: &str, interpreted: &InterpretedKey) -> Option<FatalReason> {
    match interpreted {
        InterpretedKey::LocalIdentity => Some(FatalReason::LocalIdentityChanged(key.to_string())),
        InterpretedKey::GlobalAs => Some(FatalReason::GlobalAsChanged(key.to_string())),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::neighbor::{Neighbor, NeighborKind};
    use crate::snapshot::snapshot_from;
    use crate::testing::{Call, MemorySource, RecordingSessions};

    fn reconciler(
        source: &Arc<MemorySource>,
        sessions: &Arc<RecordingSessions>,
    ) -> PeeringReconciler {
        PeeringReconciler::new(
            KeyLayout::new("global", "allnodes"),
            "n0",
            source.clone(),
            sessions.clone(),
        )
    }

    fn mesh(addr: &str, asn: u32) -> Call {
        Call::Add(Neighbor::new(NeighborKind::Mesh, addr.parse().unwrap(), asn))
    }

    fn remove(addr: &str) -> Call {
        Call::Remove(addr.parse().unwrap())
    }

    #[tokio::test]
    async fn test_unchanged_global_as() {
        let baseline = snapshot_from(&[("global/as_num", "64512")]);
        let source = Arc::new(MemorySource::new(baseline.clone()));
        let sessions = Arc::new(RecordingSessions::new());
        let outcome = reconciler(&source, &sessions).run_cycle(&baseline).await;
        match outcome {
            CycleOutcome::Completed { baseline: next, report } => {
                assert_eq!(next, baseline);
                assert!(!report.has_changes());
            }
            other => panic!("Unexpected outcome: {:?}", other),
        }
        assert!(sessions.calls().is_empty());
    }

    #[tokio::test]
    async fn test_global_as_change_is_fatal() {
        let baseline = snapshot_from(&[
            ("global/as_num", "64512"),
            ("allnodes/n2/ip_addr_v4", "10.0.0.2"),
        ]);
        let source = Arc::new(MemorySource::new(snapshot_from(&[
            ("global/as_num", "64513"),
            ("allnodes/n2/ip_addr_v4", "10.0.0.9"),
            ("allnodes/n3/ip_addr_v4", "10.0.0.3"),
        ])));
        let sessions = Arc::new(RecordingSessions::new());
        let outcome = reconciler(&source, &sessions).run_cycle(&baseline).await;
        assert!(matches!(
            outcome,
            CycleOutcome::Fatal(FatalReason::GlobalAsChanged(ref key)) if key == "global/as_num"
        ));
        assert!(sessions.calls().is_empty());
    }

    #[tokio::test]
    async fn test_local_identity_change_is_fatal() {
        let baseline = snapshot_from(&[("allnodes/n0/ip_addr_v4", "10.0.0.1")]);
        let source = Arc::new(MemorySource::new(snapshot_from(&[(
            "allnodes/n0/ip_addr_v4",
            "10.0.0.100",
        )])));
        let sessions = Arc::new(RecordingSessions::new());
        let outcome = reconciler(&source, &sessions).run_cycle(&baseline).await;
        assert!(matches!(
            outcome,
            CycleOutcome::Fatal(FatalReason::LocalIdentityChanged(_))
        ));
        assert!(sessions.calls().is_empty());
    }

    #[tokio::test]
    async fn test_node_address_added() {
        let baseline = snapshot_from(&[("global/as_num", "64512"), ("allnodes/n1/as_num", "65001")]);
        let mut current = baseline.clone();
        current.insert("allnodes/n1/ip_addr_v4".into(), "10.0.0.5".into());
        let source = Arc::new(MemorySource::new(current));
        let sessions = Arc::new(RecordingSessions::new());
        let outcome = reconciler(&source, &sessions).run_cycle(&baseline).await;
        assert!(outcome.is_completed());
        assert_eq!(sessions.calls(), vec![mesh("10.0.0.5", 65001)]);
        assert_eq!(
            sessions.table_labels().await,
            vec!["Mesh_10_0_0_5".to_string()]
        );
    }

    #[tokio::test]
    async fn test_address_update_removes_old_first() {
        let baseline = snapshot_from(&[
            ("global/as_num", "64512"),
            ("allnodes/n2/ip_addr_v4", "10.0.0.5"),
        ]);
        let current = snapshot_from(&[
            ("global/as_num", "64512"),
            ("allnodes/n2/ip_addr_v4", "10.0.0.6"),
        ]);
        let source = Arc::new(MemorySource::new(baseline.clone()));
        let sessions = Arc::new(RecordingSessions::new());
        let reconciler = reconciler(&source, &sessions);
        reconciler.initialize().await.unwrap();
        assert_eq!(sessions.table_addresses().await, vec!["10.0.0.5".to_string()]);
        source.set(current);
        sessions.clear_calls();

        let outcome = reconciler.run_cycle(&baseline).await;
        assert!(outcome.is_completed());
        assert_eq!(
            sessions.calls(),
            vec![remove("10.0.0.5"), mesh("10.0.0.6", 64512)]
        );
        let addrs = sessions.table_addresses().await;
        assert_eq!(addrs, vec!["10.0.0.6".to_string()]);
    }

    #[tokio::test]
    async fn test_repeated_add_is_idempotent() {
        let baseline = snapshot_from(&[("global/as_num", "64512")]);
        let current = snapshot_from(&[
            ("global/as_num", "64512"),
            ("allnodes/n2/ip_addr_v4", "10.0.0.5"),
        ]);
        let source = Arc::new(MemorySource::new(current));
        let sessions = Arc::new(RecordingSessions::new());
        let reconciler = reconciler(&source, &sessions);
        // Re-running against the same baseline re-applies the same delta
        assert!(reconciler.run_cycle(&baseline).await.is_completed());
        let once = sessions.table_addresses().await;
        assert!(reconciler.run_cycle(&baseline).await.is_completed());
        assert_eq!(sessions.table_addresses().await, once);
        assert_eq!(sessions.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_mesh_disabled_removes_every_mesh_neighbor() {
        let baseline = snapshot_from(&[
            ("global/as_num", "64512"),
            ("global/node_mesh", r#"{"enabled":true}"#),
            ("allnodes/n2/ip_addr_v4", "10.0.0.2"),
            ("allnodes/n3/ip_addr_v4", "10.0.0.3"),
            ("allnodes/n3/ip_addr_v6", "fd00::3"),
        ]);
        let mut current = baseline.clone();
        current.insert("global/node_mesh".into(), r#"{"enabled":false}"#.into());
        let source = Arc::new(MemorySource::new(current));
        let sessions = Arc::new(RecordingSessions::new());
        let outcome = reconciler(&source, &sessions).run_cycle(&baseline).await;
        assert!(outcome.is_completed());
        assert_eq!(
            sessions.calls(),
            vec![remove("10.0.0.2"), remove("10.0.0.3"), remove("fd00::3")]
        );
    }

    #[tokio::test]
    async fn test_fetch_failure_aborts() {
        let baseline = snapshot_from(&[("global/as_num", "64512")]);
        let source = Arc::new(MemorySource::new(baseline.clone()));
        source.fail_next();
        let sessions = Arc::new(RecordingSessions::new());
        let outcome = reconciler(&source, &sessions).run_cycle(&baseline).await;
        assert!(matches!(outcome, CycleOutcome::Aborted(CycleError::Fetch(_))));
        assert!(sessions.calls().is_empty());
    }

    #[tokio::test]
    async fn test_apply_failure_aborts_and_retries() {
        let baseline = snapshot_from(&[("global/as_num", "64512")]);
        let current = snapshot_from(&[
            ("global/as_num", "64512"),
            ("allnodes/n2/ip_addr_v4", "10.0.0.2"),
            ("allnodes/n3/ip_addr_v4", "10.0.0.3"),
        ]);
        let source = Arc::new(MemorySource::new(current.clone()));
        let sessions = Arc::new(RecordingSessions::new());
        sessions.fail_on("10.0.0.3".parse().unwrap());
        let reconciler = reconciler(&source, &sessions);

        let outcome = reconciler.run_cycle(&baseline).await;
        assert!(matches!(outcome, CycleOutcome::Aborted(CycleError::Apply(_))));

        // Baseline wasn't committed, the next cycle retries the whole delta
        sessions.clear_failure();
        match reconciler.run_cycle(&baseline).await {
            CycleOutcome::Completed { baseline: next, report } => {
                assert_eq!(next, current);
                assert_eq!(report.operations, 2);
            }
            other => panic!("Unexpected outcome: {:?}", other),
        }
        assert_eq!(
            sessions.table_addresses().await,
            vec!["10.0.0.2".to_string(), "10.0.0.3".to_string()]
        );
    }

    #[tokio::test]
    async fn test_data_errors_skip_only_the_key() {
        let baseline = snapshot_from(&[]);
        let current = snapshot_from(&[
            ("allnodes/n2/ip_addr_v4", "10.0.0.2"),
            ("allnodes/n3/ip_addr_v4", "10.0.0.3"),
            ("allnodes/n3/as_num", "65003"),
            ("global/peer_v4/10.9.9.9", "{broken"),
            ("some/other/key", "ignored"),
        ]);
        let source = Arc::new(MemorySource::new(current));
        let sessions = Arc::new(RecordingSessions::new());
        match reconciler(&source, &sessions).run_cycle(&baseline).await {
            CycleOutcome::Completed { report, .. } => {
                // n2 has no AS anywhere, and the global peer is malformed
                assert_eq!(report.skipped, 2);
                assert_eq!(report.added, 5);
            }
            other => panic!("Unexpected outcome: {:?}", other),
        }
        assert_eq!(sessions.table_addresses().await, vec!["10.0.0.3".to_string()]);
    }

    #[tokio::test]
    async fn test_peer_lifecycle() {
        let peer = r#"{"ip":"192.168.1.1","as_num":64600}"#;
        let moved = r#"{"ip":"192.168.1.1","as_num":64601}"#;
        let s0 = snapshot_from(&[("global/as_num", "64512")]);
        let s1 = snapshot_from(&[("global/as_num", "64512"), ("global/peer_v4/192.168.1.1", peer)]);
        let s2 = snapshot_from(&[("global/as_num", "64512"), ("global/peer_v4/192.168.1.1", moved)]);
        let source = Arc::new(MemorySource::new(s1.clone()));
        let sessions = Arc::new(RecordingSessions::new());
        let reconciler = reconciler(&source, &sessions);

        let mut baseline = s0.clone();
        for next in vec![s1, s2, s0] {
            source.set(next);
            match reconciler.run_cycle(&baseline).await {
                CycleOutcome::Completed { baseline: b, .. } => baseline = b,
                other => panic!("Unexpected outcome: {:?}", other),
            }
        }
        let global = |asn| Call::Add(Neighbor::new(NeighborKind::Global, "192.168.1.1".parse().unwrap(), asn));
        assert_eq!(
            sessions.calls(),
            vec![
                global(64600),
                remove("192.168.1.1"),
                global(64601),
                remove("192.168.1.1")
            ]
        );
        assert!(sessions.table_addresses().await.is_empty());
    }

    #[tokio::test]
    async fn test_initialize() {
        let snapshot = snapshot_from(&[
            ("global/as_num", "64512"),
            ("allnodes/n0/ip_addr_v4", "10.0.0.1"),
            ("allnodes/n2/ip_addr_v4", "10.0.0.2"),
            ("allnodes/n0/peer_v4/192.168.5.5", r#"{"ip":"192.168.5.5","as_num":64999}"#),
        ]);
        let source = Arc::new(MemorySource::new(snapshot.clone()));
        let sessions = Arc::new(RecordingSessions::new());
        let baseline = reconciler(&source, &sessions).initialize().await.unwrap();
        assert_eq!(baseline, snapshot);
        assert_eq!(
            sessions.table_labels().await,
            vec!["Mesh_10_0_0_2".to_string(), "Node_192_168_5_5".to_string()]
        );
    }
}
