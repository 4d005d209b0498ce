use std::fmt;

use log::trace;
use thiserror::Error;

use crate::error::{ApplyError, DataError, PoolError, SourceError};
use crate::snapshot::{Delta, Snapshot};

#[derive(Debug, Copy, Clone, PartialEq)]
pub enum CycleState {
    Fetching,
    Diffing,
    Applying,
    Committed,
    Aborted,
}

impl fmt::Display for CycleState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let word = match self {
            CycleState::Fetching => "Fetching",
            CycleState::Diffing => "Diffing",
            CycleState::Applying => "Applying",
            CycleState::Committed => "Committed",
            CycleState::Aborted => "Aborted",
        };
        write!(f, "{}", word)
    }
}

/// Tracks which phase a poll cycle is in, for logging
#[derive(Debug)]
pub(crate) struct Cycle {
    stream: &'static str,
    state: CycleState,
}

impl Cycle {
    pub(crate) fn start(stream: &'static str) -> Self {
        trace!("{} cycle: {}", stream, CycleState::Fetching);
        Self {
            stream,
            state: CycleState::Fetching,
        }
    }

    pub(crate) fn update_state(&mut self, new_state: CycleState) {
        trace!(
            "{} cycle went from {} to {}",
            self.stream,
            self.state,
            new_state
        );
        self.state = new_state;
    }

    pub(crate) fn abort(mut self, err: CycleError) -> CycleOutcome {
        self.update_state(CycleState::Aborted);
        CycleOutcome::Aborted(err)
    }

    pub(crate) fn commit(mut self, baseline: Snapshot, report: CycleReport) -> CycleOutcome {
        self.update_state(CycleState::Committed);
        CycleOutcome::Completed { baseline, report }
    }
}

/// Why a cycle stopped without committing a new baseline
#[derive(Debug, Error)]
pub enum CycleError {
    #[error(transparent)]
    Fetch(#[from] SourceError),
    #[error(transparent)]
    Apply(#[from] ApplyError),
    #[error(transparent)]
    Data(#[from] DataError),
    #[error(transparent)]
    Pool(#[from] PoolError),
}

/// Changes that can't be repaired online; the process must restart
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FatalReason {
    LocalIdentityChanged(String),
    GlobalAsChanged(String),
}

impl std::error::Error for FatalReason {}

impl fmt::Display for FatalReason {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            FatalReason::LocalIdentityChanged(key) => {
                write!(f, "Local node config changed ({}), restart required", key)
            }
            FatalReason::GlobalAsChanged(key) => {
                write!(f, "Global AS number changed ({}), restart required", key)
            }
        }
    }
}

#[derive(Debug)]
pub enum CycleOutcome {
    /// `baseline` is the snapshot the next cycle must diff against
    Completed {
        baseline: Snapshot,
        report: CycleReport,
    },
    /// Baseline is unchanged, the same delta is retried next interval
    Aborted(CycleError),
    Fatal(FatalReason),
}

impl CycleOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, CycleOutcome::Completed { .. })
    }
}

/// What a completed cycle did
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CycleReport {
    pub added: usize,
    pub updated: usize,
    pub removed: usize,
    pub unchanged: usize,
    /// Session (or pool) operations applied
    pub operations: usize,
    /// Keys rejected as data errors
    pub skipped: usize,
}

impl CycleReport {
    pub fn from_delta(delta: &Delta) -> Self {
        Self {
            added: delta.added.len(),
            updated: delta.updated.len(),
            removed: delta.removed.len(),
            unchanged: delta.unchanged.len(),
            ..Default::default()
        }
    }

    pub fn has_changes(&self) -> bool {
        self.added + self.updated + self.removed > 0
    }
}

impl fmt::Display for CycleReport {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} added, {} updated, {} removed, {} unchanged; {} operations applied, {} skipped",
            self.added, self.updated, self.removed, self.unchanged, self.operations, self.skipped
        )
    }
}
