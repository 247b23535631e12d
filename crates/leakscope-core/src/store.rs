//! Versioned, append-only snapshot store with a bounded retention window

use crate::diff::SnapshotDiff;
use crate::error::StoreError;
use crate::model::*;
use parking_lot::RwLock;
use std::collections::{BTreeSet, VecDeque};
use std::sync::Arc;
use tracing::{debug, error};

/// Shared read-only handle on a committed snapshot. While any lease is alive
/// the snapshot stays in the store.
pub type SnapshotLease = Arc<Snapshot>;

/// An ordered run of leased snapshots, oldest first.
#[derive(Debug, Clone, Default)]
pub struct SnapshotWindow {
    snapshots: Vec<SnapshotLease>,
}

impl SnapshotWindow {
    pub fn new(snapshots: Vec<SnapshotLease>) -> Self {
        SnapshotWindow { snapshots }
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Snapshot> {
        self.snapshots.iter().map(|s| s.as_ref())
    }

    pub fn first(&self) -> Option<&Snapshot> {
        self.snapshots.first().map(|s| s.as_ref())
    }

    pub fn last(&self) -> Option<&Snapshot> {
        self.snapshots.last().map(|s| s.as_ref())
    }

    pub fn ids(&self) -> Vec<SnapshotId> {
        self.snapshots.iter().map(|s| s.id()).collect()
    }

    /// Every allocation site seen anywhere in the window.
    pub fn sites(&self) -> BTreeSet<AllocationSite> {
        self.snapshots
            .iter()
            .flat_map(|s| s.sites().into_iter().cloned())
            .collect()
    }

    /// The newest `n` snapshots.
    pub fn tail(&self, n: usize) -> SnapshotWindow {
        let start = self.snapshots.len().saturating_sub(n);
        SnapshotWindow::new(self.snapshots[start..].to_vec())
    }
}

struct StoreState {
    window: VecDeque<SnapshotLease>,
    last: Option<SnapshotId>,
}

/// The Reference Graph Store. `commit` is linearizable through a single
/// writer lock; reads hand out leases and never block on analysis work.
pub struct GraphStore {
    retention: usize,
    state: RwLock<StoreState>,
}

impl std::fmt::Debug for GraphStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        f.debug_struct("GraphStore")
            .field("retention", &self.retention)
            .field("len", &state.window.len())
            .field("last", &state.last)
            .finish()
    }
}

impl GraphStore {
    /// Create a store keeping at most `retention` unleased snapshots.
    pub fn new(retention: usize) -> Self {
        GraphStore {
            retention: retention.max(1),
            state: RwLock::new(StoreState {
                window: VecDeque::new(),
                last: None,
            }),
        }
    }

    pub fn retention(&self) -> usize {
        self.retention
    }

    /// Append a snapshot. Its sequence number must exceed the last committed one.
    pub fn commit(&self, snapshot: Snapshot) -> Result<SnapshotId, StoreError> {
        let id = snapshot.id();
        let mut state = self.state.write();

        if let Some(last) = state.last {
            if id <= last {
                return Err(StoreError::OutOfOrderSnapshot { seq: id, last });
            }
        }

        debug!(
            "Committing snapshot {} ({} objects, {} edges)",
            id,
            snapshot.node_count(),
            snapshot.edge_count()
        );
        state.window.push_back(Arc::new(snapshot));
        state.last = Some(id);
        self.evict_expired(&mut state);

        Ok(id)
    }

    /// Drop the oldest snapshots beyond the retention count. Stops at the
    /// first leased snapshot so the window stays contiguous.
    fn evict_expired(&self, state: &mut StoreState) {
        while state.window.len() > self.retention {
            let Some(front) = state.window.front() else { break };
            if Arc::strong_count(front) > 1 {
                debug!("Eviction of snapshot {} deferred: still leased", front.id());
                break;
            }
            match Self::evict_front(state) {
                Ok(id) => debug!("Evicted snapshot {}", id),
                Err(e) => {
                    error!("Store invariant violated: {}", e);
                    debug_assert!(false, "{e}");
                    break;
                }
            }
        }
    }

    fn evict_front(state: &mut StoreState) -> Result<SnapshotId, StoreError> {
        let Some(front) = state.window.pop_front() else {
            return Err(StoreError::EvictionConflict { id: SnapshotId::default() });
        };
        let id = front.id();
        match Arc::try_unwrap(front) {
            Ok(_) => Ok(id),
            Err(still_leased) => {
                state.window.push_front(still_leased);
                Err(StoreError::EvictionConflict { id })
            }
        }
    }

    /// Lease a committed snapshot.
    pub fn get(&self, id: SnapshotId) -> Result<SnapshotLease, StoreError> {
        let state = self.state.read();
        state
            .window
            .binary_search_by_key(&id, |s| s.id())
            .map(|pos| Arc::clone(&state.window[pos]))
            .map_err(|_| StoreError::UnknownSnapshot { id })
    }

    /// Lease every retained snapshot.
    pub fn window(&self) -> SnapshotWindow {
        let state = self.state.read();
        SnapshotWindow::new(state.window.iter().cloned().collect())
    }

    /// Lease the newest `n` snapshots.
    pub fn latest(&self, n: usize) -> SnapshotWindow {
        let state = self.state.read();
        let skip = state.window.len().saturating_sub(n);
        SnapshotWindow::new(state.window.iter().skip(skip).cloned().collect())
    }

    /// Diff two committed snapshots. Both are leased for the duration, so a
    /// concurrent commit cannot evict them mid-diff.
    pub fn diff(&self, from: SnapshotId, to: SnapshotId) -> Result<SnapshotDiff, StoreError> {
        let (old, new) = {
            let state = self.state.read();
            let lease = |id: SnapshotId| {
                state
                    .window
                    .binary_search_by_key(&id, |s| s.id())
                    .map(|pos| Arc::clone(&state.window[pos]))
                    .map_err(|_| StoreError::UnknownSnapshot { id })
            };
            (lease(from)?, lease(to)?)
        };
        Ok(SnapshotDiff::between(&old, &new))
    }

    pub fn last_committed(&self) -> Option<SnapshotId> {
        self.state.read().last
    }

    pub fn len(&self) -> usize {
        self.state.read().window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.read().window.is_empty()
    }
}
