//! Edge-kind and lifecycle history of allocation sites across a window

use leakscope_core::{
    AllocationSite, EdgeKind, EventKind, ObjectId, RefGraph, ReferenceEdge, SnapshotDiff,
    SnapshotWindow,
};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

/// Structural evidence about one site, gathered over a snapshot window.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EdgeHistory {
    pub site: AllocationSite,
    /// Objects from the site in the newest snapshot.
    pub object_count: usize,
    /// Retaining edges into the site's objects in the newest snapshot.
    pub incoming: BTreeMap<EdgeKind, usize>,
    /// Edges into the site's objects that disappeared between consecutive snapshots.
    pub removed: BTreeMap<EdgeKind, usize>,
    pub events: BTreeMap<EventKind, usize>,
    /// Detach events for the site.
    pub detached: usize,
    /// Some detach target was reachable from a root without going through a
    /// listener edge after it was detached.
    pub detach_target_rooted: bool,
    /// Site objects on a strong reference cycle in the newest snapshot.
    pub cycle_members: usize,
}

impl EdgeHistory {
    pub fn new(site: AllocationSite) -> Self {
        EdgeHistory { site, ..Default::default() }
    }

    pub fn retaining_total(&self) -> usize {
        self.incoming.values().sum()
    }

    /// Share of retaining edges of `kind`. Zero when nothing retains the site.
    pub fn kind_fraction(&self, kind: EdgeKind) -> f64 {
        let total = self.retaining_total();
        if total == 0 {
            return 0.0;
        }
        self.incoming.get(&kind).copied().unwrap_or(0) as f64 / total as f64
    }

    pub fn event_count(&self, kind: EventKind) -> usize {
        self.events.get(&kind).copied().unwrap_or(0)
    }

    pub fn removed_count(&self, kind: EdgeKind) -> usize {
        self.removed.get(&kind).copied().unwrap_or(0)
    }

    /// The retaining kind with the most edges, ties to the lower kind.
    pub fn dominant_kind(&self) -> Option<EdgeKind> {
        self.incoming
            .iter()
            .max_by(|a, b| a.1.cmp(b.1).then(b.0.cmp(a.0)))
            .map(|(&kind, _)| kind)
    }

    /// Objects from the site were let go during the window: the dominant
    /// retaining kind lost edges, or an evict, cancel, unsubscribe or nulling
    /// event names the site. Detaches do not count.
    pub fn shows_release(&self) -> bool {
        let dropped = self
            .dominant_kind()
            .is_some_and(|kind| self.removed_count(kind) > 0);
        dropped
            || [
                EventKind::Evict,
                EventKind::TimerCancel,
                EventKind::Unsubscribe,
                EventKind::Nulled,
            ]
            .into_iter()
            .any(|kind| self.event_count(kind) > 0)
    }
}

/// Window-wide structures shared by every site's history: consecutive diffs,
/// the newest graph and per-snapshot reachability.
pub struct HistoryIndex<'w> {
    window: &'w SnapshotWindow,
    removed: Vec<BTreeSet<ReferenceEdge>>,
    incoming: HashMap<ObjectId, Vec<EdgeKind>>,
    on_cycle: HashSet<ObjectId>,
    rooted_without_listeners: Vec<HashSet<ObjectId>>,
}

impl<'w> HistoryIndex<'w> {
    pub fn new(window: &'w SnapshotWindow) -> Self {
        let snapshots: Vec<_> = window.iter().collect();

        let removed = snapshots
            .windows(2)
            .map(|pair| SnapshotDiff::between(pair[0], pair[1]).all_removed_edges())
            .collect();

        let mut incoming: HashMap<ObjectId, Vec<EdgeKind>> = HashMap::new();
        let mut on_cycle = HashSet::new();
        if let Some(newest) = window.last() {
            for edge in newest.edges() {
                if edge.kind.retains() {
                    incoming.entry(edge.to).or_default().push(edge.kind);
                }
            }
            on_cycle = RefGraph::from_snapshot(newest)
                .strong_cycles()
                .into_iter()
                .flatten()
                .collect();
        }

        // Only needed to judge detach events.
        let any_detach = snapshots
            .iter()
            .any(|s| s.events().iter().any(|e| e.kind == EventKind::Detach));
        let rooted_without_listeners = if any_detach {
            snapshots
                .iter()
                .map(|s| RefGraph::from_snapshot(s).reachable_from_roots(&[EdgeKind::Listener]))
                .collect()
        } else {
            Vec::new()
        };

        HistoryIndex {
            window,
            removed,
            incoming,
            on_cycle,
            rooted_without_listeners,
        }
    }

    pub fn history(&self, site: &AllocationSite) -> EdgeHistory {
        let mut history = EdgeHistory::new(site.clone());
        let snapshots: Vec<_> = self.window.iter().collect();

        if let Some(newest) = snapshots.last() {
            for node in newest.objects_at(site) {
                history.object_count += 1;
                if self.on_cycle.contains(&node.id) {
                    history.cycle_members += 1;
                }
                for &kind in self.incoming.get(&node.id).into_iter().flatten() {
                    *history.incoming.entry(kind).or_insert(0) += 1;
                }
            }
        }

        for (prev, removed) in snapshots.iter().zip(&self.removed) {
            for edge in removed {
                if prev.node(edge.to).is_some_and(|n| &n.site == site) {
                    *history.removed.entry(edge.kind).or_insert(0) += 1;
                }
            }
        }

        for (position, snapshot) in snapshots.iter().enumerate() {
            for event in snapshot.events().iter().filter(|e| &e.site == site) {
                *history.events.entry(event.kind).or_insert(0) += 1;
                if event.kind != EventKind::Detach {
                    continue;
                }
                history.detached += 1;
                let Some(target) = event.target else { continue };
                let rooted_later = snapshots[position..]
                    .iter()
                    .zip(&self.rooted_without_listeners[position..])
                    .any(|(later, rooted)| later.contains(target) && rooted.contains(&target));
                history.detach_target_rooted |= rooted_later;
            }
        }

        history
    }
}
