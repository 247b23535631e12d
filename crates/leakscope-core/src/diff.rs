//! Snapshot diff computation and composition

use crate::error::StoreError;
use crate::model::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Retained-size change of an object present on both sides of a diff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resize {
    pub before: u64,
    pub after: u64,
}

/// A `(from, to)` reference whose kind changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Reclassified {
    pub from: ObjectId,
    pub to: ObjectId,
    pub before: EdgeKind,
    pub after: EdgeKind,
}

impl Reclassified {
    fn before_edge(&self) -> ReferenceEdge {
        ReferenceEdge::new(self.from, self.to, self.before)
    }

    fn after_edge(&self) -> ReferenceEdge {
        ReferenceEdge::new(self.from, self.to, self.after)
    }
}

/// Changes between two committed snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotDiff {
    pub from: SnapshotId,
    pub to: SnapshotId,
    /// Objects only in `to`, with their retained size there.
    pub added_nodes: BTreeMap<ObjectId, u64>,
    /// Objects only in `from`, with their retained size there.
    pub removed_nodes: BTreeMap<ObjectId, u64>,
    pub resized_nodes: BTreeMap<ObjectId, Resize>,
    pub added_edges: BTreeSet<ReferenceEdge>,
    pub removed_edges: BTreeSet<ReferenceEdge>,
    pub reclassified_edges: Vec<Reclassified>,
}

impl SnapshotDiff {
    /// Create an empty diff between two snapshot ids.
    pub fn new(from: SnapshotId, to: SnapshotId) -> Self {
        SnapshotDiff {
            from,
            to,
            added_nodes: BTreeMap::new(),
            removed_nodes: BTreeMap::new(),
            resized_nodes: BTreeMap::new(),
            added_edges: BTreeSet::new(),
            removed_edges: BTreeSet::new(),
            reclassified_edges: Vec::new(),
        }
    }

    /// Compute the difference between two snapshots.
    pub fn between(old: &Snapshot, new: &Snapshot) -> Self {
        let mut diff = SnapshotDiff::new(old.id(), new.id());

        for node in new.nodes() {
            match old.node(node.id) {
                None => {
                    diff.added_nodes.insert(node.id, node.retained_size);
                }
                Some(previous) if previous.retained_size != node.retained_size => {
                    diff.resized_nodes.insert(
                        node.id,
                        Resize {
                            before: previous.retained_size,
                            after: node.retained_size,
                        },
                    );
                }
                Some(_) => {}
            }
        }

        for node in old.nodes() {
            if !new.contains(node.id) {
                diff.removed_nodes.insert(node.id, node.retained_size);
            }
        }

        let old_edges: BTreeSet<ReferenceEdge> = old.edges().iter().copied().collect();
        let new_edges: BTreeSet<ReferenceEdge> = new.edges().iter().copied().collect();
        diff.set_edges(
            new_edges.difference(&old_edges).copied().collect(),
            old_edges.difference(&new_edges).copied().collect(),
        );

        diff
    }

    /// Net diff of `self` followed by `next`. Equal to diffing the outer
    /// snapshots directly.
    pub fn compose(&self, next: &SnapshotDiff) -> Result<SnapshotDiff, StoreError> {
        if self.to != next.from {
            return Err(StoreError::NonAdjacentDiffs {
                first_to: self.to,
                second_from: next.from,
            });
        }

        let mut diff = SnapshotDiff::new(self.from, next.to);

        let touched: BTreeSet<ObjectId> = self
            .touched_nodes()
            .chain(next.touched_nodes())
            .collect();
        for id in touched {
            let (start, end) = match (self.node_transition(id), next.node_transition(id)) {
                (Some((start, _)), Some((_, end))) => (start, end),
                (Some(transition), None) | (None, Some(transition)) => transition,
                (None, None) => continue,
            };
            match (start, end) {
                (None, Some(size)) => {
                    diff.added_nodes.insert(id, size);
                }
                (Some(size), None) => {
                    diff.removed_nodes.insert(id, size);
                }
                (Some(before), Some(after)) if before != after => {
                    diff.resized_nodes.insert(id, Resize { before, after });
                }
                _ => {}
            }
        }

        let (first_added, first_removed) = self.edge_sets();
        let (next_added, next_removed) = next.edge_sets();
        let mut added = BTreeSet::new();
        let mut removed = BTreeSet::new();
        let candidates: BTreeSet<ReferenceEdge> = first_added
            .iter()
            .chain(&first_removed)
            .chain(&next_added)
            .chain(&next_removed)
            .copied()
            .collect();
        for edge in candidates {
            let first = edge_transition(&first_added, &first_removed, &edge);
            let second = edge_transition(&next_added, &next_removed, &edge);
            let (start, end) = match (first, second) {
                (Some((start, _)), Some((_, end))) => (start, end),
                (Some(transition), None) | (None, Some(transition)) => transition,
                (None, None) => continue,
            };
            match (start, end) {
                (false, true) => {
                    added.insert(edge);
                }
                (true, false) => {
                    removed.insert(edge);
                }
                _ => {}
            }
        }
        diff.set_edges(added, removed);

        Ok(diff)
    }

    /// Check if this diff is empty (no changes).
    pub fn is_empty(&self) -> bool {
        self.added_nodes.is_empty()
            && self.removed_nodes.is_empty()
            && self.resized_nodes.is_empty()
            && self.added_edges.is_empty()
            && self.removed_edges.is_empty()
            && self.reclassified_edges.is_empty()
    }

    /// Every edge absent before and present after, reclassified ones included.
    pub fn all_added_edges(&self) -> BTreeSet<ReferenceEdge> {
        self.edge_sets().0
    }

    /// Every edge present before and absent after, reclassified ones included.
    pub fn all_removed_edges(&self) -> BTreeSet<ReferenceEdge> {
        self.edge_sets().1
    }

    fn edge_sets(&self) -> (BTreeSet<ReferenceEdge>, BTreeSet<ReferenceEdge>) {
        let mut added = self.added_edges.clone();
        let mut removed = self.removed_edges.clone();
        for change in &self.reclassified_edges {
            added.insert(change.after_edge());
            removed.insert(change.before_edge());
        }
        (added, removed)
    }

    /// Split net edge changes into plain additions/removals and
    /// reclassifications of the same `(from, to)` pair. Kinds are paired in
    /// ascending order so the split is deterministic.
    fn set_edges(&mut self, added: BTreeSet<ReferenceEdge>, removed: BTreeSet<ReferenceEdge>) {
        let mut added_by_pair: BTreeMap<(ObjectId, ObjectId), Vec<EdgeKind>> = BTreeMap::new();
        for edge in &added {
            added_by_pair.entry((edge.from, edge.to)).or_default().push(edge.kind);
        }

        let mut removed_by_pair: BTreeMap<(ObjectId, ObjectId), Vec<EdgeKind>> = BTreeMap::new();
        for edge in &removed {
            removed_by_pair.entry((edge.from, edge.to)).or_default().push(edge.kind);
        }

        self.added_edges = added;
        self.removed_edges = removed;
        self.reclassified_edges.clear();

        for ((from, to), before_kinds) in removed_by_pair {
            let Some(after_kinds) = added_by_pair.get(&(from, to)) else { continue };
            for (&before, &after) in before_kinds.iter().zip(after_kinds) {
                self.removed_edges.remove(&ReferenceEdge::new(from, to, before));
                self.added_edges.remove(&ReferenceEdge::new(from, to, after));
                self.reclassified_edges.push(Reclassified { from, to, before, after });
            }
        }
    }

    fn touched_nodes(&self) -> impl Iterator<Item = ObjectId> + '_ {
        self.added_nodes
            .keys()
            .chain(self.removed_nodes.keys())
            .chain(self.resized_nodes.keys())
            .copied()
    }

    /// Retained size of `id` on each side, `None` meaning absent. `None`
    /// overall if this diff does not mention `id`.
    fn node_transition(&self, id: ObjectId) -> Option<(Option<u64>, Option<u64>)> {
        if let Some(&size) = self.added_nodes.get(&id) {
            Some((None, Some(size)))
        } else if let Some(&size) = self.removed_nodes.get(&id) {
            Some((Some(size), None))
        } else {
            self.resized_nodes
                .get(&id)
                .map(|resize| (Some(resize.before), Some(resize.after)))
        }
    }
}

fn edge_transition(
    added: &BTreeSet<ReferenceEdge>,
    removed: &BTreeSet<ReferenceEdge>,
    edge: &ReferenceEdge,
) -> Option<(bool, bool)> {
    if added.contains(edge) {
        Some((false, true))
    } else if removed.contains(edge) {
        Some((true, false))
    } else {
        None
    }
}
