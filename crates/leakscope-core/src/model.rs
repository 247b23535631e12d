//! Core data structures for reference-graph snapshots

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::SeriesError;

/// Opaque object identity. Stable across snapshots while the allocation lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct ObjectId(pub u64);

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.0)
    }
}

/// Identifier of a committed snapshot. Equal to its sequence number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct SnapshotId(pub u64);

impl fmt::Display for SnapshotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Source location or logical construction point of an allocation.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct AllocationSite(pub String);

impl AllocationSite {
    pub fn new(site: impl Into<String>) -> Self {
        AllocationSite(site.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AllocationSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AllocationSite {
    fn from(site: &str) -> Self {
        AllocationSite(site.to_string())
    }
}

/// What kind of reference an edge represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EdgeKind {
    // ── Plain references ────────────────────────────────────
    Strong,
    Weak,

    // ── Host-registered callbacks and handles ───────────────
    Listener,
    Timer,
    Subscription,
    CacheEntry,
}

impl EdgeKind {
    pub const ALL: [EdgeKind; 6] = [
        EdgeKind::Strong,
        EdgeKind::Weak,
        EdgeKind::Listener,
        EdgeKind::Timer,
        EdgeKind::Subscription,
        EdgeKind::CacheEntry,
    ];

    /// Whether an edge of this kind keeps its target alive.
    pub fn retains(self) -> bool {
        !matches!(self, EdgeKind::Weak)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EdgeKind::Strong => "strong",
            EdgeKind::Weak => "weak",
            EdgeKind::Listener => "listener",
            EdgeKind::Timer => "timer",
            EdgeKind::Subscription => "subscription",
            EdgeKind::CacheEntry => "cache-entry",
        }
    }
}

impl fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single object observed in a snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ObjectNode {
    pub id: ObjectId,
    pub type_tag: String,
    pub site: AllocationSite,
    /// Shallow size estimate in bytes.
    pub size: u64,
    /// Size of the object plus everything only reachable through it.
    pub retained_size: u64,
    /// GC root or host global.
    #[serde(default)]
    pub is_root: bool,
}

impl ObjectNode {
    /// A non-root object whose retained size equals its shallow size.
    pub fn new(id: ObjectId, type_tag: impl Into<String>, site: AllocationSite, size: u64) -> Self {
        ObjectNode {
            id,
            type_tag: type_tag.into(),
            site,
            size,
            retained_size: size,
            is_root: false,
        }
    }

    pub fn as_root(mut self) -> Self {
        self.is_root = true;
        self
    }

    pub fn with_retained_size(mut self, retained_size: u64) -> Self {
        self.retained_size = retained_size;
        self
    }
}

/// A directed reference. Identity is the full `(from, to, kind)` triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ReferenceEdge {
    pub from: ObjectId,
    pub to: ObjectId,
    pub kind: EdgeKind,
}

impl ReferenceEdge {
    pub fn new(from: ObjectId, to: ObjectId, kind: EdgeKind) -> Self {
        ReferenceEdge { from, to, kind }
    }
}

/// Host lifecycle observations that release (or should release) references.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventKind {
    /// A component or node was detached from its owner.
    Detach,
    TimerCancel,
    Unsubscribe,
    /// A cache dropped an entry.
    Evict,
    /// A reference was explicitly cleared.
    Nulled,
}

/// A lifecycle event observed between two collections.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleEvent {
    pub kind: EventKind,
    pub site: AllocationSite,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<ObjectId>,
}

impl LifecycleEvent {
    pub fn new(kind: EventKind, site: AllocationSite) -> Self {
        LifecycleEvent { kind, site, target: None }
    }

    pub fn with_target(mut self, target: ObjectId) -> Self {
        self.target = Some(target);
        self
    }
}

/// Immutable object/reference graph captured at one point in time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Snapshot {
    seq: SnapshotId,
    taken_at: DateTime<Utc>,
    nodes: BTreeMap<ObjectId, ObjectNode>,
    edges: Vec<ReferenceEdge>,
    #[serde(default)]
    events: Vec<LifecycleEvent>,
}

impl Snapshot {
    pub fn id(&self) -> SnapshotId {
        self.seq
    }

    pub fn taken_at(&self) -> DateTime<Utc> {
        self.taken_at
    }

    pub fn node(&self, id: ObjectId) -> Option<&ObjectNode> {
        self.nodes.get(&id)
    }

    pub fn contains(&self, id: ObjectId) -> bool {
        self.nodes.contains_key(&id)
    }

    /// Nodes in ascending id order.
    pub fn nodes(&self) -> impl Iterator<Item = &ObjectNode> {
        self.nodes.values()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Edges in ascending `(from, to, kind)` order, without duplicates.
    pub fn edges(&self) -> &[ReferenceEdge] {
        &self.edges
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Lifecycle events observed since the previous collection.
    pub fn events(&self) -> &[LifecycleEvent] {
        &self.events
    }

    pub fn roots(&self) -> impl Iterator<Item = &ObjectNode> {
        self.nodes.values().filter(|n| n.is_root)
    }

    /// Objects allocated at `site`.
    pub fn objects_at<'a>(&'a self, site: &'a AllocationSite) -> impl Iterator<Item = &'a ObjectNode> + 'a {
        self.nodes.values().filter(move |n| &n.site == site)
    }

    /// All allocation sites present in this snapshot.
    pub fn sites(&self) -> BTreeSet<&AllocationSite> {
        self.nodes.values().map(|n| &n.site).collect()
    }
}

/// Assembles a [`Snapshot`]. Edges are deduplicated and edges whose endpoints
/// were not observed are dropped.
#[derive(Debug, Clone)]
pub struct SnapshotBuilder {
    seq: SnapshotId,
    taken_at: DateTime<Utc>,
    nodes: BTreeMap<ObjectId, ObjectNode>,
    edges: BTreeSet<ReferenceEdge>,
    events: Vec<LifecycleEvent>,
}

impl SnapshotBuilder {
    pub fn new(seq: u64) -> Self {
        SnapshotBuilder {
            seq: SnapshotId(seq),
            taken_at: Utc::now(),
            nodes: BTreeMap::new(),
            edges: BTreeSet::new(),
            events: Vec::new(),
        }
    }

    pub fn taken_at(mut self, at: DateTime<Utc>) -> Self {
        self.taken_at = at;
        self
    }

    pub fn push_node(&mut self, node: ObjectNode) {
        self.nodes.insert(node.id, node);
    }

    pub fn push_edge(&mut self, edge: ReferenceEdge) {
        self.edges.insert(edge);
    }

    pub fn push_event(&mut self, event: LifecycleEvent) {
        self.events.push(event);
    }

    pub fn node(mut self, node: ObjectNode) -> Self {
        self.push_node(node);
        self
    }

    /// Shorthand for a one-byte object whose type tag is its site.
    pub fn object(self, id: u64, site: &str) -> Self {
        self.node(ObjectNode::new(ObjectId(id), site, AllocationSite::from(site), 1))
    }

    /// Shorthand for a one-byte root object.
    pub fn root(self, id: u64, site: &str) -> Self {
        self.node(ObjectNode::new(ObjectId(id), site, AllocationSite::from(site), 1).as_root())
    }

    pub fn edge(mut self, from: u64, to: u64, kind: EdgeKind) -> Self {
        self.push_edge(ReferenceEdge::new(ObjectId(from), ObjectId(to), kind));
        self
    }

    pub fn event(mut self, event: LifecycleEvent) -> Self {
        self.push_event(event);
        self
    }

    pub fn build(self) -> Snapshot {
        let before = self.edges.len();
        let edges: Vec<ReferenceEdge> = self
            .edges
            .into_iter()
            .filter(|e| self.nodes.contains_key(&e.from) && self.nodes.contains_key(&e.to))
            .collect();
        if edges.len() != before {
            debug!(
                "Snapshot {}: dropped {} edges with unobserved endpoints",
                self.seq,
                before - edges.len()
            );
        }

        Snapshot {
            seq: self.seq,
            taken_at: self.taken_at,
            nodes: self.nodes,
            edges,
            events: self.events,
        }
    }

    /// Build, replacing the retained size of every object in `unknown` with
    /// the dominator-tree estimate.
    pub fn build_estimating(self, unknown: &BTreeSet<ObjectId>) -> Snapshot {
        let mut snapshot = self.build();
        if unknown.is_empty() {
            return snapshot;
        }

        let estimates = crate::graph::RefGraph::from_snapshot(&snapshot).retained_sizes();
        for id in unknown {
            if let (Some(node), Some(&retained)) = (snapshot.nodes.get_mut(id), estimates.get(id)) {
                node.retained_size = retained;
            }
        }
        snapshot
    }
}

/// One sample of a growth series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SeriesPoint {
    pub snapshot: SnapshotId,
    pub count: u64,
    pub retained_bytes: u64,
}

/// Time-ordered retained-count samples for one allocation site.
/// Snapshot ids are strictly increasing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrowthSeries {
    site: AllocationSite,
    points: Vec<SeriesPoint>,
}

impl GrowthSeries {
    pub fn new(site: AllocationSite) -> Self {
        GrowthSeries { site, points: Vec::new() }
    }

    pub fn from_points(
        site: AllocationSite,
        points: impl IntoIterator<Item = SeriesPoint>,
    ) -> Result<Self, SeriesError> {
        let mut series = GrowthSeries::new(site);
        for point in points {
            series.push(point)?;
        }
        Ok(series)
    }

    /// Convenience for `(snapshot seq, count)` pairs.
    pub fn from_counts(
        site: AllocationSite,
        counts: impl IntoIterator<Item = (u64, u64)>,
    ) -> Result<Self, SeriesError> {
        GrowthSeries::from_points(
            site,
            counts.into_iter().map(|(seq, count)| SeriesPoint {
                snapshot: SnapshotId(seq),
                count,
                retained_bytes: 0,
            }),
        )
    }

    pub fn push(&mut self, point: SeriesPoint) -> Result<(), SeriesError> {
        if let Some(last) = self.points.last() {
            if point.snapshot <= last.snapshot {
                return Err(SeriesError::NonMonotonic {
                    seq: point.snapshot,
                    previous: last.snapshot,
                });
            }
        }
        self.points.push(point);
        Ok(())
    }

    pub fn site(&self) -> &AllocationSite {
        &self.site
    }

    pub fn points(&self) -> &[SeriesPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn snapshot_ids(&self) -> Vec<SnapshotId> {
        self.points.iter().map(|p| p.snapshot).collect()
    }

    /// The last `n` samples.
    pub fn tail(&self, n: usize) -> GrowthSeries {
        let start = self.points.len().saturating_sub(n);
        GrowthSeries {
            site: self.site.clone(),
            points: self.points[start..].to_vec(),
        }
    }
}
