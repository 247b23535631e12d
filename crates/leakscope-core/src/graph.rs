//! Reference graph view over a snapshot, keyed by opaque object id

use crate::model::*;
use petgraph::algo::{dominators, tarjan_scc};
use petgraph::graph::DiGraph;
use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use petgraph::visit::{EdgeRef, IntoEdgeReferences};
use petgraph::Direction;
use std::collections::{HashMap, HashSet, VecDeque};

/// A directed multigraph of object references. Cycles are plain edges between
/// ids; nothing here owns the objects themselves.
pub struct RefGraph {
    inner: StableDiGraph<ObjectId, EdgeKind>,
    index: HashMap<ObjectId, NodeIndex>,
    sizes: HashMap<ObjectId, u64>,
    roots: Vec<NodeIndex>,
}

impl std::fmt::Debug for RefGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefGraph")
            .field("node_count", &self.inner.node_count())
            .field("edge_count", &self.inner.edge_count())
            .field("root_count", &self.roots.len())
            .finish()
    }
}

impl RefGraph {
    pub fn from_snapshot(snapshot: &Snapshot) -> Self {
        Self::from_parts(snapshot.nodes(), snapshot.edges())
    }

    /// Build from nodes and edges. Edges with unknown endpoints are skipped.
    pub fn from_parts<'a>(
        nodes: impl IntoIterator<Item = &'a ObjectNode>,
        edges: impl IntoIterator<Item = &'a ReferenceEdge>,
    ) -> Self {
        let mut inner = StableDiGraph::new();
        let mut index = HashMap::new();
        let mut sizes = HashMap::new();
        let mut roots = Vec::new();

        for node in nodes {
            let idx = inner.add_node(node.id);
            index.insert(node.id, idx);
            sizes.insert(node.id, node.size);
            if node.is_root {
                roots.push(idx);
            }
        }

        for edge in edges {
            if let (Some(&from), Some(&to)) = (index.get(&edge.from), index.get(&edge.to)) {
                inner.add_edge(from, to, edge.kind);
            }
        }

        RefGraph { inner, index, sizes, roots }
    }

    pub fn node_count(&self) -> usize {
        self.inner.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.inner.edge_count()
    }

    pub fn contains(&self, id: ObjectId) -> bool {
        self.index.contains_key(&id)
    }

    /// Outgoing references of `id` as `(target, kind)`.
    pub fn edges_from(&self, id: ObjectId) -> impl Iterator<Item = (ObjectId, EdgeKind)> + '_ {
        self.neighbors(id, Direction::Outgoing)
    }

    /// Incoming references of `id` as `(source, kind)`.
    pub fn edges_to(&self, id: ObjectId) -> impl Iterator<Item = (ObjectId, EdgeKind)> + '_ {
        self.neighbors(id, Direction::Incoming)
    }

    fn neighbors(
        &self,
        id: ObjectId,
        direction: Direction,
    ) -> impl Iterator<Item = (ObjectId, EdgeKind)> + '_ {
        self.index
            .get(&id)
            .into_iter()
            .flat_map(move |&idx| self.inner.edges_directed(idx, direction))
            .filter_map(move |edge_ref| {
                let (source, target) = self.inner.edge_endpoints(edge_ref.id())?;
                let other = match direction {
                    Direction::Outgoing => target,
                    Direction::Incoming => source,
                };
                Some((self.inner[other], *edge_ref.weight()))
            })
    }

    /// Objects reachable from any root through retaining edges whose kind is
    /// not in `excluding`. Weak edges are never followed.
    pub fn reachable_from_roots(&self, excluding: &[EdgeKind]) -> HashSet<ObjectId> {
        let mut seen: HashSet<NodeIndex> = self.roots.iter().copied().collect();
        let mut queue: VecDeque<NodeIndex> = self.roots.iter().copied().collect();

        while let Some(current) = queue.pop_front() {
            for edge_ref in self.inner.edges_directed(current, Direction::Outgoing) {
                let kind = *edge_ref.weight();
                if !kind.retains() || excluding.contains(&kind) {
                    continue;
                }
                if seen.insert(edge_ref.target()) {
                    queue.push_back(edge_ref.target());
                }
            }
        }

        seen.into_iter().map(|idx| self.inner[idx]).collect()
    }

    /// Groups of objects that keep each other alive through strong edges.
    /// Each group is sorted; groups are ordered by their smallest member.
    pub fn strong_cycles(&self) -> Vec<Vec<ObjectId>> {
        let strong = self.inner.filter_map(
            |_, &id| Some(id),
            |_, &kind| (kind == EdgeKind::Strong).then_some(()),
        );

        let mut cycles: Vec<Vec<ObjectId>> = tarjan_scc(&strong)
            .into_iter()
            .filter(|component| component.len() > 1)
            .map(|component| {
                let mut ids: Vec<ObjectId> = component.into_iter().map(|idx| strong[idx]).collect();
                ids.sort();
                ids
            })
            .collect();
        cycles.sort();
        cycles
    }

    /// Retained size of every object: its own size plus the size of every
    /// object it dominates from the roots. Objects unreachable from a root
    /// retain only themselves.
    pub fn retained_sizes(&self) -> HashMap<ObjectId, u64> {
        let mut retained: HashMap<ObjectId, u64> = HashMap::with_capacity(self.sizes.len());

        // Dominators need a single entry; roots hang off a virtual one.
        let mut flow: DiGraph<Option<ObjectId>, ()> = DiGraph::new();
        let entry = flow.add_node(None);
        let mut mapped = HashMap::with_capacity(self.index.len());
        for (&id, &idx) in &self.index {
            mapped.insert(idx, flow.add_node(Some(id)));
        }
        for &root in &self.roots {
            flow.add_edge(entry, mapped[&root], ());
        }
        for edge_ref in self.inner.edge_references() {
            if edge_ref.weight().retains() {
                flow.add_edge(mapped[&edge_ref.source()], mapped[&edge_ref.target()], ());
            }
        }

        let doms = dominators::simple_fast(&flow, entry);
        for idx in flow.node_indices() {
            let Some(id) = flow[idx] else { continue };
            let size = self.sizes.get(&id).copied().unwrap_or(0);
            match doms.dominators(idx) {
                Some(chain) => {
                    for dominator in chain {
                        if let Some(owner) = flow[dominator] {
                            *retained.entry(owner).or_insert(0) += size;
                        }
                    }
                }
                None => {
                    *retained.entry(id).or_insert(0) += size;
                }
            }
        }

        retained
    }
}
