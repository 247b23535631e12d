//! Test utilities for leakscope-analyzer

use leakscope_core::*;

pub fn config() -> DetectorConfig {
    DetectorConfig::default()
}

pub fn series(counts: &[u64]) -> GrowthSeries {
    GrowthSeries::from_counts(
        AllocationSite::from("test::site"),
        counts.iter().enumerate().map(|(i, &c)| (i as u64 + 1, c)),
    )
    .unwrap()
}

/// Counts 1..=n: a clean unbounded ramp.
pub fn ramp(n: u64) -> GrowthSeries {
    series(&(1..=n).collect::<Vec<_>>())
}

/// Commit `snapshots` into a fresh store and lease the whole window.
pub fn window_of(snapshots: impl IntoIterator<Item = Snapshot>) -> SnapshotWindow {
    let store = GraphStore::new(256);
    for snapshot in snapshots {
        store.commit(snapshot).unwrap();
    }
    store.window()
}

/// A root (id 0) holding `count` objects from `site` through `kind` edges.
pub fn fan_out(seq: u64, site: &str, count: u64, kind: EdgeKind) -> Snapshot {
    let mut b = SnapshotBuilder::new(seq).root(0, "app::main");
    for i in 0..count {
        b = b.object(100 + i, site).edge(0, 100 + i, kind);
    }
    b.build()
}

/// Emitter (id 1) under the root holding `count` listeners from `site`; the
/// first listener is reported detached in every snapshot. With `pinned`, the
/// root also holds the detached listener strongly.
pub fn listeners(seq: u64, site: &str, count: u64, pinned: bool) -> Snapshot {
    let mut b = SnapshotBuilder::new(seq)
        .root(0, "app::main")
        .object(1, "bus::Emitter")
        .edge(0, 1, EdgeKind::Strong);
    for i in 0..count {
        b = b.object(100 + i, site).edge(1, 100 + i, EdgeKind::Listener);
    }
    if pinned {
        b = b.edge(0, 100, EdgeKind::Strong);
    }
    b.event(LifecycleEvent::new(EventKind::Detach, AllocationSite::from(site)).with_target(ObjectId(100)))
        .build()
}
