//! Leakscope Core: Snapshot data model, reference graph store, and diff engine

pub mod model;
pub mod graph;
pub mod diff;
pub mod store;
pub mod aggregation;
pub mod config;
pub mod error;
pub mod cache;


#[cfg(test)]
mod test_utils;

pub use model::{
    AllocationSite, EdgeKind, EventKind, GrowthSeries, LifecycleEvent, ObjectId, ObjectNode,
    ReferenceEdge, SeriesPoint, Snapshot, SnapshotBuilder, SnapshotId,
};
pub use graph::RefGraph;
pub use diff::{Reclassified, Resize, SnapshotDiff};
pub use store::{GraphStore, SnapshotLease, SnapshotWindow};
pub use aggregation::{SiteTotals, growth_series, site_totals};
pub use config::{CONFIG_FILE, DetectorConfig};
pub use error::{ConfigError, SeriesError, StoreError};
pub use cache::{CACHE_DIR, SNAPSHOT_CACHE, cache_dir, snapshot_cache_path, ensure_cache_dir, save_window, load_snapshots, restore_store, clear_cache};
