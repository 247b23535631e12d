//! On-disk persistence of the snapshot window

use crate::model::Snapshot;
use crate::store::{GraphStore, SnapshotWindow};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Cache directory: .leakscope/
pub const CACHE_DIR: &str = ".leakscope";

/// Snapshot cache file
pub const SNAPSHOT_CACHE: &str = "snapshots.json";

/// Get cache directory path
pub fn cache_dir(root: &Path) -> PathBuf {
    root.join(CACHE_DIR)
}

/// Get snapshot cache file path
pub fn snapshot_cache_path(root: &Path) -> PathBuf {
    root.join(CACHE_DIR).join(SNAPSHOT_CACHE)
}

/// Ensure cache directory exists
pub fn ensure_cache_dir(root: &Path) -> std::io::Result<()> {
    let cache = cache_dir(root);
    if !cache.exists() {
        std::fs::create_dir_all(&cache)?;
    }
    Ok(())
}

#[derive(Serialize)]
struct CacheFileRef<'a> {
    version: &'a str,
    saved_at: DateTime<Utc>,
    snapshots: Vec<&'a Snapshot>,
}

#[derive(Deserialize)]
struct CacheFile {
    version: String,
    saved_at: DateTime<Utc>,
    snapshots: Vec<Snapshot>,
}

/// Write every snapshot of the window to the cache file.
pub fn save_window(window: &SnapshotWindow, root: &Path) -> anyhow::Result<PathBuf> {
    ensure_cache_dir(root)?;
    let path = snapshot_cache_path(root);

    let file = CacheFileRef {
        version: env!("CARGO_PKG_VERSION"),
        saved_at: Utc::now(),
        snapshots: window.iter().collect(),
    };
    let json_str = serde_json::to_string(&file)?;
    std::fs::write(&path, json_str)?;

    tracing::debug!("Saved {} snapshots to {}", window.len(), path.display());
    Ok(path)
}

/// Read cached snapshots, oldest first. `None` if nothing is cached.
pub fn load_snapshots(root: &Path) -> anyhow::Result<Option<Vec<Snapshot>>> {
    let path = snapshot_cache_path(root);
    if !path.exists() {
        return Ok(None);
    }

    let json_str = std::fs::read_to_string(&path)?;
    let file: CacheFile = serde_json::from_str(&json_str)?;
    if file.version != env!("CARGO_PKG_VERSION") {
        tracing::warn!(
            "Snapshot cache written by v{}, reading with v{}",
            file.version,
            env!("CARGO_PKG_VERSION")
        );
    }

    tracing::debug!(
        "Loaded {} snapshots saved at {} from {}",
        file.snapshots.len(),
        file.saved_at.to_rfc3339(),
        path.display()
    );
    Ok(Some(file.snapshots))
}

/// Commit cached snapshots into `store`. Returns how many were restored.
pub fn restore_store(store: &GraphStore, root: &Path) -> anyhow::Result<usize> {
    let Some(snapshots) = load_snapshots(root)? else {
        return Ok(0);
    };
    let count = snapshots.len();
    for snapshot in snapshots {
        store.commit(snapshot)?;
    }
    Ok(count)
}

/// Clear cache directory
pub fn clear_cache(root: &Path) -> std::io::Result<()> {
    let cache = cache_dir(root);
    if cache.exists() {
        std::fs::remove_dir_all(&cache)?;
    }
    Ok(())
}
