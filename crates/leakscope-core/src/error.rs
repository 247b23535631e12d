//! Error types for the snapshot store, growth series and configuration

use std::path::PathBuf;

use crate::model::SnapshotId;

/// Reference Graph Store errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("snapshot {seq} is out of order: last committed snapshot is {last}")]
    OutOfOrderSnapshot { seq: SnapshotId, last: SnapshotId },

    #[error("snapshot {id} is not in the retention window")]
    UnknownSnapshot { id: SnapshotId },

    /// Raised when the window metadata and the lease count disagree.
    #[error("evicting snapshot {id} conflicts with an outstanding lease")]
    EvictionConflict { id: SnapshotId },

    #[error("diffs are not adjacent: first ends at {first_to}, second starts at {second_from}")]
    NonAdjacentDiffs {
        first_to: SnapshotId,
        second_from: SnapshotId,
    },
}

/// Growth series construction errors.
#[derive(Debug, thiserror::Error)]
pub enum SeriesError {
    #[error("growth series sample {seq} does not follow {previous}")]
    NonMonotonic { seq: SnapshotId, previous: SnapshotId },
}

/// Configuration loading and validation errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {field} {reason}")]
    Invalid { field: &'static str, reason: String },
}
