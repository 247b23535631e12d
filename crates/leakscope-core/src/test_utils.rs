//! Test utilities for leakscope-core

use crate::model::*;
use chrono::{DateTime, TimeZone, Utc};

/// Deterministic timestamp for sequence number `seq`.
pub fn at(seq: u64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + seq as i64, 0).unwrap()
}

pub fn builder(seq: u64) -> SnapshotBuilder {
    SnapshotBuilder::new(seq).taken_at(at(seq))
}

/// A root (id 0) holding `count` objects from `site` through `kind` edges.
/// Object ids start at 100 and persist across calls.
pub fn fan_out(seq: u64, site: &str, count: u64, kind: EdgeKind) -> Snapshot {
    let mut b = builder(seq).root(0, "app::main");
    for i in 0..count {
        b = b.object(100 + i, site).edge(0, 100 + i, kind);
    }
    b.build()
}
