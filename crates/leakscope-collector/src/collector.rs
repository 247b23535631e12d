//! Snapshot collection from a host introspector

use crate::host::{HostIntrospector, ObjectRecord};
use leakscope_core::{LifecycleEvent, ObjectId, ObjectNode, ReferenceEdge, Snapshot, SnapshotBuilder, SnapshotId};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Collection errors. Always recoverable; the caller owns the retry policy.
#[derive(Debug, thiserror::Error)]
pub enum CollectError {
    #[error("collection unavailable from {host}: {reason}")]
    CollectionUnavailable { host: String, reason: String },
}

/// Captures snapshots from a host. Sequence numbers are assigned on success
/// only, so a failed collection leaves no gap.
pub struct SnapshotCollector {
    host: Arc<dyn HostIntrospector>,
    timeout: Duration,
    next_seq: AtomicU64,
}

impl std::fmt::Debug for SnapshotCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotCollector")
            .field("host", &self.host.name())
            .field("timeout", &self.timeout)
            .field("next_seq", &self.next_seq.load(Ordering::Relaxed))
            .finish()
    }
}

impl SnapshotCollector {
    /// Create a collector whose calls give up after `timeout`.
    pub fn new(host: Arc<dyn HostIntrospector>, timeout: Duration) -> Self {
        SnapshotCollector {
            host,
            timeout,
            next_seq: AtomicU64::new(1),
        }
    }

    /// Continue numbering after an already committed snapshot.
    pub fn resuming_after(self, last: Option<SnapshotId>) -> Self {
        if let Some(last) = last {
            self.next_seq.store(last.0 + 1, Ordering::SeqCst);
        }
        self
    }

    pub fn host_name(&self) -> &str {
        self.host.name()
    }

    /// Read the host once and assemble a snapshot.
    pub async fn collect(&self) -> Result<Snapshot, CollectError> {
        let unavailable = |reason: String| CollectError::CollectionUnavailable {
            host: self.host.name().to_string(),
            reason,
        };

        let gathered = tokio::time::timeout(self.timeout, async {
            let objects = self.host.enumerate_objects().await?;
            let events = self.host.drain_events().await?;
            anyhow::Ok((objects, events))
        })
        .await;

        let (objects, events) = match gathered {
            Err(_) => return Err(unavailable(format!("timed out after {:?}", self.timeout))),
            Ok(Err(e)) => return Err(unavailable(format!("{e:#}"))),
            Ok(Ok(gathered)) => gathered,
        };

        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        let snapshot = assemble(seq, objects, events);
        debug!(
            "Collected snapshot {} from {}: {} objects, {} edges, {} events",
            snapshot.id(),
            self.host.name(),
            snapshot.node_count(),
            snapshot.edge_count(),
            snapshot.events().len()
        );
        Ok(snapshot)
    }
}

/// Turn host records into a snapshot, estimating missing retained sizes.
pub fn assemble(seq: u64, records: Vec<ObjectRecord>, events: Vec<LifecycleEvent>) -> Snapshot {
    let mut builder = SnapshotBuilder::new(seq);
    let mut unknown: BTreeSet<ObjectId> = BTreeSet::new();

    for record in records {
        for r in &record.refs {
            builder.push_edge(ReferenceEdge::new(record.id, r.to, r.kind));
        }
        let mut node = ObjectNode::new(record.id, record.type_tag, record.site, record.size);
        match record.retained_size {
            Some(retained) => node.retained_size = retained,
            None => {
                unknown.insert(record.id);
            }
        }
        node.is_root = record.root;
        builder.push_node(node);
    }
    for event in events {
        builder.push_event(event);
    }

    builder.build_estimating(&unknown)
}
