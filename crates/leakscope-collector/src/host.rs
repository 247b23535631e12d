//! Host-process introspection seam

use anyhow::Result;
use leakscope_core::{AllocationSite, EdgeKind, LifecycleEvent, ObjectId};
use serde::{Deserialize, Serialize};

/// An outgoing reference reported by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutgoingRef {
    pub to: ObjectId,
    pub kind: EdgeKind,
}

/// One object as enumerated by the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectRecord {
    pub id: ObjectId,
    #[serde(rename = "type")]
    pub type_tag: String,
    pub site: AllocationSite,
    pub size: u64,
    /// Left out when the host cannot compute it; the collector estimates it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retained_size: Option<u64>,
    #[serde(default)]
    pub root: bool,
    #[serde(default)]
    pub refs: Vec<OutgoingRef>,
}

impl ObjectRecord {
    pub fn new(id: u64, site: &str, size: u64) -> Self {
        ObjectRecord {
            id: ObjectId(id),
            type_tag: site.to_string(),
            site: AllocationSite::from(site),
            size,
            retained_size: None,
            root: false,
            refs: Vec::new(),
        }
    }

    pub fn as_root(mut self) -> Self {
        self.root = true;
        self
    }

    pub fn with_ref(mut self, to: u64, kind: EdgeKind) -> Self {
        self.refs.push(OutgoingRef { to: ObjectId(to), kind });
        self
    }
}

/// Capability the collector needs from an instrumented host. How the host
/// gathers this (debugger hook, runtime instrumentation) is its own business.
#[async_trait::async_trait]
pub trait HostIntrospector: Send + Sync {
    /// Every live object with its outgoing references.
    async fn enumerate_objects(&self) -> Result<Vec<ObjectRecord>>;

    /// Lifecycle events observed since the previous call.
    async fn drain_events(&self) -> Result<Vec<LifecycleEvent>> {
        Ok(Vec::new())
    }

    /// Name used in logs and errors.
    fn name(&self) -> &str {
        "host"
    }
}
