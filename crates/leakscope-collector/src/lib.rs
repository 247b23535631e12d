//! Snapshot collection for Leakscope
//!
//! This crate reads object graphs from an instrumented host through the
//! [`HostIntrospector`] seam, turns them into snapshots, and drives the
//! collect-and-commit loop against the reference graph store.

pub mod host;
pub mod collector;
pub mod replay;
pub mod service;

#[cfg(test)]
mod tests;

pub use host::{HostIntrospector, ObjectRecord, OutgoingRef};
pub use collector::{CollectError, SnapshotCollector, assemble};
pub use replay::{Trace, TraceFrame, TraceHost};
pub use service::{CollectorService, ServiceError, backoff_delay};
