//! Unit tests for leakscope-collector

use crate::*;
use leakscope_core::{
    AllocationSite, DetectorConfig, EdgeKind, EventKind, GraphStore, LifecycleEvent, ObjectId,
    SnapshotId,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// A root holding `count` timers from `ui::poll`.
fn timer_frame(count: u64) -> TraceFrame {
    let mut root = ObjectRecord::new(0, "app::main", 16).as_root();
    let mut objects = Vec::new();
    for i in 0..count {
        root = root.with_ref(100 + i, EdgeKind::Timer);
        objects.push(ObjectRecord::new(100 + i, "ui::poll", 32));
    }
    objects.insert(0, root);
    TraceFrame { objects, events: Vec::new() }
}

fn trace_host(frames: Vec<TraceFrame>) -> Arc<TraceHost> {
    Arc::new(TraceHost::new("test-trace", Trace { frames }))
}

struct SlowHost;

#[async_trait::async_trait]
impl HostIntrospector for SlowHost {
    async fn enumerate_objects(&self) -> anyhow::Result<Vec<ObjectRecord>> {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok(Vec::new())
    }
}

fn fast_config() -> DetectorConfig {
    DetectorConfig {
        sampling_interval_ms: 5,
        max_backoff_ms: 20,
        ..DetectorConfig::default()
    }
}

#[test]
fn test_assemble_estimates_missing_retained_sizes() {
    let mut reported = ObjectRecord::new(2, "b", 8);
    reported.retained_size = Some(1_000);
    let snapshot = assemble(
        7,
        vec![
            ObjectRecord::new(0, "root", 1).as_root().with_ref(1, EdgeKind::Strong),
            ObjectRecord::new(1, "a", 4).with_ref(2, EdgeKind::Strong).with_ref(3, EdgeKind::Weak),
            reported,
        ],
        vec![LifecycleEvent::new(EventKind::Nulled, "a".into())],
    );

    assert_eq!(snapshot.id(), SnapshotId(7));
    assert_eq!(snapshot.node_count(), 3);
    // Reference to an unenumerated object is dropped.
    assert_eq!(snapshot.edge_count(), 2);
    assert_eq!(snapshot.node(ObjectId(1)).unwrap().retained_size, 12);
    assert_eq!(snapshot.node(ObjectId(2)).unwrap().retained_size, 1_000);
    assert!(snapshot.node(ObjectId(0)).unwrap().is_root);
    assert_eq!(snapshot.events().len(), 1);
}

#[tokio::test]
async fn test_collect_assigns_increasing_sequence_numbers() {
    let host = trace_host(vec![timer_frame(1), timer_frame(2)]);
    let collector = SnapshotCollector::new(host, Duration::from_secs(1));

    let first = collector.collect().await.unwrap();
    let second = collector.collect().await.unwrap();
    assert_eq!(first.id(), SnapshotId(1));
    assert_eq!(second.id(), SnapshotId(2));
    assert_eq!(
        second.objects_at(&AllocationSite::from("ui::poll")).count(),
        2
    );
}

#[tokio::test]
async fn test_exhausted_trace_is_unavailable_without_consuming_sequence() {
    let host = trace_host(vec![timer_frame(1)]);
    let collector = SnapshotCollector::new(host.clone(), Duration::from_secs(1))
        .resuming_after(Some(SnapshotId(41)));

    assert_eq!(collector.collect().await.unwrap().id(), SnapshotId(42));
    assert_eq!(host.remaining().await, 0);

    let err = collector.collect().await.unwrap_err();
    let CollectError::CollectionUnavailable { host, reason } = err;
    assert_eq!(host, "test-trace");
    assert!(reason.contains("trace exhausted"));
}

#[tokio::test]
async fn test_collect_times_out() {
    let collector = SnapshotCollector::new(Arc::new(SlowHost), Duration::from_millis(20));
    let err = collector.collect().await.unwrap_err();
    assert!(err.to_string().contains("timed out"));
}

#[tokio::test]
async fn test_trace_events_follow_their_frame() {
    let mut frame = timer_frame(1);
    frame.events.push(
        LifecycleEvent::new(EventKind::TimerCancel, "ui::poll".into()).with_target(ObjectId(100)),
    );
    let host = trace_host(vec![frame, timer_frame(1)]);
    let collector = SnapshotCollector::new(host, Duration::from_secs(1));

    assert_eq!(collector.collect().await.unwrap().events().len(), 1);
    assert!(collector.collect().await.unwrap().events().is_empty());
}

#[tokio::test]
async fn test_collect_once_commits_and_broadcasts() {
    let store = Arc::new(GraphStore::new(8));
    let collector = Arc::new(SnapshotCollector::new(
        trace_host(vec![timer_frame(3)]),
        Duration::from_secs(1),
    ));
    let service = CollectorService::new(collector, Arc::clone(&store), &fast_config());
    let mut committed = service.subscribe();

    let id = service.collect_once().await.unwrap();
    assert_eq!(committed.recv().await.unwrap(), id);
    assert_eq!(store.len(), 1);

    assert!(matches!(
        service.collect_once().await,
        Err(ServiceError::Collect(_))
    ));
}

#[tokio::test]
async fn test_run_drains_trace_then_gives_up() {
    let store = Arc::new(GraphStore::new(16));
    let frames = (1..=5).map(timer_frame).collect();
    let collector = Arc::new(SnapshotCollector::new(trace_host(frames), Duration::from_secs(1)));
    let service = CollectorService::new(collector, Arc::clone(&store), &fast_config())
        .with_failure_limit(2);

    let (_shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::time::timeout(Duration::from_secs(5), service.run(shutdown_rx))
        .await
        .expect("service should stop on its own")
        .unwrap();

    assert_eq!(store.len(), 5);
    assert_eq!(store.last_committed(), Some(SnapshotId(5)));
}

#[tokio::test]
async fn test_run_stops_on_shutdown() {
    let store = Arc::new(GraphStore::new(16));
    let collector = Arc::new(SnapshotCollector::new(Arc::new(SlowHost), Duration::from_millis(10)));
    let service = Arc::new(CollectorService::new(collector, store, &fast_config()));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let running = Arc::clone(&service);
    let handle = tokio::spawn(async move { running.run(shutdown_rx).await });

    tokio::time::sleep(Duration::from_millis(30)).await;
    shutdown_tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("service should stop after shutdown")
        .unwrap()
        .unwrap();
}

#[test]
fn test_backoff_is_capped() {
    let base = Duration::from_millis(100);
    let max = Duration::from_secs(1);
    assert_eq!(backoff_delay(base, 1, max), Duration::from_millis(200));
    assert_eq!(backoff_delay(base, 3, max), Duration::from_millis(800));
    assert_eq!(backoff_delay(base, 30, max), max);
}

#[test]
fn test_trace_file_round_trip() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("trace.json");
    let trace = Trace { frames: vec![timer_frame(2), TraceFrame::default()] };
    trace.save(&path).unwrap();

    assert_eq!(Trace::load(&path).unwrap(), trace);
    let host = TraceHost::from_file(&path).unwrap();
    assert_eq!(tokio_test::block_on(host.remaining()), 2);
}
