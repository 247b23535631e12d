//! Integration tests for Leakscope
//!
//! These tests drive collection, storage, detection and reporting together.

use leakscope_analyzer::{Detector, LeakCategory, Trend};
use leakscope_collector::{CollectorService, ObjectRecord, SnapshotCollector, Trace, TraceFrame, TraceHost};
use leakscope_core::{
    AllocationSite, DetectorConfig, EdgeKind, EventKind, GraphStore, LifecycleEvent, ObjectId,
    SnapshotBuilder,
};
use leakscope_report::{Report, emit};
use std::process::Command;
use std::sync::Arc;
use tempfile::TempDir;

/// Root (id 0) holding `count` objects from `site` through `kind` edges.
fn frame(site: &str, count: u64, kind: EdgeKind) -> TraceFrame {
    let mut root = ObjectRecord::new(0, "app::main", 64).as_root();
    let mut objects = Vec::new();
    for i in 0..count {
        root = root.with_ref(1_000 + i, kind);
        objects.push(ObjectRecord::new(1_000 + i, site, 48));
    }
    objects.insert(0, root);
    TraceFrame { objects, events: Vec::new() }
}

/// Cache (id 1) under the root that fills to `capacity` and then evicts its
/// oldest entry for every insert.
fn bounded_cache_trace(frames: u64, per_frame: u64, capacity: u64) -> Trace {
    let mut frames_out = Vec::new();
    let mut oldest = 0;
    let mut next = 0;
    for _ in 0..frames {
        let mut events = Vec::new();
        for _ in 0..per_frame {
            next += 1;
            if next - oldest > capacity {
                oldest += 1;
                events.push(
                    LifecycleEvent::new(EventKind::Evict, AllocationSite::from("cache::Entry"))
                        .with_target(ObjectId(1_000 + oldest)),
                );
            }
        }

        let mut cache = ObjectRecord::new(1, "cache::Lru", 128);
        let mut objects = Vec::new();
        for id in (oldest + 1)..=next {
            cache = cache.with_ref(1_000 + id, EdgeKind::CacheEntry);
            objects.push(ObjectRecord::new(1_000 + id, "cache::Entry", 256));
        }
        let root = ObjectRecord::new(0, "app::main", 64)
            .as_root()
            .with_ref(1, EdgeKind::Strong);
        objects.insert(0, cache);
        objects.insert(0, root);
        frames_out.push(TraceFrame { objects, events });
    }
    Trace { frames: frames_out }
}

async fn replay(trace: Trace, config: &DetectorConfig) -> Arc<GraphStore> {
    let store = Arc::new(GraphStore::new(config.retention));
    let host = Arc::new(TraceHost::new("integration", trace));
    let collector = Arc::new(SnapshotCollector::new(host, config.collect_timeout()));
    let service = CollectorService::new(collector, Arc::clone(&store), config);
    while service.collect_once().await.is_ok() {}
    store
}

/// Counts 1..=50 retained by timers that are never cancelled.
#[tokio::test]
async fn test_unreleased_timer_is_top_candidate() {
    let config = DetectorConfig::default();
    let trace = Trace {
        frames: (1..=50).map(|n| frame("jobs::poll", n, EdgeKind::Timer)).collect(),
    };
    let store = replay(trace, &config).await;
    assert_eq!(store.len(), 50);

    let report = emit(Detector::new(&config).detect(&store.window()));
    let top = report.top().expect("timer leak reported");
    assert_eq!(top.site.as_str(), "jobs::poll");
    assert_eq!(top.category, LeakCategory::UnreleasedTimer);
    assert_eq!(top.trend, Trend::UnboundedGrowth);
    assert!(top.confidence > 0.7, "confidence {}", top.confidence);
    assert_eq!(top.evidence_snapshot_ids.len(), config.analysis_window);
    assert_eq!(top.evidence_snapshot_ids.last(), store.last_committed().as_ref());
}

/// A cache that grows to capacity and then stays flat is not a leak.
#[tokio::test]
async fn test_bounded_cache_is_not_reported() {
    let config = DetectorConfig::default();
    let store = replay(bounded_cache_trace(50, 10, 100), &config).await;

    let report = emit(Detector::new(&config).detect(&store.window()));
    assert!(report.is_empty(), "unexpected candidates: {:?}", report.candidates);
}

/// Same cache, but the window starts while it is still filling.
#[tokio::test]
async fn test_bounded_cache_filling_in_window_is_not_reported() {
    let config = DetectorConfig::default();
    let store = replay(bounded_cache_trace(30, 10, 100), &config).await;
    assert_eq!(store.len(), 30);

    let report = emit(Detector::new(&config).detect(&store.window()));
    assert!(report.is_empty(), "unexpected candidates: {:?}", report.candidates);
}

#[tokio::test]
async fn test_unbounded_cache_is_reported() {
    let config = DetectorConfig::default();
    // Capacity never reached: nothing is evicted.
    let store = replay(bounded_cache_trace(40, 3, 1_000), &config).await;

    let report = emit(Detector::new(&config).detect(&store.window()));
    assert_eq!(report.len(), 1);
    assert_eq!(report.candidates[0].category, LeakCategory::UnboundedCache);
}

#[test]
fn test_detached_listeners_accumulate() {
    let config = DetectorConfig::default();
    let store = GraphStore::new(config.retention);
    for seq in 1..=20 {
        let mut b = SnapshotBuilder::new(seq)
            .root(0, "app::main")
            .object(1, "bus::Emitter")
            .edge(0, 1, EdgeKind::Strong);
        for i in 0..seq {
            b = b.object(100 + i, "ui::onResize").edge(1, 100 + i, EdgeKind::Listener);
        }
        let detached = LifecycleEvent::new(EventKind::Detach, AllocationSite::from("ui::onResize"))
            .with_target(ObjectId(100 + seq - 1));
        store.commit(b.event(detached).build()).unwrap();
    }

    let report = emit(Detector::new(&config).detect(&store.window()));
    assert_eq!(report.len(), 1);
    assert_eq!(report.candidates[0].category, LeakCategory::ListenerAccumulation);
    assert!(report.candidates[0].confidence > 0.9);
}

#[test]
fn test_eviction_during_analysis() {
    let config = DetectorConfig {
        retention: 10,
        analysis_window: 5,
        ..DetectorConfig::default()
    };
    let store = GraphStore::new(config.retention);
    let detector = Detector::new(&config);

    std::thread::scope(|s| {
        s.spawn(|| {
            for seq in 1..=200 {
                let mut b = SnapshotBuilder::new(seq).root(0, "app::main");
                for i in 0..seq {
                    b = b.object(100 + i, "jobs::poll").edge(0, 100 + i, EdgeKind::Timer);
                }
                store.commit(b.build()).unwrap();
            }
        });
        s.spawn(|| {
            for _ in 0..50 {
                let window = store.window();
                let ids = window.ids();
                assert!(ids.windows(2).all(|w| w[0].0 + 1 == w[1].0), "gap in {ids:?}");
                for candidate in detector.detect(&window) {
                    assert!(candidate.evidence.iter().all(|id| ids.contains(id)));
                }
            }
        });
    });

    // Leases are gone; the next commit trims back to the retention window.
    let mut b = SnapshotBuilder::new(201).root(0, "app::main");
    for i in 0..201 {
        b = b.object(100 + i, "jobs::poll").edge(0, 100 + i, EdgeKind::Timer);
    }
    store.commit(b.build()).unwrap();
    assert_eq!(store.len(), 10);
}

#[tokio::test]
async fn test_cache_survives_restart() {
    let dir = TempDir::new().unwrap();
    let config = DetectorConfig::default();
    let trace = Trace {
        frames: (1..=12).map(|n| frame("jobs::poll", n, EdgeKind::Timer)).collect(),
    };
    let store = replay(trace, &config).await;
    leakscope_core::save_window(&store.window(), dir.path()).unwrap();

    let restored = GraphStore::new(config.retention);
    assert_eq!(leakscope_core::restore_store(&restored, dir.path()).unwrap(), 12);

    let detector = Detector::new(&config);
    assert_eq!(
        detector.detect(&store.window()),
        Detector::new(&config).detect(&restored.window())
    );
}

#[test]
fn test_cli_help() {
    let output = Command::new(env!("CARGO_BIN_EXE_leakscope"))
        .arg("--help")
        .output()
        .expect("Failed to execute command");

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success());
    assert!(stdout.contains("Memory leak detection"));
    for command in ["collect", "report", "watch", "clear", "version"] {
        assert!(stdout.contains(command), "missing {command}");
    }
}

#[test]
fn test_cli_collect_then_report() {
    let dir = TempDir::new().unwrap();
    let trace_path = dir.path().join("trace.json");
    Trace {
        frames: (1..=40).map(|n| frame("jobs::poll", n, EdgeKind::Timer)).collect(),
    }
    .save(&trace_path)
    .unwrap();

    let collect = Command::new(env!("CARGO_BIN_EXE_leakscope"))
        .arg("--root")
        .arg(dir.path())
        .arg("collect")
        .arg(&trace_path)
        .output()
        .unwrap();
    assert!(collect.status.success(), "{}", String::from_utf8_lossy(&collect.stderr));

    let report_path = dir.path().join("report.json");
    let report = Command::new(env!("CARGO_BIN_EXE_leakscope"))
        .arg("--root")
        .arg(dir.path())
        .args(["report", "--format", "json", "--output"])
        .arg(&report_path)
        .output()
        .unwrap();
    assert!(report.status.success(), "{}", String::from_utf8_lossy(&report.stderr));

    let json = std::fs::read_to_string(&report_path).unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert!(value["generatedAt"].is_string());
    assert_eq!(value["candidates"][0]["site"], "jobs::poll");
    assert_eq!(value["candidates"][0]["category"], "unreleased-timer");

    let parsed: Report = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed.len(), 1);

    let clear = Command::new(env!("CARGO_BIN_EXE_leakscope"))
        .arg("--root")
        .arg(dir.path())
        .arg("clear")
        .output()
        .unwrap();
    assert!(clear.status.success());
    assert!(!leakscope_core::snapshot_cache_path(dir.path()).exists());
}
