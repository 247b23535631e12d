//! CLI command implementations

use crate::ReportFormat;
use anyhow::Context;
use leakscope_analyzer::Detector;
use leakscope_collector::{CollectorService, ServiceError, SnapshotCollector, TraceHost};
use leakscope_core::{DetectorConfig, GraphStore};
use leakscope_report::{Report, emit, render_table, to_json_pretty};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{broadcast, watch as watch_channel};

/// Settings given on the command line that take precedence over the config file.
#[derive(Debug, Default)]
pub struct Overrides {
    pub config: Option<PathBuf>,
    pub window: Option<usize>,
    pub retention: Option<usize>,
}

fn load_config(root: &Path, overrides: &Overrides) -> anyhow::Result<DetectorConfig> {
    let mut config = match &overrides.config {
        Some(path) => DetectorConfig::load(path)?,
        None => DetectorConfig::load_or_default(root)?,
    };
    if let Some(window) = overrides.window {
        config.analysis_window = window;
    }
    if let Some(retention) = overrides.retention {
        config.retention = retention;
    }
    config.validate()?;
    Ok(config)
}

/// Store seeded from the snapshot cache, if there is one.
fn open_store(root: &Path, config: &DetectorConfig) -> anyhow::Result<Arc<GraphStore>> {
    let store = Arc::new(GraphStore::new(config.retention));
    let restored = leakscope_core::restore_store(&store, root)?;
    if restored > 0 {
        tracing::info!("Restored {} cached snapshots", restored);
    }
    Ok(store)
}

fn trace_service(
    trace: &Path,
    store: Arc<GraphStore>,
    config: &DetectorConfig,
) -> anyhow::Result<CollectorService> {
    let host = Arc::new(TraceHost::from_file(trace)?);
    let collector = SnapshotCollector::new(host, config.collect_timeout())
        .resuming_after(store.last_committed());
    Ok(CollectorService::new(Arc::new(collector), store, config))
}

pub async fn collect(
    root: PathBuf,
    overrides: &Overrides,
    trace: PathBuf,
    frames: Option<usize>,
) -> anyhow::Result<()> {
    let config = load_config(&root, overrides)?;
    let store = open_store(&root, &config)?;
    let service = trace_service(&trace, Arc::clone(&store), &config)?;

    tracing::info!("Replaying {}", trace.display());
    let mut committed = 0;
    while frames.is_none_or(|limit| committed < limit) {
        match service.collect_once().await {
            Ok(id) => {
                committed += 1;
                tracing::debug!("Committed snapshot {}", id);
            }
            Err(ServiceError::Collect(e)) => {
                tracing::info!("Stopped: {}", e);
                break;
            }
            Err(ServiceError::Store(e)) => return Err(e.into()),
        }
    }

    let path = leakscope_core::save_window(&store.window(), &root)?;
    tracing::info!(
        "Committed {} snapshots, {} retained in {}",
        committed,
        store.len(),
        path.display()
    );
    Ok(())
}

pub fn report(
    root: PathBuf,
    overrides: &Overrides,
    format: ReportFormat,
    output: Option<PathBuf>,
) -> anyhow::Result<()> {
    let config = load_config(&root, overrides)?;
    let store = open_store(&root, &config)?;
    if store.is_empty() {
        anyhow::bail!("No cached snapshots under {}; run `leakscope collect` first", root.display());
    }

    let window = store.window();
    let report = emit(Detector::new(&config).detect(&window));
    write_report(&report, format, output.as_deref())
}

fn write_report(report: &Report, format: ReportFormat, output: Option<&Path>) -> anyhow::Result<()> {
    let rendered = match format {
        ReportFormat::Json => to_json_pretty(report)?,
        ReportFormat::Table => render_table(report),
    };
    match output {
        Some(path) => {
            std::fs::write(path, rendered)
                .with_context(|| format!("writing report {}", path.display()))?;
            tracing::info!("Report written to {}", path.display());
        }
        None => print!("{rendered}"),
    }
    Ok(())
}

pub async fn watch(
    root: PathBuf,
    overrides: &Overrides,
    trace: PathBuf,
    interval: Option<u64>,
) -> anyhow::Result<()> {
    let mut config = load_config(&root, overrides)?;
    if let Some(ms) = interval {
        config.sampling_interval_ms = ms;
        config.max_backoff_ms = config.max_backoff_ms.max(ms);
        config.validate()?;
    }
    let store = open_store(&root, &config)?;
    let service = trace_service(&trace, Arc::clone(&store), &config)?.with_failure_limit(1);
    let detector = Arc::new(Detector::new(&config));

    // Re-run detection on every committed snapshot
    let mut committed = service.subscribe();
    let analysis_store = Arc::clone(&store);
    let analysis_detector = Arc::clone(&detector);
    let analysis = tokio::spawn(async move {
        loop {
            match committed.recv().await {
                Ok(id) => {
                    let window = analysis_store.window();
                    let detector = Arc::clone(&analysis_detector);
                    let candidates =
                        tokio::task::spawn_blocking(move || detector.detect(&window)).await?;
                    match candidates.first() {
                        Some(top) => tracing::info!(
                            "{}: {} suspected leaks, top {} ({}, {:.2})",
                            id,
                            candidates.len(),
                            top.site,
                            top.category,
                            top.confidence
                        ),
                        None => tracing::info!("{}: no suspected leaks", id),
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!("Analysis fell behind by {} snapshots", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
        Ok::<_, anyhow::Error>(())
    });

    let (shutdown_tx, shutdown_rx) = watch_channel::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupted, shutting down");
            let _ = shutdown_tx.send(true);
        }
    });

    service.run(shutdown_rx).await?;
    drop(service);
    if let Err(e) = analysis.await? {
        tracing::error!("Analysis task failed: {}", e);
    }

    let path = leakscope_core::save_window(&store.window(), &root)?;
    tracing::info!("Saved {} snapshots to {}", store.len(), path.display());

    let report = emit(detector.detect(&store.window()));
    write_report(&report, ReportFormat::Table, None)
}

pub fn clear(root: PathBuf) -> anyhow::Result<()> {
    tracing::info!("Clearing cache for: {}", root.display());

    leakscope_core::clear_cache(&root)?;

    tracing::info!("Cache cleared");
    Ok(())
}
