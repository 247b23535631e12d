//! Detection over a leased snapshot window

use crate::cache::VerdictCache;
use crate::classifier::{Classifier, LeakCandidate};
use crate::growth::{GrowthAnalyzer, TrendVerdict};
use crate::history::HistoryIndex;
use leakscope_core::{growth_series, AllocationSite, DetectorConfig, GrowthSeries, SnapshotWindow};
use rayon::prelude::*;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tracing::{debug, info};

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Detection cancelled after {analyzed} of {total} sites")]
    Cancelled { analyzed: usize, total: usize },
}

/// Growth analysis plus classification for every site in a window. Holds no
/// store state; results depend only on the window passed in, so one detector
/// can serve windows from different stores.
#[derive(Debug)]
pub struct Detector {
    analyzer: GrowthAnalyzer,
    classifier: Classifier,
    verdicts: VerdictCache,
}

impl Detector {
    pub fn new(config: &DetectorConfig) -> Self {
        Self::with_classifier(config, Classifier::new(config))
    }

    pub fn with_classifier(config: &DetectorConfig, classifier: Classifier) -> Self {
        Detector {
            analyzer: GrowthAnalyzer::new(config),
            classifier,
            verdicts: VerdictCache::new(),
        }
    }

    pub fn analyzer(&self) -> &GrowthAnalyzer {
        &self.analyzer
    }

    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    pub fn verdicts(&self) -> &VerdictCache {
        &self.verdicts
    }

    /// Trend of one site over the newest snapshots of `window`.
    pub fn analyze_site(&self, window: &SnapshotWindow, site: &AllocationSite) -> TrendVerdict {
        let series = growth_series(window, site);
        self.verdict_for(&series)
    }

    fn verdict_for(&self, series: &GrowthSeries) -> TrendVerdict {
        let fitted = series.tail(self.analyzer.window());
        self.verdicts
            .get_or_compute(&fitted, || self.analyzer.analyze(series))
    }

    /// Candidates for every growing site in `window`, ordered by site.
    pub fn detect(&self, window: &SnapshotWindow) -> Vec<LeakCandidate> {
        let never = AtomicBool::new(false);
        match self.detect_cancellable(window, &never) {
            Ok(candidates) => candidates,
            Err(PipelineError::Cancelled { .. }) => Vec::new(),
        }
    }

    /// Like [`Detector::detect`], checking `cancel` before and after each
    /// site. A cancelled run evicts nothing from the verdict cache.
    pub fn detect_cancellable(
        &self,
        window: &SnapshotWindow,
        cancel: &AtomicBool,
    ) -> Result<Vec<LeakCandidate>, PipelineError> {
        let sites: Vec<AllocationSite> = window.sites().into_iter().collect();
        let total = sites.len();
        let index = HistoryIndex::new(window);
        let analyzed = AtomicUsize::new(0);

        let results: Vec<Option<LeakCandidate>> = sites
            .par_iter()
            .map(|site| {
                if cancel.load(Ordering::Relaxed) {
                    return Err(());
                }
                let series = growth_series(window, site);
                let verdict = self.verdict_for(&series);
                analyzed.fetch_add(1, Ordering::Relaxed);
                if !verdict.trend.is_growth() {
                    return Ok(None);
                }
                let history = index.history(site);
                let candidate = self.classifier.classify(&series, &verdict, &history);
                if cancel.load(Ordering::Relaxed) {
                    return Err(());
                }
                Ok(candidate)
            })
            .collect::<Result<_, ()>>()
            .map_err(|()| PipelineError::Cancelled {
                analyzed: analyzed.load(Ordering::Relaxed),
                total,
            })?;

        if let Some(first) = window.first() {
            self.verdicts.evict_before(first.id());
        }

        let candidates: Vec<LeakCandidate> = results.into_iter().flatten().collect();
        info!(
            "Analyzed {} sites over {} snapshots, {} suspected leaks",
            total,
            window.len(),
            candidates.len()
        );
        for candidate in &candidates {
            debug!(
                "{} {} confidence {:.2}",
                candidate.site, candidate.category, candidate.confidence
            );
        }
        Ok(candidates)
    }
}
