//! Verdict cache so repeated detection runs skip unchanged fits

use crate::growth::TrendVerdict;
use dashmap::DashMap;
use leakscope_core::{AllocationSite, GrowthSeries, SeriesPoint, SnapshotId};

/// Key for cache lookups: a site and the exact samples it was fitted over.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
struct CacheKey {
    site: AllocationSite,
    points: Vec<SeriesPoint>,
}

impl CacheKey {
    fn first(&self) -> Option<SnapshotId> {
        self.points.first().map(|p| p.snapshot)
    }
}

/// Trend verdicts keyed by the fitted samples themselves, so two windows
/// that share snapshot ids but differ in content never share an entry.
#[derive(Debug, Default)]
pub struct VerdictCache {
    entries: DashMap<CacheKey, TrendVerdict>,
}

impl VerdictCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached verdict for the samples in `fitted`, computing it on a miss.
    pub fn get_or_compute(
        &self,
        fitted: &GrowthSeries,
        compute: impl FnOnce() -> TrendVerdict,
    ) -> TrendVerdict {
        if fitted.is_empty() {
            return compute();
        }
        let key = CacheKey {
            site: fitted.site().clone(),
            points: fitted.points().to_vec(),
        };
        if let Some(hit) = self.entries.get(&key) {
            return hit.value().clone();
        }
        let verdict = compute();
        self.entries.insert(key, verdict.clone());
        verdict
    }

    /// Drop entries fitted over anything older than `oldest`.
    pub fn evict_before(&self, oldest: SnapshotId) {
        self.entries
            .retain(|key, _| key.first().is_some_and(|first| first >= oldest));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Clear all entries
    pub fn clear(&self) {
        self.entries.clear();
    }
}
