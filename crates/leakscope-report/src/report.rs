use chrono::{DateTime, Utc};
use leakscope_analyzer::{LeakCandidate, LeakCategory, Trend};
use leakscope_core::{AllocationSite, SnapshotId};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// One suspected leak as it appears in a report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportEntry {
    pub site: AllocationSite,
    pub category: LeakCategory,
    pub confidence: f64,
    pub trend: Trend,
    pub evidence_snapshot_ids: Vec<SnapshotId>,
}

impl From<LeakCandidate> for ReportEntry {
    fn from(candidate: LeakCandidate) -> Self {
        ReportEntry {
            site: candidate.site,
            category: candidate.category,
            confidence: candidate.confidence,
            trend: candidate.trend,
            evidence_snapshot_ids: candidate.evidence,
        }
    }
}

/// Ranked leak candidates, most confident first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub generated_at: DateTime<Utc>,
    pub candidates: Vec<ReportEntry>,
}

impl Report {
    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn top(&self) -> Option<&ReportEntry> {
        self.candidates.first()
    }
}

/// Build a report stamped with the current time.
pub fn emit(candidates: Vec<LeakCandidate>) -> Report {
    emit_at(candidates, Utc::now())
}

/// Build a report generated at `generated_at`. Confidence descending, ties
/// broken by site so the order is total.
pub fn emit_at(candidates: Vec<LeakCandidate>, generated_at: DateTime<Utc>) -> Report {
    let mut entries: Vec<ReportEntry> = candidates.into_iter().map(ReportEntry::from).collect();
    entries.sort_by(rank);
    tracing::debug!("Emitting report with {} candidates", entries.len());
    Report {
        generated_at,
        candidates: entries,
    }
}

fn rank(a: &ReportEntry, b: &ReportEntry) -> Ordering {
    b.confidence
        .total_cmp(&a.confidence)
        .then_with(|| a.site.cmp(&b.site))
        .then_with(|| a.category.cmp(&b.category))
}
