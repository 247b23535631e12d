//! Per-site aggregation of retained objects across snapshots

use crate::model::{AllocationSite, GrowthSeries, SeriesPoint, Snapshot};
use crate::store::SnapshotWindow;
use std::collections::BTreeMap;

/// Retained totals for one allocation site in one snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SiteTotals {
    pub count: u64,
    pub retained_bytes: u64,
}

/// Count and retained bytes of live objects per allocation site.
pub fn site_totals(snapshot: &Snapshot) -> BTreeMap<AllocationSite, SiteTotals> {
    let mut totals: BTreeMap<AllocationSite, SiteTotals> = BTreeMap::new();
    for node in snapshot.nodes() {
        let entry = totals.entry(node.site.clone()).or_default();
        entry.count += 1;
        entry.retained_bytes += node.retained_size;
    }
    totals
}

/// Growth series of `site` over the window. Snapshots without objects from
/// the site contribute a zero sample.
pub fn growth_series(window: &SnapshotWindow, site: &AllocationSite) -> GrowthSeries {
    let mut series = GrowthSeries::new(site.clone());
    for snapshot in window.iter() {
        let totals = snapshot.objects_at(site).fold(SiteTotals::default(), |mut acc, node| {
            acc.count += 1;
            acc.retained_bytes += node.retained_size;
            acc
        });
        let point = SeriesPoint {
            snapshot: snapshot.id(),
            count: totals.count,
            retained_bytes: totals.retained_bytes,
        };
        // Window order is commit order, which is strictly increasing.
        if let Err(e) = series.push(point) {
            tracing::error!("Window out of order for {}: {}", site, e);
            debug_assert!(false, "{e}");
        }
    }
    series
}
