//! Text renderings of a report

use crate::report::Report;
use std::fmt::Write;

pub fn to_json_pretty(report: &Report) -> serde_json::Result<String> {
    serde_json::to_string_pretty(report)
}

/// Fixed-width table for terminals, one candidate per row.
pub fn render_table(report: &Report) -> String {
    let mut out = String::new();
    if report.is_empty() {
        let _ = writeln!(out, "No suspected leaks ({})", report.generated_at.to_rfc3339());
        return out;
    }

    let site_width = report
        .candidates
        .iter()
        .map(|c| c.site.as_str().len())
        .max()
        .unwrap_or(0)
        .max("SITE".len());

    let _ = writeln!(
        out,
        "{:<site_width$}  {:<22}  {:>10}  {:<17}  SNAPSHOTS",
        "SITE", "CATEGORY", "CONFIDENCE", "TREND"
    );
    for entry in &report.candidates {
        let span = match (entry.evidence_snapshot_ids.first(), entry.evidence_snapshot_ids.last()) {
            (Some(first), Some(last)) => format!("{first}..{last}"),
            _ => "-".to_string(),
        };
        let _ = writeln!(
            out,
            "{:<site_width$}  {:<22}  {:>10.2}  {:<17}  {}",
            entry.site.as_str(),
            entry.category.as_str(),
            entry.confidence,
            entry.trend.as_str(),
            span
        );
    }
    out
}
