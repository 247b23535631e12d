//! Root-cause classification of growing allocation sites

use crate::growth::{Trend, TrendVerdict};
use crate::history::EdgeHistory;
use crate::rules::{default_rules, LeakCategory, LeakRule, RuleContext};
use leakscope_core::{AllocationSite, DetectorConfig, GrowthSeries, SnapshotId};
use serde::{Deserialize, Serialize};

/// Stand-in for the matched fraction when no structural rule applies.
pub const UNCLASSIFIED_FACTOR: f64 = 0.5;

/// A suspected leak with its supporting snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeakCandidate {
    pub site: AllocationSite,
    pub category: LeakCategory,
    /// In [0, 1].
    pub confidence: f64,
    pub trend: Trend,
    /// Snapshots the growth was observed over, oldest first.
    pub evidence: Vec<SnapshotId>,
}

/// Deterministic rule table: rules are tried in order and the first match wins.
pub struct Classifier {
    rules: Vec<Box<dyn LeakRule>>,
    min_kind_fraction: f64,
}

impl std::fmt::Debug for Classifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let categories: Vec<LeakCategory> = self.rules.iter().map(|r| r.category()).collect();
        f.debug_struct("Classifier")
            .field("rules", &categories)
            .field("min_kind_fraction", &self.min_kind_fraction)
            .finish()
    }
}

impl Classifier {
    pub fn new(config: &DetectorConfig) -> Self {
        Self::with_rules(config, default_rules())
    }

    pub fn with_rules(config: &DetectorConfig, rules: Vec<Box<dyn LeakRule>>) -> Self {
        Classifier {
            rules,
            min_kind_fraction: config.min_kind_fraction,
        }
    }

    /// Append a rule after the existing ones.
    pub fn push_rule(&mut self, rule: Box<dyn LeakRule>) {
        self.rules.push(rule);
    }

    /// Classify a site whose series was analyzed into `verdict`. Sites that
    /// are not growing produce no candidate, and neither do sites no rule
    /// matches that still show objects being released.
    pub fn classify(
        &self,
        series: &GrowthSeries,
        verdict: &TrendVerdict,
        history: &EdgeHistory,
    ) -> Option<LeakCandidate> {
        if !verdict.trend.is_growth() {
            return None;
        }

        let ctx = RuleContext {
            verdict,
            history,
            min_kind_fraction: self.min_kind_fraction,
        };
        let matched = self
            .rules
            .iter()
            .find_map(|rule| rule.evaluate(&ctx).map(|fraction| (rule.category(), fraction)));
        let (category, fraction) = match matched {
            Some(hit) => hit,
            None if history.shows_release() => {
                tracing::debug!("{} grows but releases objects, not reported", series.site());
                return None;
            }
            None => (LeakCategory::UnclassifiedGrowth, UNCLASSIFIED_FACTOR),
        };

        let evidence = series.tail(verdict.window.len()).snapshot_ids();
        let confidence = (fraction * verdict.strength).clamp(0.0, 1.0);
        tracing::debug!(
            "{} classified as {} (fraction {:.2}, strength {:.2})",
            series.site(),
            category,
            fraction,
            verdict.strength
        );

        Some(LeakCandidate {
            site: series.site().clone(),
            category,
            confidence,
            trend: verdict.trend,
            evidence,
        })
    }
}
