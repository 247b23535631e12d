//! Leak categories and the structural rules that detect them

use crate::growth::{Trend, TrendVerdict};
use crate::history::EdgeHistory;
use leakscope_core::{EdgeKind, EventKind};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Known leak mechanisms. Host-specific rules may report their own.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum LeakCategory {
    ListenerAccumulation,
    UnreleasedTimer,
    UnboundedCache,
    ReferenceCycle,
    DanglingSubscription,
    UnclassifiedGrowth,
    Custom(String),
}

impl LeakCategory {
    pub fn as_str(&self) -> &str {
        match self {
            LeakCategory::ListenerAccumulation => "listener-accumulation",
            LeakCategory::UnreleasedTimer => "unreleased-timer",
            LeakCategory::UnboundedCache => "unbounded-cache",
            LeakCategory::ReferenceCycle => "reference-cycle",
            LeakCategory::DanglingSubscription => "dangling-subscription",
            LeakCategory::UnclassifiedGrowth => "unclassified-growth",
            LeakCategory::Custom(name) => name,
        }
    }
}

impl From<String> for LeakCategory {
    fn from(name: String) -> Self {
        match name.as_str() {
            "listener-accumulation" => LeakCategory::ListenerAccumulation,
            "unreleased-timer" => LeakCategory::UnreleasedTimer,
            "unbounded-cache" => LeakCategory::UnboundedCache,
            "reference-cycle" => LeakCategory::ReferenceCycle,
            "dangling-subscription" => LeakCategory::DanglingSubscription,
            "unclassified-growth" => LeakCategory::UnclassifiedGrowth,
            _ => LeakCategory::Custom(name),
        }
    }
}

impl From<LeakCategory> for String {
    fn from(category: LeakCategory) -> Self {
        category.as_str().to_string()
    }
}

impl fmt::Display for LeakCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inputs a rule sees for one site.
#[derive(Debug, Clone, Copy)]
pub struct RuleContext<'a> {
    pub verdict: &'a TrendVerdict,
    pub history: &'a EdgeHistory,
    /// Share of retaining edges a kind needs to count as the site's kind.
    pub min_kind_fraction: f64,
}

impl RuleContext<'_> {
    fn unbounded(&self) -> bool {
        self.verdict.trend == Trend::UnboundedGrowth
    }

    /// Fraction of `kind` if it meets the minimum share.
    fn dominant(&self, kind: EdgeKind) -> Option<f64> {
        let fraction = self.history.kind_fraction(kind);
        (fraction > 0.0 && fraction >= self.min_kind_fraction).then_some(fraction)
    }
}

/// One row of the classification table. `evaluate` returns the matched
/// edge-kind fraction when the rule applies.
pub trait LeakRule: Send + Sync {
    fn category(&self) -> LeakCategory;

    fn evaluate(&self, ctx: &RuleContext<'_>) -> Option<f64>;
}

/// Every retaining edge is a listener and detached targets stay off the
/// root set afterwards.
pub struct ListenerAccumulation;

impl LeakRule for ListenerAccumulation {
    fn category(&self) -> LeakCategory {
        LeakCategory::ListenerAccumulation
    }

    fn evaluate(&self, ctx: &RuleContext<'_>) -> Option<f64> {
        if !ctx.unbounded() || ctx.history.detached == 0 || ctx.history.detach_target_rooted {
            return None;
        }
        let fraction = ctx.history.kind_fraction(EdgeKind::Listener);
        (fraction >= 1.0).then_some(fraction)
    }
}

pub struct UnreleasedTimer;

impl LeakRule for UnreleasedTimer {
    fn category(&self) -> LeakCategory {
        LeakCategory::UnreleasedTimer
    }

    fn evaluate(&self, ctx: &RuleContext<'_>) -> Option<f64> {
        if !ctx.unbounded() || ctx.history.event_count(EventKind::TimerCancel) > 0 {
            return None;
        }
        ctx.dominant(EdgeKind::Timer)
    }
}

/// Cache entries pile up and no entry is ever dropped.
pub struct UnboundedCache;

impl LeakRule for UnboundedCache {
    fn category(&self) -> LeakCategory {
        LeakCategory::UnboundedCache
    }

    fn evaluate(&self, ctx: &RuleContext<'_>) -> Option<f64> {
        if !ctx.unbounded()
            || ctx.history.removed_count(EdgeKind::CacheEntry) > 0
            || ctx.history.event_count(EventKind::Evict) > 0
        {
            return None;
        }
        ctx.dominant(EdgeKind::CacheEntry)
    }
}

/// Site objects sit on strong cycles that are never broken.
pub struct ReferenceCycle;

impl LeakRule for ReferenceCycle {
    fn category(&self) -> LeakCategory {
        LeakCategory::ReferenceCycle
    }

    fn evaluate(&self, ctx: &RuleContext<'_>) -> Option<f64> {
        let history = ctx.history;
        if !ctx.unbounded()
            || history.cycle_members == 0
            || history.event_count(EventKind::Nulled) > 0
        {
            return None;
        }
        Some(history.cycle_members as f64 / history.object_count as f64)
    }
}

pub struct DanglingSubscription;

impl LeakRule for DanglingSubscription {
    fn category(&self) -> LeakCategory {
        LeakCategory::DanglingSubscription
    }

    fn evaluate(&self, ctx: &RuleContext<'_>) -> Option<f64> {
        if !ctx.unbounded() || ctx.history.event_count(EventKind::Unsubscribe) > 0 {
            return None;
        }
        ctx.dominant(EdgeKind::Subscription)
    }
}

/// The built-in table, most specific structural signature first.
pub fn default_rules() -> Vec<Box<dyn LeakRule>> {
    vec![
        Box::new(ListenerAccumulation),
        Box::new(UnreleasedTimer),
        Box::new(UnboundedCache),
        Box::new(ReferenceCycle),
        Box::new(DanglingSubscription),
    ]
}
