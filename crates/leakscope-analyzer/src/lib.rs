//! Leakscope Analyzer: Growth trends, edge history, and root-cause classification

pub mod growth;
pub mod history;
pub mod rules;
pub mod classifier;
pub mod cache;
pub mod pipeline;


#[cfg(test)]
mod test_utils;

pub use growth::{GrowthAnalyzer, Trend, TrendVerdict};
pub use history::{EdgeHistory, HistoryIndex};
pub use rules::{
    default_rules, DanglingSubscription, LeakCategory, LeakRule, ListenerAccumulation,
    ReferenceCycle, RuleContext, UnboundedCache, UnreleasedTimer,
};
pub use classifier::{Classifier, LeakCandidate, UNCLASSIFIED_FACTOR};
pub use cache::VerdictCache;
pub use pipeline::{Detector, PipelineError};
