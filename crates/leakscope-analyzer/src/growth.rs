//! Growth trend detection over retained-count series

use leakscope_core::{AllocationSite, DetectorConfig, GrowthSeries, SnapshotId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Shape of a site's retained-count series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Trend {
    /// Fewer than three samples. Never a growth verdict.
    InsufficientData,
    Stable,
    /// Growing, but with decreases beyond the noise tolerance.
    LinearGrowth,
    /// Growing with no decrease beyond the noise tolerance.
    UnboundedGrowth,
    /// First differences keep flipping sign; typical of bounded caches.
    Oscillating,
}

impl Trend {
    pub fn is_growth(self) -> bool {
        matches!(self, Trend::LinearGrowth | Trend::UnboundedGrowth)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Trend::InsufficientData => "insufficient-data",
            Trend::Stable => "stable",
            Trend::LinearGrowth => "linear-growth",
            Trend::UnboundedGrowth => "unbounded-growth",
            Trend::Oscillating => "oscillating",
        }
    }
}

impl fmt::Display for Trend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of analyzing one series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendVerdict {
    pub site: AllocationSite,
    pub trend: Trend,
    /// Least-squares slope in objects per snapshot.
    pub slope: f64,
    pub r_squared: f64,
    /// In [0, 1]; zero unless the trend is growth.
    pub strength: f64,
    /// Snapshots the verdict was fitted over, oldest first.
    pub window: Vec<SnapshotId>,
}

#[derive(Debug, Clone)]
pub struct GrowthAnalyzer {
    window: usize,
    slope_threshold: f64,
    noise_tolerance: f64,
    flap_threshold: f64,
}

impl GrowthAnalyzer {
    pub fn new(config: &DetectorConfig) -> Self {
        GrowthAnalyzer {
            window: config.analysis_window,
            slope_threshold: config.slope_threshold,
            noise_tolerance: config.noise_tolerance,
            flap_threshold: config.flap_threshold,
        }
    }

    /// Number of newest samples fitted.
    pub fn window(&self) -> usize {
        self.window
    }

    /// Classify the newest `window` samples of `series`.
    pub fn analyze(&self, series: &GrowthSeries) -> TrendVerdict {
        let series = series.tail(self.window);
        let mut verdict = TrendVerdict {
            site: series.site().clone(),
            trend: Trend::InsufficientData,
            slope: 0.0,
            r_squared: 0.0,
            strength: 0.0,
            window: series.snapshot_ids(),
        };
        if series.len() < 3 {
            return verdict;
        }

        let xs: Vec<f64> = series.points().iter().map(|p| p.snapshot.0 as f64).collect();
        let ys: Vec<f64> = series.points().iter().map(|p| p.count as f64).collect();
        let (slope, r_squared) = least_squares(&xs, &ys);

        let steps: Vec<f64> = ys.windows(2).map(|w| w[1] - w[0]).collect();
        let eps = self.noise_tolerance;
        let decreased = steps.iter().any(|&d| d < -eps);
        let flapping = self.is_flapping(&steps);

        let trend = if slope > self.slope_threshold {
            if !decreased {
                Trend::UnboundedGrowth
            } else if flapping {
                Trend::Oscillating
            } else {
                Trend::LinearGrowth
            }
        } else if flapping {
            Trend::Oscillating
        } else {
            Trend::Stable
        };

        let strength = if trend.is_growth() {
            let steady = steps.iter().filter(|&&d| d >= -eps).count() as f64 / steps.len() as f64;
            (r_squared * steady).clamp(0.0, 1.0)
        } else {
            0.0
        };

        verdict.trend = trend;
        verdict.slope = slope;
        verdict.r_squared = r_squared;
        verdict.strength = strength;
        verdict
    }

    /// Share of sign flips among consecutive significant steps.
    fn is_flapping(&self, steps: &[f64]) -> bool {
        let signs: Vec<bool> = steps
            .iter()
            .filter(|d| d.abs() > self.noise_tolerance)
            .map(|&d| d > 0.0)
            .collect();
        if signs.len() < 2 {
            return false;
        }
        let flips = signs.windows(2).filter(|w| w[0] != w[1]).count();
        flips as f64 / (signs.len() - 1) as f64 >= self.flap_threshold
    }
}

/// Slope and coefficient of determination of the least-squares line.
/// A flat series has r² of zero.
fn least_squares(xs: &[f64], ys: &[f64]) -> (f64, f64) {
    let n = xs.len() as f64;
    let mean_x = xs.iter().sum::<f64>() / n;
    let mean_y = ys.iter().sum::<f64>() / n;

    let mut sxx = 0.0;
    let mut sxy = 0.0;
    let mut syy = 0.0;
    for (x, y) in xs.iter().zip(ys) {
        let dx = x - mean_x;
        let dy = y - mean_y;
        sxx += dx * dx;
        sxy += dx * dy;
        syy += dy * dy;
    }

    if sxx == 0.0 {
        return (0.0, 0.0);
    }
    let slope = sxy / sxx;
    let r_squared = if syy == 0.0 { 0.0 } else { (sxy * sxy) / (sxx * syy) };
    (slope, r_squared)
}
