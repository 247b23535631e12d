//! Detector configuration loaded from `leakscope.toml`

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Config file looked up in the repository root.
pub const CONFIG_FILE: &str = "leakscope.toml";

/// Documented defaults. Nothing else is implied.
pub mod defaults {
    pub const RETENTION: usize = 64;
    pub const ANALYSIS_WINDOW: usize = 30;
    pub const SLOPE_THRESHOLD: f64 = 0.25;
    pub const NOISE_TOLERANCE: f64 = 0.0;
    pub const FLAP_THRESHOLD: f64 = 0.5;
    pub const MIN_KIND_FRACTION: f64 = 0.5;
    pub const SAMPLING_INTERVAL_MS: u64 = 1_000;
    pub const COLLECT_TIMEOUT_MS: u64 = 5_000;
    pub const MAX_BACKOFF_MS: u64 = 30_000;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Snapshots kept by the store before eviction.
    pub retention: usize,
    /// Newest snapshots fitted by the growth analyzer (N).
    pub analysis_window: usize,
    /// Objects per snapshot above which a fitted slope counts as growth.
    pub slope_threshold: f64,
    /// Decreases of at most this many objects are noise (ε).
    pub noise_tolerance: f64,
    /// Share of sign flips in the first differences that marks oscillation.
    pub flap_threshold: f64,
    /// Share of retaining edges a kind needs before a rule treats it as the
    /// site's edge kind.
    pub min_kind_fraction: f64,
    pub sampling_interval_ms: u64,
    pub collect_timeout_ms: u64,
    /// Upper bound of the collection retry backoff.
    pub max_backoff_ms: u64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        DetectorConfig {
            retention: defaults::RETENTION,
            analysis_window: defaults::ANALYSIS_WINDOW,
            slope_threshold: defaults::SLOPE_THRESHOLD,
            noise_tolerance: defaults::NOISE_TOLERANCE,
            flap_threshold: defaults::FLAP_THRESHOLD,
            min_kind_fraction: defaults::MIN_KIND_FRACTION,
            sampling_interval_ms: defaults::SAMPLING_INTERVAL_MS,
            collect_timeout_ms: defaults::COLLECT_TIMEOUT_MS,
            max_backoff_ms: defaults::MAX_BACKOFF_MS,
        }
    }
}

impl DetectorConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml(source: &str) -> Result<Self, ConfigError> {
        let config: DetectorConfig = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let source = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&source)
    }

    /// Load `leakscope.toml` from `root`, or the defaults if there is none.
    pub fn load_or_default(root: &Path) -> Result<Self, ConfigError> {
        let path = root.join(CONFIG_FILE);
        if path.exists() {
            tracing::debug!("Loading config from {}", path.display());
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
            ConfigError::Invalid { field, reason: reason.into() }
        }

        if self.analysis_window < 3 {
            return Err(invalid("analysis_window", "must be at least 3"));
        }
        if self.retention < self.analysis_window {
            return Err(invalid("retention", "must be at least analysis_window"));
        }
        if !self.slope_threshold.is_finite() || self.slope_threshold < 0.0 {
            return Err(invalid("slope_threshold", "must be a non-negative number"));
        }
        if !self.noise_tolerance.is_finite() || self.noise_tolerance < 0.0 {
            return Err(invalid("noise_tolerance", "must be a non-negative number"));
        }
        if !(self.flap_threshold > 0.0 && self.flap_threshold <= 1.0) {
            return Err(invalid("flap_threshold", "must be in (0, 1]"));
        }
        if !(self.min_kind_fraction > 0.0 && self.min_kind_fraction <= 1.0) {
            return Err(invalid("min_kind_fraction", "must be in (0, 1]"));
        }
        if self.sampling_interval_ms == 0 {
            return Err(invalid("sampling_interval_ms", "must be positive"));
        }
        if self.collect_timeout_ms == 0 {
            return Err(invalid("collect_timeout_ms", "must be positive"));
        }
        if self.max_backoff_ms < self.sampling_interval_ms {
            return Err(invalid("max_backoff_ms", "must be at least sampling_interval_ms"));
        }
        Ok(())
    }

    pub fn sampling_interval(&self) -> Duration {
        Duration::from_millis(self.sampling_interval_ms)
    }

    pub fn collect_timeout(&self) -> Duration {
        Duration::from_millis(self.collect_timeout_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }
}
