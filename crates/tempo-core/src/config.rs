//! Engine configuration.
//!
//! Loaded once at startup from a JSON file; every field has a default so a
//! partial file (or none at all) is valid.
//!
//! ```json
//! {
//!   "tick_interval_ms": 50,
//!   "independent_timers": true,
//!   "timing_table_path": "data/timing.json",
//!   "audit": { "shadow_mode": true, "baseline_path": "data/baseline.json" }
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use tempo_audit::{RecorderConfig, SampleClassifier};

use crate::error::{TimingError, TimingResult};

/// Longest tick interval accepted.
pub const MAX_TICK_INTERVAL_MS: u64 = 1_000;

/// Top-level engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Master switch. When false every host hook reports native handling.
    pub enabled: bool,
    /// Scheduler cadence.
    pub tick_interval_ms: u64,
    /// Idle time after which an actor leaves the active set.
    pub idle_eviction_ms: u64,
    /// When false, an accepted action blocks all four channels (shared timer).
    pub independent_timers: bool,
    /// Timing table file. `None` uses the built-in compatibility table.
    pub timing_table_path: Option<PathBuf>,
    /// Fall back to the built-in table when the file is missing or malformed.
    pub compat_table_fallback: bool,
    /// Audit settings.
    pub audit: AuditConfig,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            tick_interval_ms: 50,
            idle_eviction_ms: 30_000,
            independent_timers: true,
            timing_table_path: None,
            compat_table_fallback: true,
            audit: AuditConfig::default(),
        }
    }
}

impl TimingConfig {
    /// Reads, parses and validates a configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`TimingError::ConfigIo`], [`TimingError::ConfigParse`] or
    /// [`TimingError::InvalidConfig`].
    pub fn load(path: impl AsRef<Path>) -> TimingResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| TimingError::ConfigIo {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&text).map_err(|source| TimingError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`TimingError::InvalidConfig`] naming the first bad field.
    pub fn validate(&self) -> TimingResult<()> {
        if self.tick_interval_ms == 0 || self.tick_interval_ms > MAX_TICK_INTERVAL_MS {
            return Err(TimingError::InvalidConfig(format!(
                "tick_interval_ms must be in 1..={MAX_TICK_INTERVAL_MS}, got {}",
                self.tick_interval_ms
            )));
        }
        if self.idle_eviction_ms < self.tick_interval_ms {
            return Err(TimingError::InvalidConfig(format!(
                "idle_eviction_ms ({}) must be at least tick_interval_ms ({})",
                self.idle_eviction_ms, self.tick_interval_ms
            )));
        }
        self.audit.validate()
    }
}

/// Audit subsystem settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    /// |variance| above which a sample is an outlier.
    pub outlier_threshold_ms: u64,
    /// Double-fire cut-off, percent of expected delay.
    pub double_fire_pct: u64,
    /// Fizzle cut-off, percent of expected delay.
    pub fizzle_pct: u64,
    /// Tick-side batch size before a swap.
    pub batch_size: usize,
    /// Raw samples retained for export.
    pub retain_samples: usize,
    /// Tick-side buffer is swapped at least this often.
    pub flush_interval_ms: u64,
    /// Precision contract to compare reports against.
    pub baseline_path: Option<PathBuf>,
    /// Compute native delays alongside engine delays and record the pairs.
    pub shadow_mode: bool,
}

impl Default for AuditConfig {
    fn default() -> Self {
        let classifier = SampleClassifier::default();
        let recorder = RecorderConfig::default();
        Self {
            outlier_threshold_ms: classifier.outlier_threshold_ms,
            double_fire_pct: classifier.double_fire_pct,
            fizzle_pct: classifier.fizzle_pct,
            batch_size: recorder.batch_size,
            retain_samples: recorder.retain_samples,
            flush_interval_ms: 1_000,
            baseline_path: None,
            shadow_mode: false,
        }
    }
}

impl AuditConfig {
    fn validate(&self) -> TimingResult<()> {
        if self.fizzle_pct > 100 {
            return Err(TimingError::InvalidConfig(format!(
                "audit.fizzle_pct must be at most 100, got {}",
                self.fizzle_pct
            )));
        }
        if self.double_fire_pct > self.fizzle_pct {
            return Err(TimingError::InvalidConfig(format!(
                "audit.double_fire_pct ({}) must not exceed audit.fizzle_pct ({})",
                self.double_fire_pct, self.fizzle_pct
            )));
        }
        if self.batch_size == 0 {
            return Err(TimingError::InvalidConfig("audit.batch_size must be at least 1".into()));
        }
        Ok(())
    }

    /// Recorder settings derived from this config.
    #[must_use]
    pub fn recorder_config(&self) -> RecorderConfig {
        RecorderConfig {
            classifier: SampleClassifier {
                outlier_threshold_ms: self.outlier_threshold_ms,
                double_fire_pct: self.double_fire_pct,
                fizzle_pct: self.fizzle_pct,
            },
            batch_size: self.batch_size,
            retain_samples: self.retain_samples,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = TimingConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.tick_interval_ms, 50);
        assert!(config.independent_timers);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config: TimingConfig =
            serde_json::from_str(r#"{ "tick_interval_ms": 25, "audit": { "shadow_mode": true } }"#).unwrap();
        assert_eq!(config.tick_interval_ms, 25);
        assert_eq!(config.idle_eviction_ms, 30_000);
        assert!(config.audit.shadow_mode);
        assert_eq!(config.audit.outlier_threshold_ms, 50);
    }

    #[test]
    fn zero_tick_rejected() {
        let config = TimingConfig {
            tick_interval_ms: 0,
            ..TimingConfig::default()
        };
        assert!(matches!(config.validate(), Err(TimingError::InvalidConfig(_))));
    }

    #[test]
    fn eviction_shorter_than_tick_rejected() {
        let config = TimingConfig {
            tick_interval_ms: 100,
            idle_eviction_ms: 50,
            ..TimingConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn inverted_ratios_rejected() {
        let mut config = TimingConfig::default();
        config.audit.double_fire_pct = 95;
        assert!(config.validate().is_err());
    }

    #[test]
    fn recorder_config_carries_thresholds() {
        let mut audit = AuditConfig::default();
        audit.outlier_threshold_ms = 75;
        audit.batch_size = 8;
        let recorder = audit.recorder_config();
        assert_eq!(recorder.classifier.outlier_threshold_ms, 75);
        assert_eq!(recorder.batch_size, 8);
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = TimingConfig::load("/nonexistent/tempo/config.json").unwrap_err();
        assert!(matches!(err, TimingError::ConfigIo { .. }));
    }
}
