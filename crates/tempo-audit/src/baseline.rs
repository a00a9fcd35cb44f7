//! Baseline thresholds and regression detection.
//!
//! A [`BaselineMetrics`] document describes the precision contract per action
//! kind. Comparing it against a [`KindStats`] aggregate yields a
//! [`BaselineVerdict`] listing every threshold that was exceeded. Verdicts are
//! reported, never enforced: nothing here can stop an action from running.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{AuditError, AuditResult};
use crate::sample::ActionKind;
use crate::stats::{KindStats, VarianceStats};

/// Limits for one action kind.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KindThresholds {
    /// Maximum acceptable mean |variance|.
    pub max_mean_abs_variance_ms: f64,
    /// Maximum acceptable single |variance|.
    pub max_abs_variance_ms: u64,
    /// Maximum acceptable outlier fraction (0.0 to 1.0).
    pub max_outlier_rate: f64,
    /// Maximum acceptable double-fires.
    pub max_double_fires: u64,
    /// Maximum acceptable fizzles.
    pub max_fizzles: u64,
}

impl Default for KindThresholds {
    /// The ±25ms-class contract: mean within 25ms, no single sample beyond
    /// two ticks, at most 1% outliers, and no double-fires.
    fn default() -> Self {
        Self {
            max_mean_abs_variance_ms: 25.0,
            max_abs_variance_ms: 100,
            max_outlier_rate: 0.01,
            max_double_fires: 0,
            max_fizzles: u64::MAX,
        }
    }
}

/// Baseline document loaded from configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BaselineMetrics {
    /// Thresholds applied to kinds without an override.
    pub default: KindThresholds,
    /// Per-kind overrides.
    pub kinds: BTreeMap<ActionKind, KindThresholds>,
    /// Kinds with fewer samples than this are reported as insufficient.
    pub min_samples: u64,
}

impl Default for BaselineMetrics {
    fn default() -> Self {
        Self {
            default: KindThresholds::default(),
            kinds: BTreeMap::new(),
            min_samples: 1,
        }
    }
}

impl BaselineMetrics {
    /// Loads a baseline from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::BaselineIo`] if the file cannot be read and
    /// [`AuditError::BaselineParse`] if it is not a valid baseline document.
    pub fn load(path: impl AsRef<Path>) -> AuditResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| AuditError::BaselineIo {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| AuditError::BaselineParse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Thresholds in force for `kind`.
    #[must_use]
    pub fn thresholds(&self, kind: ActionKind) -> &KindThresholds {
        self.kinds.get(&kind).unwrap_or(&self.default)
    }

    /// Compares an aggregate against this baseline.
    ///
    /// Every regressed kind is also logged at `warn`.
    #[must_use]
    pub fn compare(&self, stats: &KindStats) -> BaselineVerdict {
        let kinds: Vec<KindVerdict> = ActionKind::ALL
            .iter()
            .map(|&kind| self.compare_kind(kind, stats.get(kind)))
            .collect();

        for verdict in kinds.iter().filter(|v| v.status == VerdictStatus::Regressed) {
            for finding in &verdict.findings {
                warn!(kind = %verdict.kind, %finding, "timing baseline regression");
            }
        }

        let passed = kinds.iter().all(|v| v.status != VerdictStatus::Regressed);
        BaselineVerdict { passed, kinds }
    }

    #[allow(clippy::cast_precision_loss)]
    fn compare_kind(&self, kind: ActionKind, stats: &VarianceStats) -> KindVerdict {
        if stats.count < self.min_samples.max(1) {
            return KindVerdict {
                kind,
                status: VerdictStatus::Insufficient,
                findings: Vec::new(),
            };
        }

        let limits = self.thresholds(kind);
        let mut findings = Vec::new();
        let mut check = |metric: Metric, observed: f64, limit: f64| {
            if observed > limit {
                findings.push(Finding {
                    metric,
                    observed,
                    limit,
                });
            }
        };

        check(
            Metric::MeanAbsVariance,
            stats.mean_abs_ms(),
            limits.max_mean_abs_variance_ms,
        );
        check(
            Metric::MaxAbsVariance,
            stats.max_abs as f64,
            limits.max_abs_variance_ms as f64,
        );
        check(Metric::OutlierRate, stats.outlier_rate(), limits.max_outlier_rate);
        check(
            Metric::DoubleFires,
            stats.double_fires as f64,
            limits.max_double_fires as f64,
        );
        check(Metric::Fizzles, stats.fizzles as f64, limits.max_fizzles as f64);

        let status = if findings.is_empty() {
            VerdictStatus::Pass
        } else {
            VerdictStatus::Regressed
        };
        KindVerdict {
            kind,
            status,
            findings,
        }
    }
}

/// Which aggregate a finding refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    /// Mean |variance|.
    MeanAbsVariance,
    /// Max |variance|.
    MaxAbsVariance,
    /// Outlier fraction.
    OutlierRate,
    /// Double-fire count.
    DoubleFires,
    /// Fizzle count.
    Fizzles,
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MeanAbsVariance => write!(f, "mean |variance|"),
            Self::MaxAbsVariance => write!(f, "max |variance|"),
            Self::OutlierRate => write!(f, "outlier rate"),
            Self::DoubleFires => write!(f, "double-fires"),
            Self::Fizzles => write!(f, "fizzles"),
        }
    }
}

/// One exceeded threshold.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    /// Metric that regressed.
    pub metric: Metric,
    /// Observed value.
    pub observed: f64,
    /// Limit from the baseline.
    pub limit: f64,
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {:.3} > {:.3}", self.metric, self.observed, self.limit)
    }
}

/// Outcome for one kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerdictStatus {
    /// Within all thresholds.
    Pass,
    /// At least one threshold exceeded.
    Regressed,
    /// Too few samples to judge.
    Insufficient,
}

impl fmt::Display for VerdictStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pass => write!(f, "PASS"),
            Self::Regressed => write!(f, "REGRESSED"),
            Self::Insufficient => write!(f, "n/a"),
        }
    }
}

/// Per-kind verdict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KindVerdict {
    /// Action kind.
    pub kind: ActionKind,
    /// Outcome.
    pub status: VerdictStatus,
    /// Exceeded thresholds (empty unless regressed).
    pub findings: Vec<Finding>,
}

/// Result of a baseline comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaselineVerdict {
    /// True when no kind regressed.
    pub passed: bool,
    /// One verdict per kind, in processing order.
    pub kinds: Vec<KindVerdict>,
}

impl BaselineVerdict {
    /// Verdict for one kind.
    #[must_use]
    pub fn kind(&self, kind: ActionKind) -> Option<&KindVerdict> {
        self.kinds.iter().find(|v| v.kind == kind)
    }
}
