//! Running variance statistics.
//!
//! [`VarianceStats`] keeps exact integer moments of the signed variance so that
//! two partial aggregates merge without loss and the derived mean and
//! population variance match a reference computation bit-for-bit.

use serde::{Deserialize, Serialize};

use crate::sample::{ActionKind, TimingSample};

/// Aggregate statistics for one action kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VarianceStats {
    /// Number of samples.
    pub count: u64,
    /// Sum of signed variance.
    pub sum: i128,
    /// Sum of squared variance.
    pub sum_sq: i128,
    /// Sum of |variance|.
    pub sum_abs: u128,
    /// Largest |variance| seen.
    pub max_abs: u64,
    /// Samples flagged as outliers.
    pub outliers: u64,
    /// Samples flagged as double-fires.
    pub double_fires: u64,
    /// Samples flagged as fizzles.
    pub fizzles: u64,
}

impl VarianceStats {
    /// Create empty stats.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Create stats from a single sample.
    #[must_use]
    pub fn from_sample(sample: &TimingSample) -> Self {
        let mut stats = Self::empty();
        stats.push(sample);
        stats
    }

    /// Fold one sample in.
    pub fn push(&mut self, sample: &TimingSample) {
        let v = i128::from(sample.variance_ms());
        let abs = sample.variance_ms().unsigned_abs();

        self.count += 1;
        self.sum += v;
        self.sum_sq += v * v;
        self.sum_abs += u128::from(abs);
        self.max_abs = self.max_abs.max(abs);
        self.outliers += u64::from(sample.is_outlier());
        self.double_fires += u64::from(sample.is_double_fire());
        self.fizzles += u64::from(sample.is_fizzle());
    }

    /// Merge two stats.
    ///
    /// Moments are additive, so the merge is exact and order-independent.
    #[must_use]
    pub fn merge(a: &Self, b: &Self) -> Self {
        Self {
            count: a.count + b.count,
            sum: a.sum + b.sum,
            sum_sq: a.sum_sq + b.sum_sq,
            sum_abs: a.sum_abs + b.sum_abs,
            max_abs: a.max_abs.max(b.max_abs),
            outliers: a.outliers + b.outliers,
            double_fires: a.double_fires + b.double_fires,
            fizzles: a.fizzles + b.fizzles,
        }
    }

    /// Merge multiple stats.
    #[must_use]
    pub fn merge_many(stats: &[Self]) -> Self {
        stats
            .iter()
            .fold(Self::empty(), |acc, s| Self::merge(&acc, s))
    }

    /// Mean |variance| in ms (0 when empty).
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn mean_abs_ms(&self) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        self.sum_abs as f64 / self.count as f64
    }

    /// Signed mean variance in ms (0 when empty).
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn mean_ms(&self) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        self.sum as f64 / self.count as f64
    }

    /// Population variance of the signed variance (σ², ms²).
    ///
    /// Computed as `(n·Σv² − (Σv)²) / n²` in integers before the final
    /// division.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn population_variance(&self) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        let n = i128::from(self.count);
        let numerator = n * self.sum_sq - self.sum * self.sum;
        numerator as f64 / (n * n) as f64
    }

    /// Standard deviation.
    #[must_use]
    pub fn std_dev_ms(&self) -> f64 {
        self.population_variance().sqrt()
    }

    /// Fraction of samples that are outliers (0.0 to 1.0).
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn outlier_rate(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.outliers as f64 / self.count as f64
        }
    }
}

/// One [`VarianceStats`] per [`ActionKind`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KindStats {
    /// Stats indexed by [`ActionKind::index`].
    pub kinds: [VarianceStats; ActionKind::COUNT],
}

impl KindStats {
    /// Fold one sample into its kind's stats.
    pub fn push(&mut self, sample: &TimingSample) {
        self.kinds[sample.kind().index()].push(sample);
    }

    /// Stats for one kind.
    #[must_use]
    pub fn get(&self, kind: ActionKind) -> &VarianceStats {
        &self.kinds[kind.index()]
    }

    /// Stats across all kinds.
    #[must_use]
    pub fn total(&self) -> VarianceStats {
        VarianceStats::merge_many(&self.kinds)
    }

    /// Merge two per-kind aggregates.
    #[must_use]
    pub fn merge(a: &Self, b: &Self) -> Self {
        let mut kinds = [VarianceStats::empty(); ActionKind::COUNT];
        for (i, slot) in kinds.iter_mut().enumerate() {
            *slot = VarianceStats::merge(&a.kinds[i], &b.kinds[i]);
        }
        Self { kinds }
    }
}
