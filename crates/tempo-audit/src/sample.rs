//! Timing samples and their classification.
//!
//! A [`TimingSample`] is the immutable record of one completed timed action:
//! what the formula expected, what the scheduler actually delivered, and the
//! flags derived from the difference. Samples are only produced by a
//! [`SampleClassifier`], so the flags always agree with the thresholds that
//! were in force when the sample was taken.
//!
//! # Example
//!
//! ```
//! use tempo_audit::{ActionKind, RawSample, SampleClassifier, SampleFlags};
//!
//! let classifier = SampleClassifier::default();
//! let sample = classifier.classify(RawSample {
//!     kind: ActionKind::Swing,
//!     actor: 7,
//!     expected_ms: 1450,
//!     actual_ms: 1450,
//!     at_ms: 10_000,
//!     resource_consumed: true,
//! });
//!
//! assert_eq!(sample.variance_ms(), 0);
//! assert!(sample.flags().is_empty());
//! ```

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::fmt;

// =============================================================================
// Action Kind
// =============================================================================

/// The four independently timed action categories.
///
/// The declaration order is the fixed processing order used by the scheduler
/// within a tick: swing, spell, bandage, wand.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    /// Weapon swing (melee or ranged attack).
    Swing,
    /// Spell cast.
    Spell,
    /// Bandage application.
    Bandage,
    /// Wand or other charged-item use.
    Wand,
}

impl ActionKind {
    /// Number of action kinds.
    pub const COUNT: usize = 4;

    /// All kinds in fixed processing order.
    pub const ALL: [ActionKind; Self::COUNT] = [Self::Swing, Self::Spell, Self::Bandage, Self::Wand];

    /// Dense index of this kind, matching its position in [`ActionKind::ALL`].
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::Swing => 0,
            Self::Spell => 1,
            Self::Bandage => 2,
            Self::Wand => 3,
        }
    }

    /// Lowercase name used in reports and log fields.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Swing => "swing",
            Self::Spell => "spell",
            Self::Bandage => "bandage",
            Self::Wand => "wand",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Sample Flags
// =============================================================================

bitflags! {
    /// Classification flags derived from a sample's expected/actual pair.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct SampleFlags: u8 {
        /// |variance| exceeded the outlier threshold.
        const OUTLIER = 0b0000_0001;
        /// Fired far too early with nothing consumed: a scheduling defect.
        const DOUBLE_FIRE = 0b0000_0010;
        /// Completed early with nothing consumed.
        const FIZZLE = 0b0000_0100;
    }
}

// =============================================================================
// Raw Sample
// =============================================================================

/// Measurement handed to the classifier by an action routine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawSample {
    /// Which channel completed.
    pub kind: ActionKind,
    /// Opaque host actor handle.
    pub actor: u64,
    /// Formula-derived delay.
    pub expected_ms: u64,
    /// Realized delay between acceptance and firing.
    pub actual_ms: u64,
    /// Tick-clock timestamp of completion.
    pub at_ms: u64,
    /// Whether the resolution consumed its resource (ammo, mana, bandage, charge).
    pub resource_consumed: bool,
}

// =============================================================================
// Timing Sample
// =============================================================================

/// Immutable record of one completed action.
///
/// Fields are private; a sample can only be obtained from
/// [`SampleClassifier::classify`] (or deserialized from an export).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimingSample {
    kind: ActionKind,
    actor: u64,
    expected_ms: u64,
    actual_ms: u64,
    variance_ms: i64,
    at_ms: u64,
    resource_consumed: bool,
    flags: SampleFlags,
}

impl TimingSample {
    /// Action kind.
    #[must_use]
    pub const fn kind(&self) -> ActionKind {
        self.kind
    }

    /// Actor handle.
    #[must_use]
    pub const fn actor(&self) -> u64 {
        self.actor
    }

    /// Expected delay in ms.
    #[must_use]
    pub const fn expected_ms(&self) -> u64 {
        self.expected_ms
    }

    /// Actual delay in ms.
    #[must_use]
    pub const fn actual_ms(&self) -> u64 {
        self.actual_ms
    }

    /// `actual - expected` in ms.
    #[must_use]
    pub const fn variance_ms(&self) -> i64 {
        self.variance_ms
    }

    /// Completion timestamp.
    #[must_use]
    pub const fn at_ms(&self) -> u64 {
        self.at_ms
    }

    /// Whether a resource was consumed.
    #[must_use]
    pub const fn resource_consumed(&self) -> bool {
        self.resource_consumed
    }

    /// Derived classification flags.
    #[must_use]
    pub const fn flags(&self) -> SampleFlags {
        self.flags
    }

    /// Shorthand for `flags().contains(OUTLIER)`.
    #[must_use]
    pub const fn is_outlier(&self) -> bool {
        self.flags.contains(SampleFlags::OUTLIER)
    }

    /// Shorthand for `flags().contains(DOUBLE_FIRE)`.
    #[must_use]
    pub const fn is_double_fire(&self) -> bool {
        self.flags.contains(SampleFlags::DOUBLE_FIRE)
    }

    /// Shorthand for `flags().contains(FIZZLE)`.
    #[must_use]
    pub const fn is_fizzle(&self) -> bool {
        self.flags.contains(SampleFlags::FIZZLE)
    }
}

// =============================================================================
// Classifier
// =============================================================================

/// Thresholds that turn a [`RawSample`] into a classified [`TimingSample`].
///
/// Ratios are whole percentages of the expected delay so that classification
/// is exact integer arithmetic.
///
/// - **Outlier**: `|actual - expected| > outlier_threshold_ms`
/// - **Double-fire**: nothing consumed and `actual < expected * double_fire_pct / 100`
/// - **Fizzle**: nothing consumed and `actual < expected * fizzle_pct / 100`,
///   and not already a double-fire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SampleClassifier {
    /// Absolute variance above which a sample is an outlier.
    pub outlier_threshold_ms: u64,
    /// Percentage of expected below which an unconsumed action is a double-fire.
    pub double_fire_pct: u64,
    /// Percentage of expected below which an unconsumed action is a fizzle.
    pub fizzle_pct: u64,
}

impl Default for SampleClassifier {
    fn default() -> Self {
        Self {
            outlier_threshold_ms: 50,
            double_fire_pct: 30,
            fizzle_pct: 90,
        }
    }
}

impl SampleClassifier {
    /// Classifies a raw measurement.
    #[must_use]
    pub fn classify(&self, raw: RawSample) -> TimingSample {
        let variance_ms = signed_diff(raw.actual_ms, raw.expected_ms);
        let mut flags = SampleFlags::empty();

        if variance_ms.unsigned_abs() > self.outlier_threshold_ms {
            flags |= SampleFlags::OUTLIER;
        }

        if !raw.resource_consumed && raw.expected_ms > 0 {
            let actual_scaled = u128::from(raw.actual_ms) * 100;
            let expected = u128::from(raw.expected_ms);
            if actual_scaled < expected * u128::from(self.double_fire_pct) {
                flags |= SampleFlags::DOUBLE_FIRE;
            } else if actual_scaled < expected * u128::from(self.fizzle_pct) {
                flags |= SampleFlags::FIZZLE;
            }
        }

        TimingSample {
            kind: raw.kind,
            actor: raw.actor,
            expected_ms: raw.expected_ms,
            actual_ms: raw.actual_ms,
            variance_ms,
            at_ms: raw.at_ms,
            resource_consumed: raw.resource_consumed,
            flags,
        }
    }
}

/// `a - b` as a signed value, saturating at the `i64` range.
pub(crate) fn signed_diff(a: u64, b: u64) -> i64 {
    if a >= b {
        i64::try_from(a - b).unwrap_or(i64::MAX)
    } else {
        i64::try_from(b - a).map_or(i64::MIN, |d| -d)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(expected_ms: u64, actual_ms: u64, consumed: bool) -> RawSample {
        RawSample {
            kind: ActionKind::Swing,
            actor: 1,
            expected_ms,
            actual_ms,
            at_ms: 0,
            resource_consumed: consumed,
        }
    }

    mod kind_tests {
        use super::*;

        #[test]
        fn index_matches_all_order() {
            for (i, kind) in ActionKind::ALL.iter().enumerate() {
                assert_eq!(kind.index(), i);
            }
        }

        #[test]
        fn display_is_lowercase() {
            assert_eq!(ActionKind::Bandage.to_string(), "bandage");
        }

        #[test]
        fn serializes_snake_case() {
            let json = serde_json::to_string(&ActionKind::Wand).unwrap();
            assert_eq!(json, "\"wand\"");
        }
    }

    mod classify_tests {
        use super::*;

        #[test]
        fn on_time_sample_has_no_flags() {
            let sample = SampleClassifier::default().classify(raw(1450, 1450, true));
            assert_eq!(sample.variance_ms(), 0);
            assert!(sample.flags().is_empty());
        }

        #[test]
        fn late_beyond_threshold_is_outlier() {
            let sample = SampleClassifier::default().classify(raw(1000, 1051, true));
            assert_eq!(sample.variance_ms(), 51);
            assert!(sample.is_outlier());
        }

        #[test]
        fn threshold_itself_is_not_outlier() {
            let sample = SampleClassifier::default().classify(raw(1000, 1050, true));
            assert!(!sample.is_outlier());
        }

        #[test]
        fn early_is_negative_variance() {
            let sample = SampleClassifier::default().classify(raw(1000, 900, true));
            assert_eq!(sample.variance_ms(), -100);
            assert!(sample.is_outlier());
            assert!(!sample.is_fizzle(), "consumed resource never fizzles");
        }

        #[test]
        fn very_early_unconsumed_is_double_fire() {
            let sample = SampleClassifier::default().classify(raw(1000, 250, false));
            assert!(sample.is_double_fire());
            assert!(!sample.is_fizzle());
        }

        #[test]
        fn very_early_consumed_is_not_double_fire() {
            let sample = SampleClassifier::default().classify(raw(1000, 250, true));
            assert!(!sample.is_double_fire());
        }

        #[test]
        fn moderately_early_unconsumed_is_fizzle() {
            let sample = SampleClassifier::default().classify(raw(1000, 500, false));
            assert!(sample.is_fizzle());
            assert!(!sample.is_double_fire());
        }

        #[test]
        fn on_time_unconsumed_is_neither() {
            let sample = SampleClassifier::default().classify(raw(1000, 1000, false));
            assert!(!sample.is_fizzle());
            assert!(!sample.is_double_fire());
        }

        #[test]
        fn zero_expected_never_double_fires() {
            let sample = SampleClassifier::default().classify(raw(0, 0, false));
            assert!(sample.flags().is_empty());
        }
    }

    #[test]
    fn signed_diff_handles_both_directions() {
        assert_eq!(signed_diff(10, 3), 7);
        assert_eq!(signed_diff(3, 10), -7);
        assert_eq!(signed_diff(u64::MAX, 0), i64::MAX);
    }
}
