//! Shadow-mode differential timing.
//!
//! In shadow mode every fired action is paired with the delay the host's
//! native path would have applied to the same input. The engine side is the
//! realized delay, acceptance to fire, so tick quantization shows up in the
//! differential. Only the difference is kept here; the native result never
//! feeds back into gameplay.

use serde::{Deserialize, Serialize};

use crate::sample::{signed_diff, ActionKind};

/// One engine-vs-native timing pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShadowSample {
    /// Action kind.
    pub kind: ActionKind,
    /// Actor handle.
    pub actor: u64,
    /// Delay this engine actually delivered.
    pub engine_ms: u64,
    /// Delay the host's native path would have used.
    pub native_ms: u64,
    /// When the pair was taken.
    pub at_ms: u64,
}

impl ShadowSample {
    /// `engine - native` in ms.
    #[must_use]
    pub fn delta_ms(&self) -> i64 {
        signed_diff(self.engine_ms, self.native_ms)
    }
}

/// Differential statistics for one kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShadowStats {
    /// Pairs recorded.
    pub count: u64,
    /// Pairs where engine and native disagreed.
    pub mismatches: u64,
    /// Sum of signed delta.
    pub sum_delta: i128,
    /// Sum of |delta|.
    pub sum_abs_delta: u128,
    /// Largest |delta|.
    pub max_abs_delta: u64,
}

impl ShadowStats {
    /// Fold one pair in.
    pub fn push(&mut self, sample: &ShadowSample) {
        let delta = sample.delta_ms();
        self.count += 1;
        self.mismatches += u64::from(delta != 0);
        self.sum_delta += i128::from(delta);
        self.sum_abs_delta += u128::from(delta.unsigned_abs());
        self.max_abs_delta = self.max_abs_delta.max(delta.unsigned_abs());
    }

    /// Mean signed delta (engine slower when positive).
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn mean_delta_ms(&self) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        self.sum_delta as f64 / self.count as f64
    }

    /// Mean |delta|.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn mean_abs_delta_ms(&self) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        self.sum_abs_delta as f64 / self.count as f64
    }
}

/// Per-kind shadow differential.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShadowDiff {
    /// Stats indexed by [`ActionKind::index`].
    pub kinds: [ShadowStats; ActionKind::COUNT],
}

impl ShadowDiff {
    /// Fold one pair into its kind.
    pub fn push(&mut self, sample: &ShadowSample) {
        self.kinds[sample.kind.index()].push(sample);
    }

    /// Stats for one kind.
    #[must_use]
    pub fn get(&self, kind: ActionKind) -> &ShadowStats {
        &self.kinds[kind.index()]
    }

    /// True when no pair has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.kinds.iter().all(|k| k.count == 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair(kind: ActionKind, engine_ms: u64, native_ms: u64) -> ShadowSample {
        ShadowSample {
            kind,
            actor: 3,
            engine_ms,
            native_ms,
            at_ms: 0,
        }
    }

    #[test]
    fn delta_is_engine_minus_native() {
        assert_eq!(pair(ActionKind::Swing, 1450, 1472).delta_ms(), -22);
        assert_eq!(pair(ActionKind::Swing, 1500, 1472).delta_ms(), 28);
    }

    #[test]
    fn stats_accumulate_mismatches() {
        let mut diff = ShadowDiff::default();
        diff.push(&pair(ActionKind::Swing, 1450, 1472));
        diff.push(&pair(ActionKind::Swing, 1000, 1000));
        diff.push(&pair(ActionKind::Spell, 1500, 1500));

        let swing = diff.get(ActionKind::Swing);
        assert_eq!(swing.count, 2);
        assert_eq!(swing.mismatches, 1);
        assert_eq!(swing.max_abs_delta, 22);
        assert_eq!(swing.mean_delta_ms(), -11.0);
        assert_eq!(swing.mean_abs_delta_ms(), 11.0);
        assert_eq!(diff.get(ActionKind::Spell).mismatches, 0);
        assert!(!diff.is_empty());
    }

    #[test]
    fn empty_diff_reports_zero() {
        let diff = ShadowDiff::default();
        assert!(diff.is_empty());
        assert_eq!(diff.get(ActionKind::Wand).mean_delta_ms(), 0.0);
    }
}
