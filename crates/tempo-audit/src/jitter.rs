//! Tick-processing time tracking.
//!
//! The scheduler feeds every tick's processing time into a [`JitterTracker`].
//! It keeps the totals needed for the overrun rate and a bounded ring of
//! recent durations for percentile estimates.

use serde::{Deserialize, Serialize};

const DEFAULT_MAX_SAMPLES: usize = 4_096;

/// Processing-time metrics for the tick driver.
///
/// `record` is O(1) amortized; percentile queries copy the ring into a reused
/// scratch buffer and select in O(n).
#[derive(Debug, Clone)]
pub struct JitterTracker {
    /// Total number of ticks recorded.
    pub total_ticks: u64,
    /// Ticks whose processing exceeded the tick interval.
    pub overruns: u64,
    /// Cadence slots skipped to absorb overruns.
    pub skipped_slots: u64,
    /// Longest processing time observed, in microseconds.
    pub max_processing_us: u64,
    /// Most recent processing time, in microseconds.
    pub last_processing_us: u64,
    recent: Vec<u64>,
    max_samples: usize,
    next_index: usize,
    scratch: Vec<u64>,
}

impl Default for JitterTracker {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_MAX_SAMPLES)
    }
}

impl JitterTracker {
    /// Create a tracker with the default ring capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a tracker that retains at most `max_samples` recent durations.
    #[must_use]
    pub fn with_capacity(max_samples: usize) -> Self {
        Self {
            total_ticks: 0,
            overruns: 0,
            skipped_slots: 0,
            max_processing_us: 0,
            last_processing_us: 0,
            recent: Vec::with_capacity(max_samples),
            max_samples,
            next_index: 0,
            scratch: Vec::with_capacity(max_samples),
        }
    }

    /// Record one tick.
    ///
    /// # Arguments
    ///
    /// * `processing_us` - Time spent processing the tick
    /// * `skipped_slots` - Cadence slots skipped before the next tick (0 when on time)
    pub fn record(&mut self, processing_us: u64, skipped_slots: u64) {
        self.total_ticks += 1;
        if skipped_slots > 0 {
            self.overruns += 1;
            self.skipped_slots += skipped_slots;
        }
        self.max_processing_us = self.max_processing_us.max(processing_us);
        self.last_processing_us = processing_us;

        if self.max_samples == 0 {
            return;
        }

        if self.recent.len() < self.max_samples {
            self.recent.push(processing_us);
        } else {
            self.recent[self.next_index] = processing_us;
            self.next_index = (self.next_index + 1) % self.max_samples;
        }
    }

    /// Arbitrary percentile (0.0 to 1.0) of retained processing times.
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    pub fn percentile_us(&mut self, percentile: f64) -> u64 {
        if self.recent.is_empty() {
            return 0;
        }
        let percentile = percentile.clamp(0.0, 1.0);

        self.scratch.clear();
        self.scratch.extend_from_slice(&self.recent);

        let len = self.scratch.len();
        let index = ((len as f64 * percentile) as usize).min(len.saturating_sub(1));
        let (_, value, _) = self.scratch.select_nth_unstable(index);
        *value
    }

    /// Overrun rate (0.0 to 1.0).
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn overrun_rate(&self) -> f64 {
        if self.total_ticks == 0 {
            0.0
        } else {
            self.overruns as f64 / self.total_ticks as f64
        }
    }

    /// Number of retained durations.
    #[must_use]
    pub fn sample_count(&self) -> usize {
        self.recent.len()
    }

    /// Snapshot for reporting.
    pub fn summary(&mut self) -> TickHealth {
        TickHealth {
            ticks: self.total_ticks,
            overruns: self.overruns,
            skipped_slots: self.skipped_slots,
            p50_us: self.percentile_us(0.50),
            p99_us: self.percentile_us(0.99),
            max_us: self.max_processing_us,
        }
    }

    /// Reset all metrics.
    pub fn reset(&mut self) {
        self.total_ticks = 0;
        self.overruns = 0;
        self.skipped_slots = 0;
        self.max_processing_us = 0;
        self.last_processing_us = 0;
        self.recent.clear();
        self.next_index = 0;
        self.scratch.clear();
    }
}

/// Serializable tick-driver health summary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickHealth {
    /// Ticks processed.
    pub ticks: u64,
    /// Ticks that overran the interval.
    pub overruns: u64,
    /// Total cadence slots skipped.
    pub skipped_slots: u64,
    /// Median processing time.
    pub p50_us: u64,
    /// 99th percentile processing time.
    pub p99_us: u64,
    /// Worst processing time.
    pub max_us: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_counts_overruns() {
        let mut tracker = JitterTracker::new();
        tracker.record(10_000, 0);
        tracker.record(80_000, 1);
        tracker.record(20_000, 0);

        assert_eq!(tracker.total_ticks, 3);
        assert_eq!(tracker.overruns, 1);
        assert_eq!(tracker.skipped_slots, 1);
        assert_eq!(tracker.max_processing_us, 80_000);
        assert_eq!(tracker.last_processing_us, 20_000);
        assert!((tracker.overrun_rate() - 1.0 / 3.0).abs() < 1e-10);
    }

    #[test]
    fn test_percentiles() {
        let mut tracker = JitterTracker::new();
        for i in 0..100u64 {
            tracker.record(i * 10, 0);
        }
        let p99 = tracker.percentile_us(0.99);
        assert!(p99 >= 970 && p99 <= 990, "p99 was {p99}");
        assert_eq!(tracker.percentile_us(0.0), 0);
    }

    #[test]
    fn test_ring_buffer_keeps_latest() {
        let mut tracker = JitterTracker::with_capacity(3);
        for i in 1..=5u64 {
            tracker.record(i, 0);
        }
        assert_eq!(tracker.sample_count(), 3);
        let mut kept = tracker.recent.clone();
        kept.sort_unstable();
        assert_eq!(kept, vec![3, 4, 5]);
    }

    #[test]
    fn test_zero_capacity_still_counts() {
        let mut tracker = JitterTracker::with_capacity(0);
        tracker.record(100, 0);
        assert_eq!(tracker.total_ticks, 1);
        assert_eq!(tracker.sample_count(), 0);
        assert_eq!(tracker.percentile_us(0.5), 0);
    }

    #[test]
    fn test_summary_and_reset() {
        let mut tracker = JitterTracker::new();
        tracker.record(500, 0);
        tracker.record(90_000, 2);

        let health = tracker.summary();
        assert_eq!(health.ticks, 2);
        assert_eq!(health.overruns, 1);
        assert_eq!(health.skipped_slots, 2);
        assert_eq!(health.max_us, 90_000);

        tracker.reset();
        assert_eq!(tracker.total_ticks, 0);
        assert_eq!(tracker.sample_count(), 0);
    }
}
