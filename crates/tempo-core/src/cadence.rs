//! Clocks and the wall-clock tick cadence.
//!
//! Ticks are anchored to `origin + k * interval`. A tick that overruns its
//! slot does not trigger catch-up ticks: the next tick starts at the first
//! slot boundary after processing finished, and the slots in between are
//! counted as skipped.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Source of monotonic time in milliseconds.
pub trait Clock: Send + Sync {
    /// Milliseconds since the clock's origin.
    fn now_ms(&self) -> u64;

    /// Microseconds since the clock's origin.
    fn now_us(&self) -> u64 {
        self.now_ms().saturating_mul(1_000)
    }
}

/// Real monotonic time since construction.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    /// Starts the clock at zero.
    #[must_use]
    pub fn new() -> Self {
        Self { origin: Instant::now() }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now_ms(&self) -> u64 {
        u64::try_from(self.origin.elapsed().as_millis()).unwrap_or(u64::MAX)
    }

    fn now_us(&self) -> u64 {
        u64::try_from(self.origin.elapsed().as_micros()).unwrap_or(u64::MAX)
    }
}

/// Hand-driven clock; clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now_us: Arc<AtomicU64>,
}

impl ManualClock {
    /// Clock starting at `now_ms`.
    #[must_use]
    pub fn starting_at(now_ms: u64) -> Self {
        let clock = Self::default();
        clock.set_ms(now_ms);
        clock
    }

    /// Jumps to `now_ms`.
    pub fn set_ms(&self, now_ms: u64) {
        self.now_us.store(now_ms.saturating_mul(1_000), Ordering::SeqCst);
    }

    /// Moves forward by `ms`.
    pub fn advance_ms(&self, ms: u64) {
        self.now_us.fetch_add(ms.saturating_mul(1_000), Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now_us() / 1_000
    }

    fn now_us(&self) -> u64 {
        self.now_us.load(Ordering::SeqCst)
    }
}

/// Where the next tick goes after a tick finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickPlan {
    /// Start of the next tick.
    pub next_start_ms: u64,
    /// Slot boundaries passed over.
    pub skipped_slots: u64,
    /// True if processing ran past the nominal next start.
    pub overrun: bool,
}

/// Fixed-interval cadence anchored at an origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cadence {
    origin_ms: u64,
    interval_ms: u64,
}

impl Cadence {
    /// Cadence with slots at `origin_ms + k * interval_ms`.
    #[must_use]
    pub fn new(origin_ms: u64, interval_ms: u64) -> Self {
        Self {
            origin_ms,
            interval_ms: interval_ms.max(1),
        }
    }

    /// Slot interval.
    #[must_use]
    pub const fn interval_ms(&self) -> u64 {
        self.interval_ms
    }

    /// First slot boundary at or after `now_ms`.
    #[must_use]
    pub fn slot_at_or_after(&self, now_ms: u64) -> u64 {
        if now_ms <= self.origin_ms {
            return self.origin_ms;
        }
        let elapsed = now_ms - self.origin_ms;
        self.origin_ms + elapsed.div_ceil(self.interval_ms) * self.interval_ms
    }

    /// Last slot boundary at or before `now_ms`: the tick-clock reading for
    /// work that arrives between ticks.
    #[must_use]
    pub fn slot_at_or_before(&self, now_ms: u64) -> u64 {
        if now_ms <= self.origin_ms {
            return self.origin_ms;
        }
        let elapsed = now_ms - self.origin_ms;
        self.origin_ms + elapsed / self.interval_ms * self.interval_ms
    }

    /// Plans the next tick for a tick that started at `tick_start_ms` and
    /// finished processing at `finished_ms`.
    ///
    /// # Example
    ///
    /// ```
    /// use tempo_core::cadence::Cadence;
    ///
    /// let cadence = Cadence::new(0, 50);
    /// // 80ms of work in a 50ms slot starting at 1000
    /// let plan = cadence.plan(1_000, 1_080);
    /// assert_eq!(plan.next_start_ms, 1_100);
    /// assert_eq!(plan.skipped_slots, 1);
    /// assert!(plan.overrun);
    /// ```
    #[must_use]
    pub fn plan(&self, tick_start_ms: u64, finished_ms: u64) -> TickPlan {
        let nominal = tick_start_ms + self.interval_ms;
        let next_start_ms = self.slot_at_or_after(finished_ms).max(nominal);
        TickPlan {
            next_start_ms,
            skipped_slots: (next_start_ms - nominal) / self.interval_ms,
            overrun: finished_ms > nominal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_on_time_tick_keeps_cadence() {
        let cadence = Cadence::new(0, 50);
        let plan = cadence.plan(1_000, 1_010);
        assert_eq!(plan.next_start_ms, 1_050);
        assert_eq!(plan.skipped_slots, 0);
        assert!(!plan.overrun);
    }

    #[test]
    fn test_exact_slot_use_is_not_overrun() {
        let cadence = Cadence::new(0, 50);
        let plan = cadence.plan(1_000, 1_050);
        assert_eq!(plan.next_start_ms, 1_050);
        assert!(!plan.overrun);
    }

    #[test]
    fn test_overrun_skips_to_next_boundary() {
        let cadence = Cadence::new(0, 50);
        let plan = cadence.plan(1_000, 1_080);
        assert_eq!(plan.next_start_ms, 1_100);
        assert_eq!(plan.skipped_slots, 1);
        assert!(plan.overrun);
    }

    #[test]
    fn test_long_stall_skips_many_slots() {
        let cadence = Cadence::new(0, 50);
        let plan = cadence.plan(1_000, 1_301);
        assert_eq!(plan.next_start_ms, 1_350);
        assert_eq!(plan.skipped_slots, 6);
    }

    #[test]
    fn test_origin_offset_respected() {
        let cadence = Cadence::new(7, 50);
        assert_eq!(cadence.slot_at_or_after(0), 7);
        assert_eq!(cadence.slot_at_or_after(8), 57);
        assert_eq!(cadence.plan(57, 140).next_start_ms, 157);
    }

    #[test]
    fn test_slot_at_or_before_floors_to_boundary() {
        let cadence = Cadence::new(7, 50);
        assert_eq!(cadence.slot_at_or_before(0), 7);
        assert_eq!(cadence.slot_at_or_before(57), 57);
        assert_eq!(cadence.slot_at_or_before(106), 57);
        assert_eq!(cadence.slot_at_or_before(107), 107);
    }

    #[test]
    fn test_manual_clock_shared_between_clones() {
        let clock = ManualClock::starting_at(100);
        let other = clock.clone();
        clock.advance_ms(50);
        assert_eq!(other.now_ms(), 150);
        assert_eq!(other.now_us(), 150_000);
    }
}
