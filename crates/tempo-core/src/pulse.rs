//! The active-set tick scheduler.
//!
//! One [`Pulse::tick`] visits every actor in the [`ActiveSet`]. Per actor:
//!
//! 1. due resolutions are delivered, channels in order swing, spell,
//!    bandage, wand
//! 2. due ready-timers fire in the same order, recording a sample and
//!    running the routine's follow-up
//! 3. an actor whose channels are all idle past the idle timeout is evicted
//!
//! A routine that fails or panics only loses its own channel; the rest of
//! the tick proceeds.

use serde::{Deserialize, Serialize};
use std::panic::{self, AssertUnwindSafe};
use tracing::{debug, error, warn};

use tempo_audit::{ActionKind, JitterTracker, TickHealth};

use crate::actor::ActorId;
use crate::cadence::{Cadence, TickPlan};
use crate::dispatch::{Delivered, Dispatch, Fired};
use crate::error::RoutineError;
use crate::registry::{is_evictable, ActiveSet};
use crate::timer::{ActorTimerState, Channel};

/// What one tick did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickReport {
    /// Tick index, starting at 1.
    pub tick: u64,
    /// Tick time.
    pub now_ms: u64,
    /// Actors visited (the active-set size at tick start).
    pub actors_visited: usize,
    /// Resolutions delivered.
    pub resolutions: u32,
    /// Ready-timers fired.
    pub fired: u32,
    /// Fired channels re-armed by a follow-up.
    pub rearmed: u32,
    /// Actions completed early by interruption.
    pub interrupted: u32,
    /// Isolated routine faults.
    pub faults: u32,
    /// Actors evicted this tick.
    pub evicted: Vec<ActorId>,
}

/// Running totals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PulseStats {
    /// Ticks run.
    pub ticks: u64,
    /// Resolutions delivered.
    pub resolutions: u64,
    /// Ready-timers fired.
    pub fired: u64,
    /// Follow-up re-arms.
    pub rearmed: u64,
    /// Interrupted actions.
    pub interrupted: u64,
    /// Isolated faults.
    pub faults: u64,
    /// Evicted actors.
    pub evictions: u64,
    /// Ticks that overran their slot.
    pub overruns: u64,
    /// Slots skipped to absorb overruns.
    pub skipped_slots: u64,
}

impl PulseStats {
    fn absorb(&mut self, report: &TickReport) {
        self.ticks += 1;
        self.resolutions += u64::from(report.resolutions);
        self.fired += u64::from(report.fired);
        self.rearmed += u64::from(report.rearmed);
        self.interrupted += u64::from(report.interrupted);
        self.faults += u64::from(report.faults);
        self.evictions += report.evicted.len() as u64;
    }
}

/// The scheduler.
#[derive(Debug)]
pub struct Pulse {
    cadence: Cadence,
    idle_eviction_ms: u64,
    tick: u64,
    stats: PulseStats,
    jitter: JitterTracker,
}

impl Pulse {
    /// Scheduler ticking every `interval_ms` from `origin_ms`.
    #[must_use]
    pub fn new(origin_ms: u64, interval_ms: u64, idle_eviction_ms: u64) -> Self {
        Self {
            cadence: Cadence::new(origin_ms, interval_ms),
            idle_eviction_ms,
            tick: 0,
            stats: PulseStats::default(),
            jitter: JitterTracker::new(),
        }
    }

    /// The wall-clock cadence.
    #[must_use]
    pub fn cadence(&self) -> &Cadence {
        &self.cadence
    }

    /// Running totals.
    #[must_use]
    pub fn stats(&self) -> &PulseStats {
        &self.stats
    }

    /// Tick-processing health summary.
    pub fn health(&mut self) -> TickHealth {
        self.jitter.summary()
    }

    /// Runs one tick at `now_ms` over `active`.
    pub fn tick(&mut self, now_ms: u64, active: &mut ActiveSet, dispatch: &mut Dispatch<'_>) -> TickReport {
        self.tick += 1;
        let mut report = TickReport {
            tick: self.tick,
            now_ms,
            ..TickReport::default()
        };
        let idle_eviction_ms = self.idle_eviction_ms;

        active.retain_mut(|state| {
            report.actors_visited += 1;
            visit(state, now_ms, dispatch, &mut report);

            if is_evictable(state, now_ms, idle_eviction_ms) {
                debug!(actor = %state.actor(), "evicting idle actor");
                report.evicted.push(state.actor());
                false
            } else {
                true
            }
        });

        self.stats.absorb(&report);
        if report.fired > 0 || report.faults > 0 || !report.evicted.is_empty() {
            debug!(
                tick = report.tick,
                actors = report.actors_visited,
                fired = report.fired,
                resolutions = report.resolutions,
                faults = report.faults,
                evicted = report.evicted.len(),
                "tick"
            );
        }
        report
    }

    /// Closes the tick that started at `tick_start_ms` and plans the next.
    ///
    /// Overruns are logged and absorbed by skipping slots.
    pub fn complete_tick(&mut self, tick_start_ms: u64, finished_ms: u64, processing_us: u64) -> TickPlan {
        let plan = self.cadence.plan(tick_start_ms, finished_ms);
        self.jitter.record(processing_us, plan.skipped_slots);
        if plan.overrun {
            self.stats.overruns += 1;
            self.stats.skipped_slots += plan.skipped_slots;
            warn!(
                tick = self.tick,
                processing_ms = finished_ms.saturating_sub(tick_start_ms),
                interval_ms = self.cadence.interval_ms(),
                skipped_slots = plan.skipped_slots,
                next_start_ms = plan.next_start_ms,
                "tick overran its slot"
            );
        }
        plan
    }
}

fn visit(state: &mut ActorTimerState, now_ms: u64, dispatch: &mut Dispatch<'_>, report: &mut TickReport) {
    for channel in ActionKind::ALL {
        match guarded(|| dispatch.deliver_resolution(state, channel, now_ms)) {
            Ok(Delivered::Resolved) => report.resolutions += 1,
            Ok(Delivered::Interrupted) => {
                report.resolutions += 1;
                report.interrupted += 1;
            }
            Ok(Delivered::Nothing | Delivered::Cancelled) => {}
            Err(err) => isolate(state, channel, &err, report),
        }
    }

    for channel in ActionKind::ALL {
        match guarded(|| dispatch.fire(state, channel, now_ms)) {
            Ok(Fired::Settled) => report.fired += 1,
            Ok(Fired::Rearmed) => {
                report.fired += 1;
                report.rearmed += 1;
            }
            Ok(Fired::NotDue) => {}
            Err(err) => isolate(state, channel, &err, report),
        }
    }
}

fn isolate(state: &mut ActorTimerState, channel: Channel, err: &RoutineError, report: &mut TickReport) {
    error!(actor = %state.actor(), channel = %channel, error = %err, "routine fault, channel reset");
    state.cancel(channel);
    state.settle(channel);
    report.faults += 1;
}

/// Runs `f`, turning a panic into [`RoutineError::Panicked`].
fn guarded<T>(f: impl FnOnce() -> Result<T, RoutineError>) -> Result<T, RoutineError> {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| (*s).to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "non-string panic payload".to_string());
            Err(RoutineError::Panicked(message))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overrun_example() {
        // tick N starts at T, 80ms of work on a 50ms cadence
        let mut pulse = Pulse::new(0, 50, 30_000);
        let plan = pulse.complete_tick(1_000, 1_080, 80_000);
        assert_eq!(plan.next_start_ms, 1_100);
        assert_eq!(pulse.stats().overruns, 1);
        assert_eq!(pulse.stats().skipped_slots, 1);

        let health = pulse.health();
        assert_eq!(health.ticks, 1);
        assert_eq!(health.overruns, 1);
    }

    #[test]
    fn test_on_time_tick_is_not_overrun() {
        let mut pulse = Pulse::new(0, 50, 30_000);
        let plan = pulse.complete_tick(1_000, 1_012, 12_000);
        assert_eq!(plan.next_start_ms, 1_050);
        assert_eq!(pulse.stats().overruns, 0);
    }

    #[test]
    fn test_guarded_converts_panics() {
        let ok: Result<u32, RoutineError> = guarded(|| Ok(7));
        assert_eq!(ok, Ok(7));

        let err = guarded::<()>(|| panic!("boom"));
        assert_eq!(err, Err(RoutineError::Panicked("boom".to_string())));

        let err = guarded::<()>(|| panic!("code {}", 42));
        assert_eq!(err, Err(RoutineError::Panicked("code 42".to_string())));
    }
}
