//! Wall-clock tick driver.
//!
//! [`PulseDriver::spawn`] moves a [`TimingModule`] onto a dedicated thread
//! that ticks it on the configured cadence. Host callbacks from other threads
//! arrive through [`HookRegistration`]s and are applied at the start of the
//! next tick, so all engine state is touched from one thread only. Every
//! operation of a tick is stamped with the tick's slot time, never the
//! wall-clock reading, so sleep jitter never shows up as timing variance.
//!
//! While the driver runs, audit batches are absorbed by a background flush
//! worker; the collector is handed back to the module when the driver stops.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info};

use crate::cadence::Clock;
use crate::error::{TimingError, TimingResult};
use crate::hooks::{HookRegistration, HostEvent};
use crate::module::TimingModule;
use crate::routines::HostEffects;

/// Longest single sleep, so a stop request is noticed promptly.
const MAX_SLEEP: Duration = Duration::from_millis(10);

/// Spawns tick driver threads.
#[derive(Debug, Clone, Copy)]
pub struct PulseDriver;

impl PulseDriver {
    /// Starts ticking `module` on a new thread.
    ///
    /// # Errors
    ///
    /// [`TimingError::DriverSpawn`] if the thread cannot be created.
    pub fn spawn<H>(module: TimingModule<H>) -> TimingResult<DriverHandle<H>>
    where
        H: HostEffects + Send + 'static,
    {
        let (tx, rx) = mpsc::channel();
        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = Arc::clone(&stop);

        let thread = thread::Builder::new()
            .name("tempo-pulse".into())
            .spawn(move || run(module, &rx, &thread_stop))
            .map_err(TimingError::DriverSpawn)?;

        Ok(DriverHandle { tx, stop, thread })
    }
}

/// Handle to a running driver.
pub struct DriverHandle<H> {
    tx: Sender<HostEvent>,
    stop: Arc<AtomicBool>,
    thread: JoinHandle<TimingModule<H>>,
}

impl<H> DriverHandle<H> {
    /// A hook object for the host's extension registry.
    #[must_use]
    pub fn registration(&self) -> HookRegistration {
        HookRegistration::new(self.tx.clone())
    }

    /// True while the driver thread is alive.
    #[must_use]
    pub fn is_running(&self) -> bool {
        !self.thread.is_finished()
    }

    /// Stops the driver after its current tick and returns the module.
    ///
    /// # Errors
    ///
    /// [`TimingError::DriverPanicked`] if the thread panicked.
    pub fn stop(self) -> TimingResult<TimingModule<H>> {
        self.stop.store(true, Ordering::Release);
        self.thread.join().map_err(|_| TimingError::DriverPanicked)
    }
}

impl<H> std::fmt::Debug for DriverHandle<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriverHandle")
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

fn run<H: HostEffects>(mut module: TimingModule<H>, rx: &Receiver<HostEvent>, stop: &AtomicBool) -> TimingModule<H> {
    let clock = Arc::clone(module.clock());
    let mut tick_start_ms = module.cadence().slot_at_or_after(clock.now_ms());
    module.spawn_audit_worker(Duration::from_millis(module.config().audit.flush_interval_ms.max(1)));
    info!(interval_ms = module.cadence().interval_ms(), "tick driver started");

    while !stop.load(Ordering::Acquire) {
        if !sleep_until(clock.as_ref(), tick_start_ms, stop) {
            break;
        }

        let started_us = clock.now_us();
        let mut events = 0u32;
        for event in rx.try_iter() {
            module.apply_event(tick_start_ms, event);
            events += 1;
        }
        if events > 0 {
            debug!(events, "applied queued host events");
        }

        module.tick_at(tick_start_ms);

        let finished_us = clock.now_us();
        let plan = module.complete_tick(
            tick_start_ms,
            finished_us / 1_000,
            finished_us.saturating_sub(started_us),
        );
        tick_start_ms = plan.next_start_ms;
    }

    let final_ms = module.cadence().slot_at_or_before(clock.now_ms());
    for event in rx.try_iter() {
        module.apply_event(final_ms, event);
    }
    module.stop_audit_worker();
    info!(ticks = module.pulse_stats().ticks, "tick driver stopped");
    module
}

/// Sleeps until `target_ms`. Returns false if asked to stop first.
fn sleep_until(clock: &dyn Clock, target_ms: u64, stop: &AtomicBool) -> bool {
    loop {
        if stop.load(Ordering::Acquire) {
            return false;
        }
        let now_ms = clock.now_ms();
        if now_ms >= target_ms {
            return true;
        }
        thread::sleep(Duration::from_millis(target_ms - now_ms).min(MAX_SLEEP));
    }
}
