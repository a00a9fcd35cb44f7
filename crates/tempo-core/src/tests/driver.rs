//! The wall-clock driver thread.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tempo_audit::ActionKind;

use crate::action::ActionDescriptor;
use crate::actor::ActorId;
use crate::cadence::{Clock, MonotonicClock};
use crate::config::TimingConfig;
use crate::driver::PulseDriver;
use crate::hooks::{HookOutcome, TimingHooks};
use crate::module::TimingModule;

use super::helpers::{civilian, HostCall, ScriptedHost};

/// Monotonic time with up to 19ms of read-to-read noise, like a host whose
/// wakeups land late by varying amounts.
struct NoisyClock {
    inner: MonotonicClock,
    reads: AtomicU64,
}

impl Clock for NoisyClock {
    fn now_ms(&self) -> u64 {
        self.now_us() / 1_000
    }

    fn now_us(&self) -> u64 {
        let n = self.reads.fetch_add(1, Ordering::Relaxed);
        self.inner.now_us() + (n * 7_919 % 20) * 1_000
    }
}

fn spawn_module(tick_interval_ms: u64) -> TimingModule<ScriptedHost> {
    spawn_module_on(tick_interval_ms, Arc::new(MonotonicClock::new()))
}

fn spawn_module_on(tick_interval_ms: u64, clock: Arc<dyn Clock>) -> TimingModule<ScriptedHost> {
    let config = TimingConfig {
        tick_interval_ms,
        ..TimingConfig::default()
    };
    let host = ScriptedHost::with_actors([civilian(1), civilian(2)]);
    TimingModule::initialize(config, host, clock)
}

#[test]
fn test_driver_applies_queued_hooks_and_fires() {
    let handle = PulseDriver::spawn(spawn_module(10)).unwrap();
    let mut hooks = handle.registration();

    hooks.on_actor_entered_timing(ActorId::new(1));
    let outcome = hooks.on_action_requested(ActorId::new(1), ActionDescriptor::wand(301));
    assert_eq!(outcome, HookOutcome::Queued);

    thread::sleep(Duration::from_millis(1_500));
    assert!(handle.is_running());
    let mut module = handle.stop().unwrap();

    assert!(module.pulse_stats().ticks > 0);
    assert_eq!(module.pulse_stats().fired, 1);
    assert_eq!(module.host().count(|c| matches!(c, HostCall::Effect(..))), 1);
    assert_eq!(module.host().resolves_for(1), 1);

    let now = module.clock().now_ms();
    let report = module.report_at(now).unwrap();
    let wand = report.kind(ActionKind::Wand).unwrap();
    assert_eq!(wand.count, 1);
    assert!(report.tick_health.unwrap().ticks > 0);
}

#[test]
fn test_queued_rejection_reaches_host() {
    let handle = PulseDriver::spawn(spawn_module(10)).unwrap();
    let mut hooks = handle.registration();

    hooks.on_action_requested(ActorId::new(99), ActionDescriptor::swing(3));
    thread::sleep(Duration::from_millis(100));
    let module = handle.stop().unwrap();

    assert_eq!(module.host().count(|c| matches!(c, HostCall::Rejected(..))), 1);
    assert_eq!(module.active_len(), 0);
}

#[test]
fn test_registration_goes_native_after_stop() {
    let handle = PulseDriver::spawn(spawn_module(10)).unwrap();
    let mut hooks = handle.registration();
    handle.stop().unwrap();

    assert_eq!(
        hooks.on_action_requested(ActorId::new(1), ActionDescriptor::swing(3)),
        HookOutcome::Native
    );
}

#[test]
fn test_wakeup_noise_never_reaches_samples() {
    let clock = NoisyClock {
        inner: MonotonicClock::new(),
        reads: AtomicU64::new(0),
    };
    let handle = PulseDriver::spawn(spawn_module_on(50, Arc::new(clock))).unwrap();
    let mut hooks = handle.registration();

    hooks.on_action_requested(ActorId::new(1), ActionDescriptor::wand(301));
    thread::sleep(Duration::from_millis(30));
    hooks.on_action_requested(ActorId::new(2), ActionDescriptor::wand(302));

    thread::sleep(Duration::from_millis(2_000));
    let mut module = handle.stop().unwrap();
    assert_eq!(module.pulse_stats().fired, 2);

    let now = module.clock().now_ms();
    let report = module.report_at(now).unwrap();
    let wand = report.kind(ActionKind::Wand).unwrap();
    assert_eq!(wand.count, 2);
    assert_eq!(wand.max_abs_variance_ms, 0);
}

#[test]
fn test_collector_returns_to_module_on_stop() {
    let handle = PulseDriver::spawn(spawn_module(10)).unwrap();
    let mut hooks = handle.registration();
    hooks.on_action_requested(ActorId::new(1), ActionDescriptor::wand(301));
    thread::sleep(Duration::from_millis(1_200));

    let mut module = handle.stop().unwrap();
    let mut collector = module.take_collector().unwrap();
    assert_eq!(collector.drain(), 0);
    assert_eq!(collector.aggregate().stats().get(ActionKind::Wand).count, 1);
}
