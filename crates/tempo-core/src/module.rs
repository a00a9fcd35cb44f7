//! The engine context.
//!
//! [`TimingModule`] owns every piece of engine state: table, formula,
//! routines, active set, scheduler and audit recorder. There are no globals;
//! a host embeds one module and either drives it directly (`tick_at`,
//! [`TimingHooks`]) or hands it to a [`crate::PulseDriver`] thread.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use tempo_audit::{AuditCollector, AuditRecorder, CollectorHandle, AuditReport, BaselineMetrics, TickHealth};

use crate::action::ActionDescriptor;
use crate::actor::ActorId;
use crate::cadence::{Cadence, Clock, TickPlan};
use crate::config::TimingConfig;
use crate::dispatch::Dispatch;
use crate::error::TimingResult;
use crate::formula::{LegacyFormula, TimingFormula};
use crate::hooks::{HookOutcome, HostEvent, TimingHooks};
use crate::native::{MillisecondTimerModel, NativeTiming};
use crate::pulse::{Pulse, PulseStats, TickReport};
use crate::registry::ActiveSet;
use crate::routines::{ActionRoutine, HostEffects, ResolutionOutcome, RoutineTable};
use crate::table::TimingTable;
use crate::timer::{ActorTimerState, Channel, TimerPolicy};

/// Whether the module is doing work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModuleStatus {
    /// Handling hooks and ticking.
    Enabled,
    /// Inert; every hook reports native handling.
    Disabled(String),
}

/// The timing engine.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use tempo_core::prelude::*;
///
/// struct Host;
///
/// impl HostEffects for Host {
///     fn snapshot(&self, actor: ActorId) -> Option<ActorSnapshot> {
///         let mut snapshot = ActorSnapshot::alive(actor);
///         snapshot.stats.dex = 125;
///         Some(snapshot)
///     }
///     fn play_effect(&mut self, _: ActorId, _: &ActionDescriptor) -> Result<(), RoutineError> {
///         Ok(())
///     }
///     fn resolve(&mut self, _: ActorId, _: &ActionDescriptor) -> Result<ResolutionOutcome, RoutineError> {
///         Ok(ResolutionOutcome::landed())
///     }
/// }
///
/// let clock = ManualClock::starting_at(0);
/// let mut module = TimingModule::initialize(TimingConfig::default(), Host, Arc::new(clock.clone()));
///
/// let outcome = module.request_action_at(0, ActorId::new(1), ActionDescriptor::swing(3));
/// let HookOutcome::Accepted(acceptance) = outcome else { panic!("rejected") };
/// assert_eq!(acceptance.expected_ms, 1450);
///
/// let report = module.tick_at(1450);
/// assert_eq!(report.fired, 1);
/// ```
pub struct TimingModule<H> {
    config: TimingConfig,
    status: ModuleStatus,
    table: Arc<TimingTable>,
    formula: Arc<dyn TimingFormula>,
    native: Option<Arc<dyn NativeTiming>>,
    routines: RoutineTable,
    active: ActiveSet,
    pulse: Pulse,
    recorder: AuditRecorder,
    collector: Option<AuditCollector>,
    worker: Option<CollectorHandle>,
    baseline: Option<BaselineMetrics>,
    clock: Arc<dyn Clock>,
    last_flush_ms: u64,
    host: H,
}

impl<H: HostEffects> TimingModule<H> {
    /// Builds the module from `config`.
    ///
    /// Never fails: an unusable configuration or timing table leaves the
    /// module disabled, logged at error.
    pub fn initialize(config: TimingConfig, host: H, clock: Arc<dyn Clock>) -> Self {
        let now_ms = clock.now_ms();
        let (recorder, collector) = AuditRecorder::channel(config.audit.recorder_config());

        let (status, table) = match Self::load_table(&config) {
            Ok(table) if config.enabled => (ModuleStatus::Enabled, table),
            Ok(table) => {
                info!("timing module disabled by configuration");
                (ModuleStatus::Disabled("disabled by configuration".into()), table)
            }
            Err(err) => {
                error!(error = %err, "timing module failed to initialize, disabling");
                (ModuleStatus::Disabled(err.to_string()), Arc::new(TimingTable::compat()))
            }
        };

        let baseline = config.audit.baseline_path.as_ref().and_then(|path| {
            BaselineMetrics::load(path)
                .map_err(|err| warn!(error = %err, "baseline unavailable, reports will omit verdicts"))
                .ok()
        });

        let native: Option<Arc<dyn NativeTiming>> = if config.audit.shadow_mode {
            Some(Arc::new(MillisecondTimerModel::new(Arc::clone(&table))))
        } else {
            None
        };

        if status == ModuleStatus::Enabled {
            info!(
                tick_ms = config.tick_interval_ms,
                idle_eviction_ms = config.idle_eviction_ms,
                independent_timers = config.independent_timers,
                entries = table.len(),
                shadow_mode = config.audit.shadow_mode,
                "timing module initialized"
            );
        }

        Self {
            formula: Arc::new(LegacyFormula::new(Arc::clone(&table), config.tick_interval_ms)),
            pulse: Pulse::new(now_ms, config.tick_interval_ms, config.idle_eviction_ms),
            status,
            table,
            native,
            routines: RoutineTable::standard(),
            active: ActiveSet::new(),
            recorder,
            collector: Some(collector),
            worker: None,
            baseline,
            clock,
            last_flush_ms: now_ms,
            host,
            config,
        }
    }

    fn load_table(config: &TimingConfig) -> TimingResult<Arc<TimingTable>> {
        config.validate()?;
        let table = TimingTable::load_or_compat(config.timing_table_path.as_deref(), config.compat_table_fallback)?;
        Ok(Arc::new(table))
    }

    /// Replaces the delay provider.
    #[must_use]
    pub fn with_formula(mut self, formula: Arc<dyn TimingFormula>) -> Self {
        self.formula = formula;
        self
    }

    /// Replaces the native timing used in shadow mode (and turns shadow mode on).
    #[must_use]
    pub fn with_native_timing(mut self, native: Arc<dyn NativeTiming>) -> Self {
        self.native = Some(native);
        self
    }

    /// Replaces one channel's routine.
    #[must_use]
    pub fn with_routine(mut self, routine: Box<dyn ActionRoutine>) -> Self {
        self.routines.replace(routine);
        self
    }

    /// Sets the baseline reports are compared against.
    #[must_use]
    pub fn with_baseline(mut self, baseline: BaselineMetrics) -> Self {
        self.baseline = Some(baseline);
        self
    }

    // =========================================================================
    // Status
    // =========================================================================

    /// True if the module is handling hooks.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.status == ModuleStatus::Enabled
    }

    /// Current status.
    #[must_use]
    pub fn status(&self) -> &ModuleStatus {
        &self.status
    }

    /// Configuration in force.
    #[must_use]
    pub fn config(&self) -> &TimingConfig {
        &self.config
    }

    /// Timing table in use.
    #[must_use]
    pub fn table(&self) -> &Arc<TimingTable> {
        &self.table
    }

    /// The module's clock.
    #[must_use]
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// The host collaborator.
    #[must_use]
    pub fn host(&self) -> &H {
        &self.host
    }

    /// The host collaborator, mutably.
    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    /// Actors currently in the active set.
    #[must_use]
    pub fn active_len(&self) -> usize {
        self.active.len()
    }

    /// Timer state of an active actor.
    #[must_use]
    pub fn timer_state(&self, actor: ActorId) -> Option<&ActorTimerState> {
        self.active.get(actor)
    }

    /// Scheduler totals.
    #[must_use]
    pub fn pulse_stats(&self) -> &PulseStats {
        self.pulse.stats()
    }

    /// Tick cadence.
    #[must_use]
    pub fn cadence(&self) -> &Cadence {
        self.pulse.cadence()
    }

    /// Tick-processing health.
    pub fn tick_health(&mut self) -> TickHealth {
        self.pulse.health()
    }

    /// The clock reading floored to the current tick slot. Work arriving
    /// between ticks is stamped with the tick it belongs to, so delays are
    /// measured on the same grid the scheduler fires on.
    fn tick_clock_ms(&self) -> u64 {
        self.pulse.cadence().slot_at_or_before(self.clock.now_ms())
    }

    fn policy(&self) -> TimerPolicy {
        if self.config.independent_timers {
            TimerPolicy::Independent
        } else {
            TimerPolicy::Shared
        }
    }

    fn split(&mut self) -> (Dispatch<'_>, &mut ActiveSet, &mut Pulse) {
        let policy = self.policy();
        let dispatch = Dispatch {
            host: &mut self.host,
            routines: &self.routines,
            formula: self.formula.as_ref(),
            table: self.table.as_ref(),
            recorder: &mut self.recorder,
            native: self.native.as_deref(),
            policy,
        };
        (dispatch, &mut self.active, &mut self.pulse)
    }

    // =========================================================================
    // Host operations
    // =========================================================================

    /// Handles an action request at `now_ms`.
    ///
    /// `now_ms` should be a tick boundary. Unknown actors are registered. A
    /// rejected first request leaves no trace in the active set. A panic
    /// during the request rolls the actor's timers back and falls back to
    /// native handling.
    pub fn request_action_at(&mut self, now_ms: u64, actor: ActorId, action: ActionDescriptor) -> HookOutcome {
        if !self.is_enabled() {
            return HookOutcome::Native;
        }

        let (mut dispatch, active, _) = self.split();
        let (state, inserted) = active.get_or_register(actor, now_ms);
        let before = state.clone();
        let result = panic::catch_unwind(AssertUnwindSafe(|| dispatch.request(state, action, now_ms)));

        match result {
            Ok(Ok(acceptance)) => HookOutcome::Accepted(acceptance),
            Ok(Err(reason)) => {
                if inserted {
                    active.remove(actor);
                }
                debug!(actor = %actor, action = %action, %reason, "action rejected");
                HookOutcome::Rejected(reason)
            }
            Err(_) => {
                if inserted {
                    active.remove(actor);
                } else {
                    *state = before;
                }
                error!(actor = %actor, action = %action, "routine panicked during request, using native path");
                HookOutcome::Native
            }
        }
    }

    /// Records an out-of-band resolution for the action armed on its channel.
    ///
    /// Returns false if that action is not armed.
    pub fn action_resolved(&mut self, actor: ActorId, action: ActionDescriptor, outcome: ResolutionOutcome) -> bool {
        if !self.is_enabled() {
            return false;
        }
        let Some(state) = self.active.get_mut(actor) else {
            return false;
        };
        let matches = state
            .channel(action.kind)
            .armed()
            .is_some_and(|armed| armed.action == action);
        matches && state.note_resolution(action.kind, outcome.resource_consumed)
    }

    /// Brings an actor under timing control.
    pub fn enter_at(&mut self, now_ms: u64, actor: ActorId) {
        if !self.is_enabled() {
            return;
        }
        let (state, inserted) = self.active.get_or_register(actor, now_ms);
        state.touch(now_ms);
        if inserted {
            debug!(actor = %actor, "actor entered timing");
        }
    }

    /// Releases an actor, cancelling anything pending.
    pub fn leave(&mut self, actor: ActorId) {
        if let Some(mut state) = self.active.remove(actor) {
            state.cancel_all();
            debug!(actor = %actor, "actor left timing");
        }
    }

    /// Cancels one channel of an actor. Returns the cancelled action.
    pub fn cancel(&mut self, actor: ActorId, channel: Channel) -> Option<ActionDescriptor> {
        self.active.get_mut(actor)?.cancel(channel).map(|armed| armed.action)
    }

    /// Applies a queued hook call.
    ///
    /// Rejections of queued requests are reported to the host through
    /// [`HostEffects::rejected`].
    pub fn apply_event(&mut self, now_ms: u64, event: HostEvent) -> HookOutcome {
        match event {
            HostEvent::ActionRequested { actor, action } => {
                let outcome = self.request_action_at(now_ms, actor, action);
                if let HookOutcome::Rejected(reason) = outcome {
                    self.host.rejected(actor, &action, reason);
                }
                outcome
            }
            HostEvent::ActionResolved { actor, action, outcome } => {
                self.action_resolved(actor, action, outcome);
                HookOutcome::Queued
            }
            HostEvent::ActorEntered(actor) => {
                self.enter_at(now_ms, actor);
                HookOutcome::Queued
            }
            HostEvent::ActorLeft(actor) => {
                self.leave(actor);
                HookOutcome::Queued
            }
        }
    }

    // =========================================================================
    // Ticking
    // =========================================================================

    /// Runs one scheduler tick at `now_ms`.
    pub fn tick_at(&mut self, now_ms: u64) -> TickReport {
        if !self.is_enabled() {
            return TickReport {
                now_ms,
                ..TickReport::default()
            };
        }

        let (mut dispatch, active, pulse) = self.split();
        let report = pulse.tick(now_ms, active, &mut dispatch);

        if now_ms.saturating_sub(self.last_flush_ms) >= self.config.audit.flush_interval_ms {
            self.recorder.flush();
            if let Some(collector) = self.collector.as_mut() {
                collector.drain();
            }
            self.last_flush_ms = now_ms;
        }
        report
    }

    /// Runs one tick at the current tick slot.
    pub fn tick(&mut self) -> TickReport {
        let now_ms = self.tick_clock_ms();
        self.tick_at(now_ms)
    }

    /// Closes a tick and plans the next one (see [`Pulse::complete_tick`]).
    pub fn complete_tick(&mut self, tick_start_ms: u64, finished_ms: u64, processing_us: u64) -> TickPlan {
        self.pulse.complete_tick(tick_start_ms, finished_ms, processing_us)
    }

    // =========================================================================
    // Audit
    // =========================================================================

    /// Moves the collector onto a background flush worker that absorbs
    /// batches every `interval`. No-op if a worker is already running or the
    /// collector was taken.
    pub fn spawn_audit_worker(&mut self, interval: Duration) {
        if self.worker.is_some() {
            return;
        }
        if let Some(collector) = self.collector.take() {
            self.worker = Some(collector.spawn(interval));
            debug!(?interval, "audit flush worker started");
        }
    }

    /// Stops the flush worker, if any, and takes the collector back.
    pub fn stop_audit_worker(&mut self) {
        self.recorder.flush();
        if let Some(worker) = self.worker.take() {
            self.collector = worker.stop();
        }
    }

    /// Hands the collector to the caller, stopping the flush worker first.
    ///
    /// [`TimingModule::report_at`] returns `None` afterwards.
    pub fn take_collector(&mut self) -> Option<AuditCollector> {
        self.stop_audit_worker();
        self.collector.take()
    }

    /// Builds an audit report from everything recorded so far.
    ///
    /// `None` if the collector was taken.
    pub fn report_at(&mut self, now_ms: u64) -> Option<AuditReport> {
        self.recorder.flush();
        let report = if let Some(worker) = &self.worker {
            AuditReport::build(&worker.snapshot(), self.baseline.as_ref(), now_ms)
        } else {
            let collector = self.collector.as_mut()?;
            collector.drain();
            AuditReport::build(collector.aggregate(), self.baseline.as_ref(), now_ms)
        };
        Some(report.with_tick_health(self.pulse.health()))
    }

    /// The baseline in use, if any.
    #[must_use]
    pub fn baseline(&self) -> Option<&BaselineMetrics> {
        self.baseline.as_ref()
    }

    /// Tears the module down, flushing the audit buffer, and returns the host.
    pub fn into_host(mut self) -> H {
        self.recorder.flush();
        self.host
    }
}

impl<H: HostEffects> TimingHooks for TimingModule<H> {
    fn on_action_requested(&mut self, actor: ActorId, action: ActionDescriptor) -> HookOutcome {
        let now_ms = self.tick_clock_ms();
        self.request_action_at(now_ms, actor, action)
    }

    fn on_action_resolved(&mut self, actor: ActorId, action: ActionDescriptor, outcome: ResolutionOutcome) {
        self.action_resolved(actor, action, outcome);
    }

    fn on_actor_entered_timing(&mut self, actor: ActorId) {
        let now_ms = self.tick_clock_ms();
        self.enter_at(now_ms, actor);
    }

    fn on_actor_left_timing(&mut self, actor: ActorId) {
        self.leave(actor);
    }
}

impl<H> std::fmt::Debug for TimingModule<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimingModule")
            .field("status", &self.status)
            .field("active", &self.active.len())
            .field("entries", &self.table.len())
            .field("routines", &self.routines)
            .finish_non_exhaustive()
    }
}
