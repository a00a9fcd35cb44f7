//! Test helpers: a scripted host and module setup.

use std::cell::Cell;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tempo_audit::{ActionKind, AuditReport};

use crate::action::ActionDescriptor;
use crate::actor::{ActorId, ActorSnapshot, ActorStats, Resources};
use crate::cadence::ManualClock;
use crate::config::TimingConfig;
use crate::error::RoutineError;
use crate::module::TimingModule;
use crate::pulse::TickReport;
use crate::routines::{HostEffects, RejectReason, ResolutionOutcome};

// =============================================================================
// Scripted host
// =============================================================================

/// A host call observed by [`ScriptedHost`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostCall {
    Effect(ActorId, ActionDescriptor),
    Resolve(ActorId, ActionDescriptor),
    Interrupted(ActorId, ActionDescriptor),
    Rejected(ActorId, ActionDescriptor, RejectReason),
}

/// In-memory host: a map of actor snapshots plus a call log.
#[derive(Debug, Default)]
pub struct ScriptedHost {
    pub actors: HashMap<ActorId, ActorSnapshot>,
    pub calls: Vec<HostCall>,
    /// Actors whose resolutions fail.
    pub fail_resolve: HashSet<ActorId>,
    /// Actors whose resolutions panic.
    pub panic_resolve: HashSet<ActorId>,
    /// Actors whose visible effects panic.
    pub panic_effect: HashSet<ActorId>,
    /// Number of snapshot queries served.
    pub snapshot_queries: Cell<u64>,
}

impl ScriptedHost {
    pub fn with_actors(actors: impl IntoIterator<Item = ActorSnapshot>) -> Self {
        Self {
            actors: actors.into_iter().map(|a| (a.id, a)).collect(),
            ..Self::default()
        }
    }

    pub fn actor_mut(&mut self, id: u64) -> &mut ActorSnapshot {
        self.actors.get_mut(&ActorId::new(id)).expect("unknown test actor")
    }

    pub fn count(&self, pred: impl Fn(&HostCall) -> bool) -> usize {
        self.calls.iter().filter(|c| pred(c)).count()
    }

    pub fn resolves_for(&self, id: u64) -> usize {
        self.count(|c| matches!(c, HostCall::Resolve(a, _) if *a == ActorId::new(id)))
    }
}

impl HostEffects for ScriptedHost {
    fn snapshot(&self, actor: ActorId) -> Option<ActorSnapshot> {
        self.snapshot_queries.set(self.snapshot_queries.get() + 1);
        self.actors.get(&actor).copied()
    }

    fn play_effect(&mut self, actor: ActorId, action: &ActionDescriptor) -> Result<(), RoutineError> {
        if self.panic_effect.contains(&actor) {
            panic!("scripted effect panic for {actor}");
        }
        self.calls.push(HostCall::Effect(actor, *action));
        Ok(())
    }

    fn resolve(&mut self, actor: ActorId, action: &ActionDescriptor) -> Result<ResolutionOutcome, RoutineError> {
        if self.panic_resolve.contains(&actor) {
            panic!("scripted panic for {actor}");
        }
        if self.fail_resolve.contains(&actor) {
            return Err(RoutineError::Host(format!("scripted failure for {actor}")));
        }
        self.calls.push(HostCall::Resolve(actor, *action));
        if let Some(snapshot) = self.actors.get_mut(&actor) {
            let r = &mut snapshot.resources;
            match action.kind {
                ActionKind::Swing => r.ammo = r.ammo.saturating_sub(1),
                ActionKind::Spell => r.mana = r.mana.saturating_sub(1),
                ActionKind::Bandage => r.bandages = r.bandages.saturating_sub(1),
                ActionKind::Wand => r.wand_charges = r.wand_charges.saturating_sub(1),
            }
        }
        Ok(ResolutionOutcome::landed())
    }

    fn interrupted(&mut self, actor: ActorId, action: &ActionDescriptor) {
        self.calls.push(HostCall::Interrupted(actor, *action));
    }

    fn rejected(&mut self, actor: ActorId, action: &ActionDescriptor, reason: RejectReason) {
        self.calls.push(HostCall::Rejected(actor, *action, reason));
    }
}

// =============================================================================
// Actor factories
// =============================================================================

/// Plenty of every resource.
pub fn stocked() -> Resources {
    Resources {
        mana: 100,
        bandages: 10,
        wand_charges: 10,
        ammo: 50,
    }
}

/// A fighter in combat with the given dex.
pub fn fighter(id: u64, dex: u32) -> ActorSnapshot {
    ActorSnapshot {
        stats: ActorStats { dex, int: 100 },
        in_combat: true,
        resources: stocked(),
        ..ActorSnapshot::alive(ActorId::new(id))
    }
}

/// An out-of-combat actor with baseline stats and full resources.
pub fn civilian(id: u64) -> ActorSnapshot {
    ActorSnapshot {
        resources: stocked(),
        ..ActorSnapshot::alive(ActorId::new(id))
    }
}

// =============================================================================
// Module setup
// =============================================================================

/// 50ms ticks, 1s idle eviction.
pub fn fast_config() -> TimingConfig {
    TimingConfig {
        idle_eviction_ms: 1_000,
        ..TimingConfig::default()
    }
}

/// Module at time 0 over `host`, with a shared manual clock.
pub fn module_with(config: TimingConfig, host: ScriptedHost) -> (TimingModule<ScriptedHost>, ManualClock) {
    let clock = ManualClock::starting_at(0);
    let module = TimingModule::initialize(config, host, Arc::new(clock.clone()));
    (module, clock)
}

/// Ticks at every `step_ms` from `from_ms` through `to_ms` inclusive.
pub fn run_ticks(
    module: &mut TimingModule<ScriptedHost>,
    from_ms: u64,
    to_ms: u64,
    step_ms: u64,
) -> Vec<TickReport> {
    (from_ms..=to_ms)
        .step_by(usize::try_from(step_ms).expect("step fits usize"))
        .map(|now| module.tick_at(now))
        .collect()
}

/// Report at `now_ms`; panics if the collector was taken.
pub fn report(module: &mut TimingModule<ScriptedHost>, now_ms: u64) -> AuditReport {
    module.report_at(now_ms).expect("collector still owned by module")
}
