//! Action routines and the host collaborator they act through.
//!
//! A routine decides whether an action may start, what happens when its
//! resolution comes due, and what follows once its channel is ready again.
//! It never touches timers; the scheduler owns those.
//!
//! # Built-in Routines
//!
//! | Routine | Channel | Gate | Follow-up |
//! |---------|---------|------|-----------|
//! | [`AttackRoutine`] | swing | ammo for ranged entries | repeats while in combat |
//! | [`SpellRoutine`] | spell | mana, not interrupted | none; interruption fizzles |
//! | [`BandageRoutine`] | bandage | a bandage | none |
//! | [`WandRoutine`] | wand | a charge | none |

mod attack;
mod bandage;
mod spell;
mod wand;

pub use attack::AttackRoutine;
pub use bandage::BandageRoutine;
pub use spell::SpellRoutine;
pub use wand::WandRoutine;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use tempo_audit::ActionKind;

use crate::action::ActionDescriptor;
use crate::actor::{ActorId, ActorSnapshot, ActorStatus};
use crate::error::RoutineError;

// =============================================================================
// Outcomes
// =============================================================================

/// Why an action request was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Error)]
pub enum RejectReason {
    /// The channel's timer has not elapsed.
    #[error("not ready, {remaining_ms}ms remaining")]
    NotReady {
        /// Time until the channel is permitted.
        remaining_ms: u64,
    },
    /// The actor cannot perform the action in its current state.
    #[error("invalid state: {0:?}")]
    InvalidState(InvalidState),
    /// The actor is interrupted.
    #[error("interrupted")]
    Interrupted,
}

/// State problems that block an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InvalidState {
    /// Actor is dead.
    Dead,
    /// Actor is disconnected or unknown to the host.
    Disconnected,
    /// Not enough of the action's resource.
    MissingResource,
}

/// What the host reports after applying a resolution.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionOutcome {
    /// The action used up its resource (mana spent, bandage used, ...).
    pub resource_consumed: bool,
    /// The action had its effect (hit landed, heal applied, ...).
    pub landed: bool,
}

impl ResolutionOutcome {
    /// Resource consumed and effect applied.
    #[must_use]
    pub const fn landed() -> Self {
        Self {
            resource_consumed: true,
            landed: true,
        }
    }

    /// Resource consumed, no effect (a miss).
    #[must_use]
    pub const fn missed() -> Self {
        Self {
            resource_consumed: true,
            landed: false,
        }
    }
}

/// Result of a routine's resolution step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Resolution applied; the channel stays armed until its due time.
    Completed(ResolutionOutcome),
    /// The action was cut short; the channel completes now without consuming.
    Interrupted,
}

/// What a channel does after its ready-timer fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowUp {
    /// Return to idle.
    Idle,
    /// Request this action again immediately.
    Rearm(ActionDescriptor),
}

// =============================================================================
// Host collaborator
// =============================================================================

/// Everything the engine needs from the host.
///
/// The engine calls these only from the tick context (or the caller's thread
/// for synchronous requests), never concurrently.
pub trait HostEffects {
    /// Current view of an actor, or `None` if the host no longer knows it.
    fn snapshot(&self, actor: ActorId) -> Option<ActorSnapshot>;

    /// Plays the immediate visible effect of an accepted action.
    ///
    /// # Errors
    ///
    /// Host failure; logged, the action stays accepted.
    fn play_effect(&mut self, actor: ActorId, action: &ActionDescriptor) -> Result<(), RoutineError>;

    /// Applies the action's resolution (damage, heal, spell effect).
    ///
    /// # Errors
    ///
    /// Host failure; the scheduler isolates it to this channel.
    fn resolve(&mut self, actor: ActorId, action: &ActionDescriptor) -> Result<ResolutionOutcome, RoutineError>;

    /// The action was interrupted before resolving.
    fn interrupted(&mut self, _actor: ActorId, _action: &ActionDescriptor) {}

    /// A queued request was refused.
    fn rejected(&mut self, _actor: ActorId, _action: &ActionDescriptor, _reason: RejectReason) {}
}

// =============================================================================
// Routine trait
// =============================================================================

/// Behaviour bound to one channel.
pub trait ActionRoutine: Send + Sync {
    /// Channel this routine serves.
    fn kind(&self) -> ActionKind;

    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Gates a request. `cost` is the table entry's resource cost.
    ///
    /// # Errors
    ///
    /// The reason the action may not start.
    fn check(&self, actor: &ActorSnapshot, cost: u32) -> Result<(), RejectReason>;

    /// Immediate visible effect of an accepted action.
    ///
    /// # Errors
    ///
    /// Host failure.
    fn begin(
        &self,
        host: &mut dyn HostEffects,
        actor: &ActorSnapshot,
        action: &ActionDescriptor,
    ) -> Result<(), RoutineError> {
        host.play_effect(actor.id, action)
    }

    /// Resolution step, run at the scheduled resolution time.
    ///
    /// # Errors
    ///
    /// Host failure.
    fn resolve(
        &self,
        host: &mut dyn HostEffects,
        actor: &ActorSnapshot,
        action: &ActionDescriptor,
    ) -> Result<Resolution, RoutineError> {
        host.resolve(actor.id, action).map(Resolution::Completed)
    }

    /// Follow-up once the ready-timer fired. `actor` is `None` if the host
    /// no longer knows the actor.
    fn follow_up(&self, _actor: Option<&ActorSnapshot>, _action: &ActionDescriptor) -> FollowUp {
        FollowUp::Idle
    }
}

/// Rejects dead and disconnected actors.
///
/// # Errors
///
/// [`RejectReason::InvalidState`] for anything but [`ActorStatus::Alive`].
pub fn check_status(actor: &ActorSnapshot) -> Result<(), RejectReason> {
    match actor.status {
        ActorStatus::Alive => Ok(()),
        ActorStatus::Dead => Err(RejectReason::InvalidState(InvalidState::Dead)),
        ActorStatus::Disconnected => Err(RejectReason::InvalidState(InvalidState::Disconnected)),
    }
}

/// Rejects actors with fewer than `needed` units of `kind`'s resource.
///
/// # Errors
///
/// [`InvalidState::MissingResource`].
pub fn check_resource(actor: &ActorSnapshot, kind: ActionKind, needed: u32) -> Result<(), RejectReason> {
    if actor.resources.available_for(kind) < needed {
        Err(RejectReason::InvalidState(InvalidState::MissingResource))
    } else {
        Ok(())
    }
}

// =============================================================================
// Routine table
// =============================================================================

/// One routine per channel.
pub struct RoutineTable {
    routines: [Box<dyn ActionRoutine>; ActionKind::COUNT],
}

impl RoutineTable {
    /// The built-in routines.
    #[must_use]
    pub fn standard() -> Self {
        Self {
            routines: [
                Box::new(AttackRoutine),
                Box::new(SpellRoutine),
                Box::new(BandageRoutine),
                Box::new(WandRoutine),
            ],
        }
    }

    /// Replaces the routine for `routine.kind()`.
    pub fn replace(&mut self, routine: Box<dyn ActionRoutine>) {
        let index = routine.kind().index();
        self.routines[index] = routine;
    }

    /// Routine for a channel.
    #[must_use]
    pub fn get(&self, kind: ActionKind) -> &dyn ActionRoutine {
        self.routines[kind.index()].as_ref()
    }
}

impl Default for RoutineTable {
    fn default() -> Self {
        Self::standard()
    }
}

impl std::fmt::Debug for RoutineTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.routines.iter().map(|r| r.name())).finish()
    }
}
