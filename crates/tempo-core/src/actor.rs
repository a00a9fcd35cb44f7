//! Actor-facing types shared with the host.
//!
//! The engine never owns actors. It refers to them through [`ActorId`] and
//! reads their state through [`ActorSnapshot`]s supplied by the host at the
//! moment a decision is made.

use serde::{Deserialize, Serialize};
use std::fmt;

use tempo_audit::ActionKind;

/// Opaque handle to a host entity.
///
/// # Example
///
/// ```
/// use tempo_core::actor::ActorId;
///
/// let id = ActorId::new(42);
/// assert_eq!(id.as_u64(), 42);
/// assert_eq!(id.to_string(), "42");
/// ```
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ActorId(u64);

impl ActorId {
    /// Creates an `ActorId` from the host's raw handle.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw handle.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ActorId({})", self.0)
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for ActorId {
    fn from(id: u64) -> Self {
        Self::new(id)
    }
}

/// Stats the timing formulas read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActorStats {
    /// Dexterity (swing and bandage speed).
    pub dex: u32,
    /// Intelligence (cast speed).
    pub int: u32,
}

impl Default for ActorStats {
    fn default() -> Self {
        Self { dex: 100, int: 100 }
    }
}

/// Liveness as reported by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActorStatus {
    /// Able to act.
    Alive,
    /// Dead; all actions rejected.
    Dead,
    /// Client gone; all actions rejected.
    Disconnected,
}

/// Consumable resources gating actions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resources {
    /// Mana for spells.
    pub mana: u32,
    /// Bandages carried.
    pub bandages: u32,
    /// Charges on the equipped wand.
    pub wand_charges: u32,
    /// Ammunition for ranged weapons.
    pub ammo: u32,
}

impl Resources {
    /// Amount of the resource `kind` consumes.
    #[must_use]
    pub const fn available_for(&self, kind: ActionKind) -> u32 {
        match kind {
            ActionKind::Swing => self.ammo,
            ActionKind::Spell => self.mana,
            ActionKind::Bandage => self.bandages,
            ActionKind::Wand => self.wand_charges,
        }
    }
}

/// Point-in-time view of an actor, supplied by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActorSnapshot {
    /// Which actor.
    pub id: ActorId,
    /// Formula inputs.
    pub stats: ActorStats,
    /// Liveness.
    pub status: ActorStatus,
    /// Whether the actor is engaged in combat (drives swing repeat).
    pub in_combat: bool,
    /// Host-side interruption (paralysis, spell disruption, ...).
    pub interrupted: bool,
    /// Consumables.
    pub resources: Resources,
}

impl ActorSnapshot {
    /// A living, idle actor with default stats and no resources.
    #[must_use]
    pub fn alive(id: ActorId) -> Self {
        Self {
            id,
            stats: ActorStats::default(),
            status: ActorStatus::Alive,
            in_combat: false,
            interrupted: false,
            resources: Resources::default(),
        }
    }
}
