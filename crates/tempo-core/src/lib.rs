//! # Tempo Core
//!
//! Server-authoritative action timing.
//!
//! Actors perform timed actions on four independent channels (weapon swing,
//! spell, bandage, wand). The engine decides when each action may start,
//! when its effect resolves, and when its channel is ready again, all on a
//! single tick driver that visits only the actors currently acting.
//!
//! ## Architecture
//!
//! ```text
//! host ──hooks──▶ TimingModule ──▶ Dispatch ──▶ ActionRoutine ──▶ HostEffects
//!                    │   ▲             │
//!                    │   └── Pulse ◀───┘ (ActiveSet, per-actor channel timers)
//!                    └──▶ AuditRecorder ──▶ tempo_audit collector / report
//! ```
//!
//! - [`formula`]: delay computation from the [`table::TimingTable`]
//! - [`timer`]: per-actor channel state machines
//! - [`registry`]: the active set
//! - [`pulse`]: one tick over the active set
//! - [`routines`]: what each channel does; the host collaborator trait
//! - [`module`]: the engine context and host hooks
//! - [`driver`]: a wall-clock tick thread with queued host callbacks
//!
//! Timing samples, baseline comparison and reports live in the
//! `tempo-audit` crate.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod action;
pub mod actor;
pub mod cadence;
pub mod config;
pub mod dispatch;
pub mod driver;
pub mod error;
pub mod formula;
pub mod hooks;
pub mod module;
pub mod native;
pub mod pulse;
pub mod registry;
pub mod routines;
pub mod table;
pub mod timer;

#[cfg(test)]
mod tests;

// Re-exports for convenience
pub use action::{ActionDescriptor, ActionForm};
pub use actor::{ActorId, ActorSnapshot, ActorStats, ActorStatus, Resources};
pub use cadence::{Cadence, Clock, ManualClock, MonotonicClock, TickPlan};
pub use config::{AuditConfig, TimingConfig};
pub use dispatch::{Acceptance, Dispatch};
pub use driver::{DriverHandle, PulseDriver};
pub use error::{RoutineError, TimingError, TimingResult};
pub use formula::{LegacyFormula, TimingFormula, DEFAULT_DELAY_MS};
pub use hooks::{HookOutcome, HookRegistration, HostEvent, TimingHooks};
pub use module::{ModuleStatus, TimingModule};
pub use native::{MillisecondTimerModel, NativeTiming};
pub use pulse::{Pulse, PulseStats, TickReport};
pub use registry::ActiveSet;
pub use routines::{
    ActionRoutine, AttackRoutine, BandageRoutine, FollowUp, HostEffects, InvalidState, RejectReason, Resolution,
    ResolutionOutcome, RoutineTable, SpellRoutine, WandRoutine,
};
pub use table::{ActionTimingEntry, TimingTable};
pub use tempo_audit::ActionKind;
pub use timer::{ActorTimerState, Channel, ChannelState, TimerPolicy};

/// Everything a host integration usually needs.
pub mod prelude {
    pub use crate::{
        ActionDescriptor, ActionForm, ActionKind, ActorId, ActorSnapshot, ActorStats, ActorStatus, Clock, HookOutcome,
        HostEffects, ManualClock, MonotonicClock, PulseDriver, RejectReason, ResolutionOutcome, Resources,
        RoutineError, TimingConfig, TimingHooks, TimingModule,
    };
}
