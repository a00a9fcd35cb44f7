//! Bandaging.

use tempo_audit::ActionKind;

use super::{check_resource, ActionRoutine, RejectReason};
use crate::actor::ActorSnapshot;

/// Bandage routine. Needs at least one bandage (or the entry's cost).
#[derive(Debug, Clone, Copy, Default)]
pub struct BandageRoutine;

impl ActionRoutine for BandageRoutine {
    fn kind(&self) -> ActionKind {
        ActionKind::Bandage
    }

    fn name(&self) -> &'static str {
        "bandage"
    }

    fn check(&self, actor: &ActorSnapshot, cost: u32) -> Result<(), RejectReason> {
        check_resource(actor, ActionKind::Bandage, cost.max(1))
    }
}
