//! Wand use.

use tempo_audit::ActionKind;

use super::{check_resource, ActionRoutine, RejectReason};
use crate::actor::ActorSnapshot;

/// Wand routine. Needs a charge; a disrupted actor cannot use one.
#[derive(Debug, Clone, Copy, Default)]
pub struct WandRoutine;

impl ActionRoutine for WandRoutine {
    fn kind(&self) -> ActionKind {
        ActionKind::Wand
    }

    fn name(&self) -> &'static str {
        "wand"
    }

    fn check(&self, actor: &ActorSnapshot, cost: u32) -> Result<(), RejectReason> {
        if actor.interrupted {
            return Err(RejectReason::Interrupted);
        }
        check_resource(actor, ActionKind::Wand, cost.max(1))
    }
}
