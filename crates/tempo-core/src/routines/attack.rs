//! Weapon swings.

use tempo_audit::ActionKind;

use super::{check_resource, ActionRoutine, FollowUp, RejectReason};
use crate::action::ActionDescriptor;
use crate::actor::{ActorSnapshot, ActorStatus};

/// Swing routine. Keeps swinging while the host reports the actor in combat.
///
/// Ranged weapons carry a resource cost in their table entry and need that
/// much ammunition.
#[derive(Debug, Clone, Copy, Default)]
pub struct AttackRoutine;

impl ActionRoutine for AttackRoutine {
    fn kind(&self) -> ActionKind {
        ActionKind::Swing
    }

    fn name(&self) -> &'static str {
        "attack"
    }

    fn check(&self, actor: &ActorSnapshot, cost: u32) -> Result<(), RejectReason> {
        if actor.interrupted {
            return Err(RejectReason::Interrupted);
        }
        check_resource(actor, ActionKind::Swing, cost)
    }

    fn follow_up(&self, actor: Option<&ActorSnapshot>, action: &ActionDescriptor) -> FollowUp {
        match actor {
            Some(a) if a.in_combat && a.status == ActorStatus::Alive => FollowUp::Rearm(*action),
            _ => FollowUp::Idle,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::ActorId;

    #[test]
    fn test_repeats_only_in_combat() {
        let mut actor = ActorSnapshot::alive(ActorId::new(1));
        let swing = ActionDescriptor::swing(3);

        assert_eq!(AttackRoutine.follow_up(Some(&actor), &swing), FollowUp::Idle);
        actor.in_combat = true;
        assert_eq!(AttackRoutine.follow_up(Some(&actor), &swing), FollowUp::Rearm(swing));
        actor.status = ActorStatus::Dead;
        assert_eq!(AttackRoutine.follow_up(Some(&actor), &swing), FollowUp::Idle);
        assert_eq!(AttackRoutine.follow_up(None, &swing), FollowUp::Idle);
    }

    #[test]
    fn test_ranged_needs_ammo() {
        let mut actor = ActorSnapshot::alive(ActorId::new(1));
        assert!(AttackRoutine.check(&actor, 0).is_ok());
        assert!(AttackRoutine.check(&actor, 1).is_err());
        actor.resources.ammo = 3;
        assert!(AttackRoutine.check(&actor, 1).is_ok());
    }
}
