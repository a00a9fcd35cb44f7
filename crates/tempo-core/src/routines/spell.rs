//! Spell casting.

use tempo_audit::ActionKind;

use super::{check_resource, ActionRoutine, HostEffects, RejectReason, Resolution};
use crate::action::ActionDescriptor;
use crate::actor::ActorSnapshot;
use crate::error::RoutineError;

/// Spell routine.
///
/// A cast needs the entry's mana cost and an uninterrupted caster. If the
/// caster is interrupted by the time the spell resolves, it fizzles: nothing
/// is spent and the spell channel frees up at once.
#[derive(Debug, Clone, Copy, Default)]
pub struct SpellRoutine;

impl ActionRoutine for SpellRoutine {
    fn kind(&self) -> ActionKind {
        ActionKind::Spell
    }

    fn name(&self) -> &'static str {
        "spell"
    }

    fn check(&self, actor: &ActorSnapshot, cost: u32) -> Result<(), RejectReason> {
        if actor.interrupted {
            return Err(RejectReason::Interrupted);
        }
        check_resource(actor, ActionKind::Spell, cost)
    }

    fn resolve(
        &self,
        host: &mut dyn HostEffects,
        actor: &ActorSnapshot,
        action: &ActionDescriptor,
    ) -> Result<Resolution, RoutineError> {
        if actor.interrupted {
            host.interrupted(actor.id, action);
            return Ok(Resolution::Interrupted);
        }
        host.resolve(actor.id, action).map(Resolution::Completed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::ActorId;
    use crate::routines::{InvalidState, ResolutionOutcome};

    #[derive(Default)]
    struct Host {
        resolved: u32,
        interrupted: u32,
    }

    impl HostEffects for Host {
        fn snapshot(&self, actor: ActorId) -> Option<ActorSnapshot> {
            Some(ActorSnapshot::alive(actor))
        }

        fn play_effect(&mut self, _actor: ActorId, _action: &ActionDescriptor) -> Result<(), RoutineError> {
            Ok(())
        }

        fn resolve(&mut self, _actor: ActorId, _action: &ActionDescriptor) -> Result<ResolutionOutcome, RoutineError> {
            self.resolved += 1;
            Ok(ResolutionOutcome::landed())
        }

        fn interrupted(&mut self, _actor: ActorId, _action: &ActionDescriptor) {
            self.interrupted += 1;
        }
    }

    #[test]
    fn test_needs_mana() {
        let mut caster = ActorSnapshot::alive(ActorId::new(1));
        caster.resources.mana = 8;
        assert_eq!(
            SpellRoutine.check(&caster, 9),
            Err(RejectReason::InvalidState(InvalidState::MissingResource))
        );
        caster.resources.mana = 9;
        assert!(SpellRoutine.check(&caster, 9).is_ok());
    }

    #[test]
    fn test_interrupted_caster_rejected() {
        let mut caster = ActorSnapshot::alive(ActorId::new(1));
        caster.interrupted = true;
        assert_eq!(SpellRoutine.check(&caster, 0), Err(RejectReason::Interrupted));
    }

    #[test]
    fn test_interruption_at_resolution_fizzles() {
        let mut host = Host::default();
        let mut caster = ActorSnapshot::alive(ActorId::new(1));
        let fireball = ActionDescriptor::spell(104);

        let done = SpellRoutine.resolve(&mut host, &caster, &fireball).unwrap();
        assert_eq!(done, Resolution::Completed(ResolutionOutcome::landed()));

        caster.interrupted = true;
        let fizzled = SpellRoutine.resolve(&mut host, &caster, &fireball).unwrap();
        assert_eq!(fizzled, Resolution::Interrupted);
        assert_eq!(host.resolved, 1);
        assert_eq!(host.interrupted, 1);
    }
}
