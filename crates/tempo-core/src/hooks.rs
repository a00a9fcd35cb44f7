//! Host-facing hook interface.
//!
//! The host calls [`TimingHooks`] at four lifecycle points. Two
//! implementations exist:
//!
//! - [`crate::TimingModule`] handles calls synchronously on the caller's
//!   thread.
//! - [`HookRegistration`] queues calls for a [`crate::PulseDriver`] thread,
//!   which applies them at the next tick boundary. Dropping the registration
//!   detaches it; once the driver is gone every hook reports
//!   [`HookOutcome::Native`].

use serde::{Deserialize, Serialize};
use std::sync::mpsc::Sender;

use crate::action::ActionDescriptor;
use crate::actor::ActorId;
use crate::dispatch::Acceptance;
use crate::routines::{RejectReason, ResolutionOutcome};

/// Result of an action request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HookOutcome {
    /// The engine is not handling this; the host uses its native path.
    Native,
    /// Queued for the next tick boundary; the outcome is reported through
    /// [`crate::routines::HostEffects`].
    Queued,
    /// Accepted and armed.
    Accepted(Acceptance),
    /// Refused.
    Rejected(RejectReason),
}

impl HookOutcome {
    /// True if the engine took ownership of the action.
    #[must_use]
    pub const fn is_handled(&self) -> bool {
        !matches!(self, Self::Native)
    }
}

/// Lifecycle callbacks the host invokes.
pub trait TimingHooks {
    /// An actor asks to perform an action.
    fn on_action_requested(&mut self, actor: ActorId, action: ActionDescriptor) -> HookOutcome;

    /// The host resolved an action out of band (e.g. through its own damage
    /// pipeline) and reports whether the resource was consumed.
    fn on_action_resolved(&mut self, actor: ActorId, action: ActionDescriptor, outcome: ResolutionOutcome);

    /// The actor entered timing control (combat start, login).
    fn on_actor_entered_timing(&mut self, actor: ActorId);

    /// The actor left timing control (death, logout); pending actions are cancelled.
    fn on_actor_left_timing(&mut self, actor: ActorId);
}

/// A hook call waiting for the tick boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HostEvent {
    /// See [`TimingHooks::on_action_requested`].
    ActionRequested {
        /// Requesting actor.
        actor: ActorId,
        /// Requested action.
        action: ActionDescriptor,
    },
    /// See [`TimingHooks::on_action_resolved`].
    ActionResolved {
        /// Actor.
        actor: ActorId,
        /// Resolved action.
        action: ActionDescriptor,
        /// Outcome.
        outcome: ResolutionOutcome,
    },
    /// See [`TimingHooks::on_actor_entered_timing`].
    ActorEntered(ActorId),
    /// See [`TimingHooks::on_actor_left_timing`].
    ActorLeft(ActorId),
}

/// Queue-backed hooks handed to the host's extension registry.
///
/// Cheap to clone; each clone feeds the same driver.
#[derive(Debug, Clone)]
pub struct HookRegistration {
    tx: Sender<HostEvent>,
}

impl HookRegistration {
    pub(crate) fn new(tx: Sender<HostEvent>) -> Self {
        Self { tx }
    }

    /// Queues an event. Returns false if the driver is gone.
    pub fn send(&self, event: HostEvent) -> bool {
        self.tx.send(event).is_ok()
    }
}

impl TimingHooks for HookRegistration {
    fn on_action_requested(&mut self, actor: ActorId, action: ActionDescriptor) -> HookOutcome {
        if self.send(HostEvent::ActionRequested { actor, action }) {
            HookOutcome::Queued
        } else {
            HookOutcome::Native
        }
    }

    fn on_action_resolved(&mut self, actor: ActorId, action: ActionDescriptor, outcome: ResolutionOutcome) {
        self.send(HostEvent::ActionResolved { actor, action, outcome });
    }

    fn on_actor_entered_timing(&mut self, actor: ActorId) {
        self.send(HostEvent::ActorEntered(actor));
    }

    fn on_actor_left_timing(&mut self, actor: ActorId) {
        self.send(HostEvent::ActorLeft(actor));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn test_registration_queues_events() {
        let (tx, rx) = mpsc::channel();
        let mut hooks = HookRegistration::new(tx);
        let swing = ActionDescriptor::swing(3);

        assert_eq!(hooks.on_action_requested(ActorId::new(1), swing), HookOutcome::Queued);
        hooks.on_actor_left_timing(ActorId::new(1));

        let events: Vec<_> = rx.try_iter().collect();
        assert_eq!(
            events,
            vec![
                HostEvent::ActionRequested {
                    actor: ActorId::new(1),
                    action: swing
                },
                HostEvent::ActorLeft(ActorId::new(1)),
            ]
        );
    }

    #[test]
    fn test_detached_registration_reports_native() {
        let (tx, rx) = mpsc::channel();
        let mut hooks = HookRegistration::new(tx);
        drop(rx);
        let outcome = hooks.on_action_requested(ActorId::new(1), ActionDescriptor::swing(3));
        assert_eq!(outcome, HookOutcome::Native);
        assert!(!outcome.is_handled());
    }
}
