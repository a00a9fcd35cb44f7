//! The active set: actors with at least one pending or recently fired timer.
//!
//! Only actors in this set are visited by the tick, so per-tick cost follows
//! the number of acting actors, not the population.

use std::collections::HashMap;

use crate::actor::ActorId;
use crate::timer::ActorTimerState;

/// Registry of actors currently under timing control.
#[derive(Debug, Default)]
pub struct ActiveSet {
    actors: HashMap<ActorId, ActorTimerState>,
}

impl ActiveSet {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the actor's state, registering it if absent.
    ///
    /// The flag is true when the actor was inserted by this call.
    pub fn get_or_register(&mut self, actor: ActorId, now_ms: u64) -> (&mut ActorTimerState, bool) {
        let mut inserted = false;
        let state = self.actors.entry(actor).or_insert_with(|| {
            inserted = true;
            ActorTimerState::new(actor, now_ms)
        });
        (state, inserted)
    }

    /// State of a registered actor.
    #[must_use]
    pub fn get(&self, actor: ActorId) -> Option<&ActorTimerState> {
        self.actors.get(&actor)
    }

    /// Mutable state of a registered actor.
    pub fn get_mut(&mut self, actor: ActorId) -> Option<&mut ActorTimerState> {
        self.actors.get_mut(&actor)
    }

    /// Removes an actor.
    pub fn remove(&mut self, actor: ActorId) -> Option<ActorTimerState> {
        self.actors.remove(&actor)
    }

    /// True if the actor is registered.
    #[must_use]
    pub fn contains(&self, actor: ActorId) -> bool {
        self.actors.contains_key(&actor)
    }

    /// Number of registered actors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.actors.len()
    }

    /// True if nobody is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.actors.is_empty()
    }

    /// Registered ids, in no particular order.
    pub fn ids(&self) -> impl Iterator<Item = ActorId> + '_ {
        self.actors.keys().copied()
    }

    /// Visits every actor; those for which `keep` returns false are removed.
    ///
    /// Shrinks the backing storage after large evictions so that iteration
    /// cost keeps tracking the live count.
    pub fn retain_mut(&mut self, mut keep: impl FnMut(&mut ActorTimerState) -> bool) {
        self.actors.retain(|_, state| keep(state));
        let len = self.actors.len();
        if self.actors.capacity() > 4 * len + 64 {
            self.actors.shrink_to(2 * len);
        }
    }

    /// Removes every actor idle for at least `idle_ms` at `now_ms`.
    pub fn evict_idle(&mut self, now_ms: u64, idle_ms: u64) -> Vec<ActorId> {
        let mut evicted = Vec::new();
        self.retain_mut(|state| {
            if is_evictable(state, now_ms, idle_ms) {
                evicted.push(state.actor());
                false
            } else {
                true
            }
        });
        evicted
    }
}

/// All channels idle and no activity for `idle_ms`.
#[must_use]
pub fn is_evictable(state: &ActorTimerState, now_ms: u64, idle_ms: u64) -> bool {
    state.is_idle() && now_ms.saturating_sub(state.last_activity_ms()) >= idle_ms
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::ActionDescriptor;
    use crate::timer::{ArmedAction, TimerPolicy};

    #[test]
    fn test_get_or_register_reports_insertion() {
        let mut set = ActiveSet::new();
        let (_, inserted) = set.get_or_register(ActorId::new(1), 0);
        assert!(inserted);
        let (_, inserted) = set.get_or_register(ActorId::new(1), 10);
        assert!(!inserted);
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_evict_idle_respects_timeout_and_pending() {
        let mut set = ActiveSet::new();
        set.get_or_register(ActorId::new(1), 0);
        let (busy, _) = set.get_or_register(ActorId::new(2), 0);
        busy.arm(
            ArmedAction {
                action: ActionDescriptor::swing(3),
                accepted_at_ms: 0,
                expected_ms: 60_000,
                resource_consumed: None,
                native_ms: None,
            },
            30_000,
            TimerPolicy::Independent,
        );

        assert!(set.evict_idle(29_999, 30_000).is_empty());
        let evicted = set.evict_idle(30_000, 30_000);
        assert_eq!(evicted, vec![ActorId::new(1)]);
        assert!(set.contains(ActorId::new(2)));
    }

    #[test]
    fn test_shrinks_after_mass_eviction() {
        let mut set = ActiveSet::new();
        for id in 0..10_000 {
            set.get_or_register(ActorId::new(id), 0);
        }
        set.evict_idle(100, 50);
        assert!(set.is_empty());
        assert!(set.actors.capacity() <= 64);
    }
}
