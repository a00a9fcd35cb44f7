//! Seeded request generator.

use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use tempo_core::{ActionDescriptor, ActionForm, ActionKind, ActorId, HostEvent, TimingTable};

/// Produces the host events for each tick slot.
pub struct Workload {
    rng: ChaCha8Rng,
    population: u64,
    requests_per_tick: u32,
    actions: Vec<ActionDescriptor>,
}

impl Workload {
    /// Requests draw from every entry in `table`; spells also come in scroll form.
    pub fn new(table: &TimingTable, population: u64, requests_per_tick: u32, seed: u64) -> Self {
        let mut actions = Vec::with_capacity(table.len() * 2);
        for entry in table.iter() {
            let action = ActionDescriptor::new(entry.kind, entry.key);
            actions.push(action);
            if entry.kind == ActionKind::Spell {
                actions.push(action.with_form(ActionForm::Scroll));
            }
        }

        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
            population: population.max(1),
            requests_per_tick,
            actions,
        }
    }

    /// Events for one tick slot.
    pub fn next_slot(&mut self) -> Vec<HostEvent> {
        let count = self.rng.gen_range(0..=self.requests_per_tick * 2);
        let mut events = Vec::new();

        for _ in 0..count {
            let actor = ActorId::new(self.rng.gen_range(0..self.population));
            let Some(&action) = self.actions.choose(&mut self.rng) else {
                break;
            };
            events.push(HostEvent::ActionRequested { actor, action });
        }

        // occasional logout
        if self.rng.gen_bool(0.01) {
            events.push(HostEvent::ActorLeft(ActorId::new(self.rng.gen_range(0..self.population))));
        }
        events
    }
}
