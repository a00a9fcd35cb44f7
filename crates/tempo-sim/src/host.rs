//! Synthetic host world.

use std::collections::HashMap;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::trace;

use tempo_core::prelude::*;

/// Counters for what the engine asked of the host.
#[derive(Debug, Clone, Copy, Default)]
pub struct HostCounters {
    pub effects: u64,
    pub resolved: u64,
    pub missed: u64,
    pub interrupted: u64,
    pub rejected: u64,
}

/// A population of actors with random stats and stocked inventories.
///
/// Spells are disrupted after they start with probability `interrupt_pct`,
/// and resolved actions miss with probability `miss_pct`.
pub struct SimHost {
    actors: HashMap<ActorId, ActorSnapshot>,
    rng: ChaCha8Rng,
    miss_pct: u32,
    interrupt_pct: u32,
    counters: HostCounters,
}

impl SimHost {
    pub fn new(population: u64, combat_pct: u32, seed: u64) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let actors = (0..population)
            .map(|n| {
                let id = ActorId::new(n);
                let snapshot = ActorSnapshot {
                    stats: ActorStats {
                        dex: rng.gen_range(60..=125),
                        int: rng.gen_range(60..=125),
                    },
                    in_combat: rng.gen_range(0..100) < combat_pct,
                    resources: Resources {
                        mana: rng.gen_range(50..=200),
                        bandages: rng.gen_range(0..=20),
                        wand_charges: rng.gen_range(0..=30),
                        ammo: rng.gen_range(0..=200),
                    },
                    ..ActorSnapshot::alive(id)
                };
                (id, snapshot)
            })
            .collect();

        Self {
            actors,
            rng,
            miss_pct: 20,
            interrupt_pct: 5,
            counters: HostCounters::default(),
        }
    }

    #[must_use]
    pub fn with_interrupt_pct(mut self, pct: u32) -> Self {
        self.interrupt_pct = pct.min(100);
        self
    }

    pub fn counters(&self) -> HostCounters {
        self.counters
    }
}

impl HostEffects for SimHost {
    fn snapshot(&self, actor: ActorId) -> Option<ActorSnapshot> {
        self.actors.get(&actor).copied()
    }

    fn play_effect(&mut self, actor: ActorId, action: &ActionDescriptor) -> Result<(), RoutineError> {
        self.counters.effects += 1;
        if action.kind == ActionKind::Spell && self.rng.gen_range(0..100) < self.interrupt_pct {
            if let Some(snapshot) = self.actors.get_mut(&actor) {
                snapshot.interrupted = true;
            }
        }
        Ok(())
    }

    fn resolve(&mut self, actor: ActorId, action: &ActionDescriptor) -> Result<ResolutionOutcome, RoutineError> {
        let snapshot = self
            .actors
            .get_mut(&actor)
            .ok_or_else(|| RoutineError::Host(format!("{actor} vanished mid-action")))?;

        let r = &mut snapshot.resources;
        match action.kind {
            ActionKind::Swing => r.ammo = r.ammo.saturating_sub(1),
            ActionKind::Spell => r.mana = r.mana.saturating_sub(1),
            ActionKind::Bandage => r.bandages = r.bandages.saturating_sub(1),
            ActionKind::Wand => r.wand_charges = r.wand_charges.saturating_sub(1),
        }

        if self.rng.gen_range(0..100) < self.miss_pct {
            self.counters.missed += 1;
            Ok(ResolutionOutcome::missed())
        } else {
            self.counters.resolved += 1;
            Ok(ResolutionOutcome::landed())
        }
    }

    fn interrupted(&mut self, actor: ActorId, action: &ActionDescriptor) {
        self.counters.interrupted += 1;
        if let Some(snapshot) = self.actors.get_mut(&actor) {
            snapshot.interrupted = false;
        }
        trace!(actor = %actor, action = %action, "cast disrupted");
    }

    fn rejected(&mut self, _actor: ActorId, _action: &ActionDescriptor, _reason: RejectReason) {
        self.counters.rejected += 1;
    }
}
