//! Timing formula provider.
//!
//! Converts an [`ActionDescriptor`] plus the actor's stats into a delay in
//! milliseconds. Every result is a whole multiple of the tick interval.
//!
//! Weapon swing:
//!
//! ```text
//! attack_ms  = base_speed * 40
//! bonus_dex  = clamp(dex - 100, 0, 25)
//! multiplier = 1 - bonus_dex * 0.008
//! quantized  = round(attack_ms * multiplier / tick) * tick
//! result     = clamp(quantized, min_ms, max_ms)
//! ```
//!
//! Spells scale `base_duration_ms` by intelligence, bandages by dexterity,
//! wands not at all. The scroll form multiplies by `scroll_modifier_pct / 100`.
//!
//! Arithmetic is done in scaled integers so `.5` boundaries round the same
//! way on every platform.

use std::sync::Arc;
use tracing::warn;

use tempo_audit::ActionKind;

use crate::action::{ActionDescriptor, ActionForm};
use crate::actor::ActorStats;
use crate::table::{ActionTimingEntry, TimingTable, DEFAULT_MAX_MS, DEFAULT_MIN_MS};

/// Delay used when a descriptor has no usable table entry.
pub const DEFAULT_DELAY_MS: u64 = DEFAULT_MAX_MS;

/// Milliseconds per weapon speed point.
const MS_PER_SPEED_POINT: u64 = 40;
/// Stat value above which bonuses start.
const STAT_BONUS_FLOOR: u32 = 100;
/// Largest stat bonus counted.
const STAT_BONUS_CAP: u32 = 25;
/// Speed-up per bonus point, in per-mille.
const PERMILLE_PER_BONUS: u64 = 8;

/// Computes action delays.
///
/// Implementations must be pure: the same descriptor and stats always give
/// the same delay.
pub trait TimingFormula: Send + Sync {
    /// Delay between acceptance and the channel becoming ready again.
    fn compute_delay(&self, action: &ActionDescriptor, stats: &ActorStats) -> u64;

    /// Delay between acceptance and resolution, within `0..=delay_ms`.
    fn resolution_offset(&self, action: &ActionDescriptor, delay_ms: u64) -> u64;

    /// Tick interval results are quantized to.
    fn tick_ms(&self) -> u64;
}

// =============================================================================
// Arithmetic
// =============================================================================

/// Rounds `ms` to the nearest multiple of `tick_ms` (half rounds up).
///
/// # Example
///
/// ```
/// use tempo_core::formula::quantize;
///
/// assert_eq!(quantize(1472, 50), 1450);
/// assert_eq!(quantize(1475, 50), 1500);
/// ```
#[must_use]
pub fn quantize(ms: u64, tick_ms: u64) -> u64 {
    quantize_ratio(u128::from(ms), 1, tick_ms)
}

/// `round(numer / denom / tick) * tick` in integers.
fn quantize_ratio(numer: u128, denom: u128, tick_ms: u64) -> u64 {
    let tick = u128::from(tick_ms.max(1));
    let ticks = (2 * numer + denom * tick) / (2 * denom * tick);
    u64::try_from(ticks * tick).unwrap_or(u64::MAX)
}

/// Clamp bounds snapped inward to tick multiples.
///
/// The floor rounds up and the ceiling rounds down; if that inverts them the
/// floor wins.
#[must_use]
pub fn tick_bounds(min_ms: u64, max_ms: u64, tick_ms: u64) -> (u64, u64) {
    let tick = tick_ms.max(1);
    let lo = min_ms.div_ceil(tick).saturating_mul(tick);
    let hi = (max_ms / tick) * tick;
    (lo, hi.max(lo))
}

fn stat_bonus(stat: u32) -> u64 {
    u64::from(stat.saturating_sub(STAT_BONUS_FLOOR).min(STAT_BONUS_CAP))
}

/// Scaled delay: `base * (1 - bonus * 0.008) * pct / 100`, quantized and clamped.
fn scaled_delay(base_ms: u64, bonus: u64, pct: u32, min_ms: u64, max_ms: u64, tick_ms: u64) -> u64 {
    let multiplier_permille = 1_000 - bonus * PERMILLE_PER_BONUS;
    let numer = u128::from(base_ms) * u128::from(multiplier_permille) * u128::from(pct);
    let quantized = quantize_ratio(numer, 100_000, tick_ms);
    let (lo, hi) = tick_bounds(min_ms, max_ms, tick_ms);
    quantized.clamp(lo, hi)
}

/// Weapon swing delay with the default clamp.
///
/// # Example
///
/// ```
/// use tempo_core::formula::swing_delay_ms;
///
/// // speed 46, dex 125, 50ms tick
/// assert_eq!(swing_delay_ms(46, 125, 50), 1450);
/// ```
#[must_use]
pub fn swing_delay_ms(base_speed: u32, dex: u32, tick_ms: u64) -> u64 {
    scaled_delay(
        u64::from(base_speed) * MS_PER_SPEED_POINT,
        stat_bonus(dex),
        100,
        DEFAULT_MIN_MS,
        DEFAULT_MAX_MS,
        tick_ms,
    )
}

/// Unquantized delay in whole ms, clamped to the entry's raw bounds.
///
/// This is what a per-character millisecond timer would use; the shadow
/// comparison measures the engine against it.
#[must_use]
pub fn unquantized_delay_ms(entry: &ActionTimingEntry, form: ActionForm, stats: &ActorStats) -> u64 {
    let (base, bonus) = base_and_bonus(entry, stats);
    let pct = form_pct(entry, form);
    let multiplier_permille = 1_000 - bonus * PERMILLE_PER_BONUS;
    let numer = u128::from(base) * u128::from(multiplier_permille) * u128::from(pct);
    let raw = u64::try_from((numer + 50_000) / 100_000).unwrap_or(u64::MAX);
    raw.clamp(entry.min_ms, entry.max_ms)
}

fn base_and_bonus(entry: &ActionTimingEntry, stats: &ActorStats) -> (u64, u64) {
    match entry.kind {
        ActionKind::Swing => (u64::from(entry.base_speed) * MS_PER_SPEED_POINT, stat_bonus(stats.dex)),
        ActionKind::Spell => (entry.base_duration_ms, stat_bonus(stats.int)),
        ActionKind::Bandage => (entry.base_duration_ms, stat_bonus(stats.dex)),
        ActionKind::Wand => (entry.base_duration_ms, 0),
    }
}

fn form_pct(entry: &ActionTimingEntry, form: ActionForm) -> u32 {
    match form {
        ActionForm::Standard => 100,
        ActionForm::Scroll => entry.scroll_modifier_pct,
    }
}

// =============================================================================
// Table-driven formula
// =============================================================================

/// The legacy formulas, driven by a [`TimingTable`].
///
/// Descriptors whose entry is missing, or whose entry belongs to another
/// kind, get [`DEFAULT_DELAY_MS`] and a warning.
#[derive(Debug, Clone)]
pub struct LegacyFormula {
    table: Arc<TimingTable>,
    tick_ms: u64,
}

impl LegacyFormula {
    /// Creates a formula over `table` quantizing to `tick_ms`.
    #[must_use]
    pub fn new(table: Arc<TimingTable>, tick_ms: u64) -> Self {
        Self {
            table,
            tick_ms: tick_ms.max(1),
        }
    }

    /// The backing table.
    #[must_use]
    pub fn table(&self) -> &Arc<TimingTable> {
        &self.table
    }

    fn entry_for(&self, action: &ActionDescriptor) -> Option<&ActionTimingEntry> {
        match self.table.get(action.entry) {
            Some(entry) if entry.kind == action.kind => Some(entry),
            Some(entry) => {
                warn!(
                    entry = action.entry,
                    expected = %action.kind,
                    found = %entry.kind,
                    "timing entry kind mismatch, using default delay"
                );
                None
            }
            None => {
                warn!(entry = action.entry, kind = %action.kind, "unknown timing entry, using default delay");
                None
            }
        }
    }
}

impl TimingFormula for LegacyFormula {
    fn compute_delay(&self, action: &ActionDescriptor, stats: &ActorStats) -> u64 {
        let Some(entry) = self.entry_for(action) else {
            let (lo, hi) = tick_bounds(DEFAULT_MIN_MS, DEFAULT_DELAY_MS, self.tick_ms);
            return quantize(DEFAULT_DELAY_MS, self.tick_ms).clamp(lo, hi);
        };
        let (base, bonus) = base_and_bonus(entry, stats);
        scaled_delay(
            base,
            bonus,
            form_pct(entry, action.form),
            entry.min_ms,
            entry.max_ms,
            self.tick_ms,
        )
    }

    fn resolution_offset(&self, action: &ActionDescriptor, delay_ms: u64) -> u64 {
        let raw = self
            .table
            .get(action.entry)
            .filter(|entry| entry.kind == action.kind && entry.effect_offset_ms > 0)
            .map_or(delay_ms / 2, |entry| entry.effect_offset_ms);
        let offset = quantize(raw, self.tick_ms).max(self.tick_ms);
        offset.min(delay_ms)
    }

    fn tick_ms(&self) -> u64 {
        self.tick_ms
    }
}
