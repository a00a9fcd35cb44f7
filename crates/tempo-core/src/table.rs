//! Timing table: per-action base values loaded from data.
//!
//! The table is an ordered collection keyed by a stable integer. Keys are
//! grouped by kind in the built-in table (swings 1.., spells 100..,
//! bandages 200.., wands 300..) but nothing depends on that grouping.
//!
//! File format (a bare array of entries is accepted too):
//!
//! ```json
//! { "entries": [
//!   { "key": 3, "name": "Katana", "kind": "swing", "base_speed": 46 },
//!   { "key": 104, "name": "Fireball", "kind": "spell",
//!     "base_duration_ms": 1250, "resource_cost": 9 }
//! ] }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use tempo_audit::ActionKind;

use crate::error::{TimingError, TimingResult};

/// Default lower clamp for computed delays.
pub const DEFAULT_MIN_MS: u64 = 200;
/// Default upper clamp for computed delays.
pub const DEFAULT_MAX_MS: u64 = 4_000;

/// Base timing values for one action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionTimingEntry {
    /// Stable key referenced by [`crate::ActionDescriptor::entry`].
    pub key: u32,
    /// Display name.
    pub name: String,
    /// Channel this entry times.
    pub kind: ActionKind,
    /// Weapon speed (swings only).
    #[serde(default)]
    pub base_speed: u32,
    /// Base duration in ms (spells, bandages, wands).
    #[serde(default)]
    pub base_duration_ms: u64,
    /// Delay from acceptance to resolution. 0 means half the action delay.
    #[serde(default)]
    pub effect_offset_ms: u64,
    /// Multiplier applied to the alternate form (scroll casts), in percent.
    #[serde(default = "default_scroll_modifier_pct")]
    pub scroll_modifier_pct: u32,
    /// Resource units the action needs (mana, bandages, charges, ammo).
    #[serde(default)]
    pub resource_cost: u32,
    /// Lower clamp.
    #[serde(default = "default_min_ms")]
    pub min_ms: u64,
    /// Upper clamp.
    #[serde(default = "default_max_ms")]
    pub max_ms: u64,
}

fn default_scroll_modifier_pct() -> u32 {
    100
}

fn default_min_ms() -> u64 {
    DEFAULT_MIN_MS
}

fn default_max_ms() -> u64 {
    DEFAULT_MAX_MS
}

impl ActionTimingEntry {
    fn swing(key: u32, name: &str, base_speed: u32) -> Self {
        Self {
            key,
            name: name.to_string(),
            kind: ActionKind::Swing,
            base_speed,
            base_duration_ms: 0,
            effect_offset_ms: 0,
            scroll_modifier_pct: 100,
            resource_cost: 0,
            min_ms: DEFAULT_MIN_MS,
            max_ms: DEFAULT_MAX_MS,
        }
    }

    fn timed(key: u32, name: &str, kind: ActionKind, base_duration_ms: u64, resource_cost: u32) -> Self {
        Self {
            key,
            name: name.to_string(),
            kind,
            base_speed: 0,
            base_duration_ms,
            effect_offset_ms: 0,
            scroll_modifier_pct: 100,
            resource_cost,
            min_ms: DEFAULT_MIN_MS,
            max_ms: DEFAULT_MAX_MS,
        }
    }

    fn with_offset(mut self, effect_offset_ms: u64) -> Self {
        self.effect_offset_ms = effect_offset_ms;
        self
    }

    fn with_scroll(mut self, pct: u32) -> Self {
        self.scroll_modifier_pct = pct;
        self
    }

    fn with_bounds(mut self, min_ms: u64, max_ms: u64) -> Self {
        self.min_ms = min_ms;
        self.max_ms = max_ms;
        self
    }

    fn validate(&self) -> TimingResult<()> {
        let invalid = |reason: &str| TimingError::InvalidEntry {
            key: self.key,
            reason: reason.to_string(),
        };
        if self.min_ms > self.max_ms {
            return Err(invalid("min_ms exceeds max_ms"));
        }
        if self.scroll_modifier_pct == 0 {
            return Err(invalid("scroll_modifier_pct must be positive"));
        }
        match self.kind {
            ActionKind::Swing if self.base_speed == 0 => Err(invalid("swing entry needs base_speed")),
            ActionKind::Spell | ActionKind::Bandage | ActionKind::Wand if self.base_duration_ms == 0 => {
                Err(invalid("entry needs base_duration_ms"))
            }
            _ => Ok(()),
        }
    }
}

/// Where a [`TimingTable`] came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableSource {
    /// Loaded from a file.
    File(PathBuf),
    /// Built-in compatibility mapping.
    Compat,
    /// Assembled in code.
    Inline,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TableFile {
    Wrapped { entries: Vec<ActionTimingEntry> },
    Bare(Vec<ActionTimingEntry>),
}

impl TableFile {
    fn into_entries(self) -> Vec<ActionTimingEntry> {
        match self {
            Self::Wrapped { entries } | Self::Bare(entries) => entries,
        }
    }
}

/// Ordered, immutable collection of [`ActionTimingEntry`] keyed by `key`.
#[derive(Debug, Clone)]
pub struct TimingTable {
    entries: BTreeMap<u32, ActionTimingEntry>,
    source: TableSource,
}

impl TimingTable {
    /// Builds a table from entries, validating each one.
    ///
    /// # Errors
    ///
    /// Returns [`TimingError::DuplicateEntry`] or [`TimingError::InvalidEntry`].
    pub fn from_entries(entries: impl IntoIterator<Item = ActionTimingEntry>) -> TimingResult<Self> {
        Self::collect(entries, TableSource::Inline)
    }

    fn collect(entries: impl IntoIterator<Item = ActionTimingEntry>, source: TableSource) -> TimingResult<Self> {
        let mut map = BTreeMap::new();
        for entry in entries {
            entry.validate()?;
            let key = entry.key;
            if map.insert(key, entry).is_some() {
                return Err(TimingError::DuplicateEntry(key));
            }
        }
        Ok(Self { entries: map, source })
    }

    /// Loads a table file.
    ///
    /// # Errors
    ///
    /// I/O, parse and validation errors.
    pub fn load(path: impl AsRef<Path>) -> TimingResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| TimingError::TableIo {
            path: path.to_path_buf(),
            source,
        })?;
        let file: TableFile = serde_json::from_str(&text).map_err(|source| TimingError::TableParse {
            path: path.to_path_buf(),
            source,
        })?;
        Self::collect(file.into_entries(), TableSource::File(path.to_path_buf()))
    }

    /// Loads `path`, falling back to [`TimingTable::compat`].
    ///
    /// - no path configured: compat table
    /// - file missing: compat table, logged at info
    /// - file malformed: compat table, logged at warn
    ///
    /// With `allow_compat` false, missing and malformed files are errors.
    ///
    /// # Errors
    ///
    /// Only when `allow_compat` is false and the file cannot be used.
    pub fn load_or_compat(path: Option<&Path>, allow_compat: bool) -> TimingResult<Self> {
        let Some(path) = path else {
            info!("no timing table configured, using built-in compatibility table");
            return Ok(Self::compat());
        };

        match Self::load(path) {
            Ok(table) => {
                info!(path = %path.display(), entries = table.len(), "timing table loaded");
                Ok(table)
            }
            Err(err) if !allow_compat => Err(err),
            Err(TimingError::TableIo { source, .. }) if source.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "timing table not found, using built-in compatibility table");
                Ok(Self::compat())
            }
            Err(err) => {
                warn!(path = %path.display(), error = %err, "timing table unusable, using built-in compatibility table");
                Ok(Self::compat())
            }
        }
    }

    /// Built-in table reproducing legacy timings.
    #[must_use]
    pub fn compat() -> Self {
        let entries = [
            ActionTimingEntry::swing(1, "Wrestling", 30),
            ActionTimingEntry::swing(2, "Dagger", 25),
            ActionTimingEntry::swing(3, "Katana", 46),
            ActionTimingEntry::swing(4, "Longsword", 55),
            ActionTimingEntry::swing(5, "Halberd", 80),
            ActionTimingEntry {
                resource_cost: 1,
                ..ActionTimingEntry::swing(6, "Bow", 70)
            },
            ActionTimingEntry {
                resource_cost: 1,
                ..ActionTimingEntry::swing(7, "Heavy Crossbow", 90)
            },
            ActionTimingEntry::timed(101, "Magic Arrow", ActionKind::Spell, 750, 4).with_scroll(75),
            ActionTimingEntry::timed(102, "Heal", ActionKind::Spell, 750, 4).with_scroll(75),
            ActionTimingEntry::timed(103, "Lightning", ActionKind::Spell, 1_000, 9).with_scroll(75),
            ActionTimingEntry::timed(104, "Fireball", ActionKind::Spell, 1_250, 9).with_scroll(75),
            ActionTimingEntry::timed(105, "Energy Bolt", ActionKind::Spell, 1_750, 20).with_scroll(75),
            ActionTimingEntry::timed(106, "Flamestrike", ActionKind::Spell, 2_250, 40)
                .with_scroll(75)
                .with_offset(2_000),
            ActionTimingEntry::timed(201, "Bandage (self)", ActionKind::Bandage, 8_000, 1)
                .with_bounds(2_000, 15_000)
                .with_offset(8_000),
            ActionTimingEntry::timed(202, "Bandage (other)", ActionKind::Bandage, 5_000, 1)
                .with_bounds(2_000, 15_000)
                .with_offset(5_000),
            ActionTimingEntry::timed(301, "Wand of Magic Arrow", ActionKind::Wand, 1_000, 1),
            ActionTimingEntry::timed(302, "Wand of Lightning", ActionKind::Wand, 1_500, 1),
            ActionTimingEntry::timed(303, "Wand of Fireball", ActionKind::Wand, 1_750, 1),
        ];
        Self {
            entries: entries.into_iter().map(|e| (e.key, e)).collect(),
            source: TableSource::Compat,
        }
    }

    /// Entry for `key`.
    #[must_use]
    pub fn get(&self, key: u32) -> Option<&ActionTimingEntry> {
        self.entries.get(&key)
    }

    /// Entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = &ActionTimingEntry> {
        self.entries.values()
    }

    /// First entry of `kind`, in key order.
    #[must_use]
    pub fn first_of(&self, kind: ActionKind) -> Option<&ActionTimingEntry> {
        self.iter().find(|e| e.kind == kind)
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if the table has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Where the table came from.
    #[must_use]
    pub fn source(&self) -> &TableSource {
        &self.source
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(name: &str, contents: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("tempo-table-{}-{name}.json", std::process::id()));
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn compat_table_is_valid() {
        let table = TimingTable::compat();
        for entry in table.iter() {
            entry.validate().unwrap();
        }
        for kind in ActionKind::ALL {
            assert!(table.first_of(kind).is_some(), "{kind} missing");
        }
        assert_eq!(table.get(3).unwrap().base_speed, 46);
        assert_eq!(table.source(), &TableSource::Compat);
    }

    #[test]
    fn duplicate_keys_rejected() {
        let entries = vec![
            ActionTimingEntry::swing(1, "A", 40),
            ActionTimingEntry::swing(1, "B", 50),
        ];
        assert!(matches!(
            TimingTable::from_entries(entries),
            Err(TimingError::DuplicateEntry(1))
        ));
    }

    #[test]
    fn invalid_bounds_rejected() {
        let entry = ActionTimingEntry::swing(1, "A", 40).with_bounds(500, 100);
        assert!(matches!(
            TimingTable::from_entries([entry]),
            Err(TimingError::InvalidEntry { key: 1, .. })
        ));
    }

    #[test]
    fn load_applies_field_defaults() {
        let path = write_temp(
            "defaults",
            r#"{ "entries": [ { "key": 9, "name": "Club", "kind": "swing", "base_speed": 44 } ] }"#,
        );
        let table = TimingTable::load(&path).unwrap();
        let entry = table.get(9).unwrap();
        assert_eq!(entry.min_ms, DEFAULT_MIN_MS);
        assert_eq!(entry.max_ms, DEFAULT_MAX_MS);
        assert_eq!(entry.scroll_modifier_pct, 100);
        assert_eq!(table.source(), &TableSource::File(path.clone()));
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn bare_array_accepted() {
        let path = write_temp(
            "bare",
            r#"[ { "key": 301, "name": "Wand", "kind": "wand", "base_duration_ms": 1000 } ]"#,
        );
        let table = TimingTable::load(&path).unwrap();
        assert_eq!(table.get(301).unwrap().kind, ActionKind::Wand);
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn missing_file_falls_back() {
        let table = TimingTable::load_or_compat(Some(Path::new("/nonexistent/tempo.json")), true).unwrap();
        assert_eq!(table.source(), &TableSource::Compat);
    }

    #[test]
    fn malformed_file_falls_back_or_errors() {
        let path = write_temp("malformed", "{ not json");
        let table = TimingTable::load_or_compat(Some(&path), true).unwrap();
        assert_eq!(table.source(), &TableSource::Compat);

        let err = TimingTable::load_or_compat(Some(&path), false).unwrap_err();
        assert!(matches!(err, TimingError::TableParse { .. }));
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn no_path_uses_compat() {
        let table = TimingTable::load_or_compat(None, false).unwrap();
        assert_eq!(table.source(), &TableSource::Compat);
    }
}
