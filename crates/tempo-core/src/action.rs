//! Action descriptors: what the host asks the engine to time.

use serde::{Deserialize, Serialize};
use std::fmt;

use tempo_audit::ActionKind;

/// Variant of an action that changes its timing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionForm {
    /// Normal form.
    #[default]
    Standard,
    /// Alternate form (e.g. cast from a scroll); applies the entry's scroll modifier.
    Scroll,
}

/// A requested action: which channel, which table entry, which form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActionDescriptor {
    /// Channel the action runs on.
    pub kind: ActionKind,
    /// Key into the timing table.
    pub entry: u32,
    /// Form modifier.
    #[serde(default)]
    pub form: ActionForm,
}

impl ActionDescriptor {
    /// Standard-form descriptor.
    #[must_use]
    pub const fn new(kind: ActionKind, entry: u32) -> Self {
        Self {
            kind,
            entry,
            form: ActionForm::Standard,
        }
    }

    /// Weapon swing with the weapon's table entry.
    #[must_use]
    pub const fn swing(entry: u32) -> Self {
        Self::new(ActionKind::Swing, entry)
    }

    /// Spell cast.
    #[must_use]
    pub const fn spell(entry: u32) -> Self {
        Self::new(ActionKind::Spell, entry)
    }

    /// Bandage application.
    #[must_use]
    pub const fn bandage(entry: u32) -> Self {
        Self::new(ActionKind::Bandage, entry)
    }

    /// Wand use.
    #[must_use]
    pub const fn wand(entry: u32) -> Self {
        Self::new(ActionKind::Wand, entry)
    }

    /// Same action in another form.
    #[must_use]
    pub const fn with_form(mut self, form: ActionForm) -> Self {
        self.form = form;
        self
    }
}

impl fmt::Display for ActionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.form {
            ActionForm::Standard => write!(f, "{}#{}", self.kind, self.entry),
            ActionForm::Scroll => write!(f, "{}#{}(scroll)", self.kind, self.entry),
        }
    }
}
