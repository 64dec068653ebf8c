//! Row types returned by the catalog store.

use serde::{Deserialize, Serialize};

/// Shown for a captured flag or a free machine.
pub const YES_GLYPH: &str = "✓";
/// Shown for a missing flag or a subscriber-only machine.
pub const NO_GLYPH: &str = "✗";

pub const fn glyph(value: bool) -> &'static str {
    if value { YES_GLYPH } else { NO_GLYPH }
}

/// `user/root` ownership pair, e.g. `✓/✗`.
pub fn owned_glyph(user_owned: bool, root_owned: bool) -> String {
    format!("{}/{}", glyph(user_owned), glyph(root_owned))
}

/// Raw listing row before glyph rendering.
#[derive(Debug, Clone, sqlx::FromRow)]
pub(crate) struct MachineListingRow {
    pub name: String,
    pub difficulty: String,
    pub os: String,
    pub free: bool,
    pub user_own: bool,
    pub root_own: bool,
    pub tags: Option<String>,
}

/// One catalog row as the machine table displays it:
/// `(name, difficulty, os, free_glyph, owned_glyph, tags_csv)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineListing {
    pub name: String,
    pub difficulty: String,
    pub os: String,
    pub free: String,
    pub owned: String,
    /// Comma-joined tag names, empty when the machine has none.
    pub tags: String,
}

impl MachineListing {
    pub fn as_tuple(&self) -> (&str, &str, &str, &str, &str, &str) {
        (
            &self.name,
            &self.difficulty,
            &self.os,
            &self.free,
            &self.owned,
            &self.tags,
        )
    }
}

impl From<MachineListingRow> for MachineListing {
    fn from(row: MachineListingRow) -> Self {
        Self {
            free: glyph(row.free).to_string(),
            owned: owned_glyph(row.user_own, row.root_own),
            tags: row.tags.unwrap_or_default(),
            name: row.name,
            difficulty: row.difficulty,
            os: row.os,
        }
    }
}

/// `(name, id)` pair used to populate selection lists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct NamedId {
    pub name: String,
    pub id: i64,
}

/// Full machine record from the database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Machine {
    pub id: i64,
    pub name: String,
    pub difficulty: String,
    pub os: String,
    pub free: bool,
    pub active: bool,
    pub user_own: bool,
    pub root_own: bool,
}
