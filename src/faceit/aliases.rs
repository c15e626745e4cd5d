//! Upstream per-match stat keys have shifted spelling over time. Every
//! accepted spelling is listed here against the field it means.

use std::collections::HashMap;

use crate::error::{AppError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatField {
    Kills,
    Deaths,
    Headshots,
    Result,
    Map,
}

impl StatField {
    pub const ALL: [StatField; 5] = [
        StatField::Kills,
        StatField::Deaths,
        StatField::Headshots,
        StatField::Result,
        StatField::Map,
    ];
}

/// Alias → canonical field, in lookup priority order.
pub const STAT_ALIASES: &[(&str, StatField)] = &[
    ("Kills", StatField::Kills),
    ("kills", StatField::Kills),
    ("Deaths", StatField::Deaths),
    ("deaths", StatField::Deaths),
    ("Headshots", StatField::Headshots),
    ("headshots", StatField::Headshots),
    ("Result", StatField::Result),
    ("result", StatField::Result),
    ("Map", StatField::Map),
    ("map", StatField::Map),
];

/// Rejects tables where an alias is listed twice or a field has no alias.
pub fn validate_alias_table(table: &[(&str, StatField)]) -> Result<()> {
    let mut seen: HashMap<&str, StatField> = HashMap::new();
    for &(alias, field) in table {
        if let Some(prev) = seen.insert(alias, field) {
            return Err(AppError::Config(format!(
                "stat alias '{alias}' listed twice ({prev:?} and {field:?})"
            )));
        }
    }
    for field in StatField::ALL {
        if !table.iter().any(|&(_, f)| f == field) {
            return Err(AppError::Config(format!("stat field {field:?} has no alias")));
        }
    }
    Ok(())
}

/// First present alias for `field` in a per-match `stats` object.
pub fn lookup(stats: &serde_json::Value, field: StatField) -> Option<&serde_json::Value> {
    STAT_ALIASES
        .iter()
        .filter(|&&(_, f)| f == field)
        .find_map(|&(alias, _)| stats.get(alias))
}
